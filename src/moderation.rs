use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};

use crate::{
    entities::{Role, review, user},
    error::{AppError, AppResult},
    models::ReviewModerateUpdate,
    ratings,
};

/// Stateless moderation predicate: mods and admins may act on plain users'
/// content, and nothing else. Mods and admins are protected from each other
/// and from themselves.
pub fn can_moderate(actor: Role, target_owner: Role) -> bool {
    match actor {
        Role::User => false,
        Role::Mod | Role::Admin => matches!(target_owner, Role::User),
    }
}

async fn qualify_target(
    db: &impl sea_orm::ConnectionTrait,
    actor: &user::Model,
    review_id: i32,
) -> AppResult<review::Model> {
    if !matches!(actor.role, Role::Mod | Role::Admin) {
        return Err(AppError::Forbidden("insufficient privilege"));
    }

    let target = review::Entity::find_by_id(review_id)
        .one(db)
        .await?
        .ok_or(AppError::not_found("review", review_id))?;

    let owner = user::Entity::find_by_id(target.user_id)
        .one(db)
        .await?
        .ok_or(AppError::not_found("user", target.user_id))?;
    if !can_moderate(actor.role, owner.role) {
        return Err(AppError::Forbidden("cannot moderate this user's review"));
    }

    Ok(target)
}

/// Moderators may rewrite only the comment; the rating is the owner's. No
/// aggregate refresh here since the comment does not feed the mean.
pub async fn moderate_update_comment(
    db: &DatabaseConnection,
    actor: &user::Model,
    review_id: i32,
    payload: ReviewModerateUpdate,
) -> AppResult<review::Model> {
    if payload.rating.is_some() {
        return Err(AppError::Forbidden("moderators may not change ratings"));
    }

    let target = qualify_target(db, actor, review_id).await?;

    let updated = match payload.comment {
        Some(comment) => {
            let mut active: review::ActiveModel = target.into();
            active.comment = Set(Some(comment));
            active.update(db).await?
        },
        None => target,
    };

    tracing::info!(review_id, moderator = actor.id, "review comment moderated");
    Ok(updated)
}

pub async fn moderate_delete_review(
    db: &DatabaseConnection,
    actor: &user::Model,
    review_id: i32,
) -> AppResult<()> {
    let txn = db.begin().await?;

    let target = qualify_target(&txn, actor, review_id).await?;
    let movie_id = target.movie_id;

    review::Entity::delete_by_id(review_id).exec(&txn).await?;
    ratings::refresh_avg_rating(&txn, movie_id).await?;
    txn.commit().await?;

    tracing::info!(review_id, moderator = actor.id, "review deleted by moderator");
    Ok(())
}
