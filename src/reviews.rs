use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use crate::{
    entities::{movie, review, user},
    error::{AppError, AppResult},
    models::{ReviewCreate, ReviewListQuery, ReviewUpdate, now_sec},
    ratings,
};

pub fn validate_rating(rating: i16) -> AppResult<()> {
    if !(1..=10).contains(&rating) {
        return Err(AppError::Validation(format!(
            "rating must be between 1 and 10, got {rating}"
        )));
    }
    Ok(())
}

pub async fn create_review(
    db: &DatabaseConnection,
    actor: &user::Model,
    payload: ReviewCreate,
) -> AppResult<review::Model> {
    validate_rating(payload.rating)?;

    let txn = db.begin().await?;

    movie::Entity::find_by_id(payload.movie_id)
        .one(&txn)
        .await?
        .ok_or(AppError::not_found("movie", payload.movie_id))?;

    let created = review::ActiveModel {
        user_id: Set(actor.id),
        movie_id: Set(payload.movie_id),
        diary_entry_id: Set(None),
        rating: Set(Some(payload.rating)),
        comment: Set(payload.comment),
        created_at: Set(now_sec()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    ratings::refresh_avg_rating(&txn, payload.movie_id).await?;
    txn.commit().await?;

    Ok(created)
}

pub async fn update_review(
    db: &DatabaseConnection,
    actor: &user::Model,
    review_id: i32,
    payload: ReviewUpdate,
) -> AppResult<review::Model> {
    if let Some(rating) = payload.rating {
        validate_rating(rating)?;
    }

    let txn = db.begin().await?;

    let existing = review::Entity::find_by_id(review_id)
        .one(&txn)
        .await?
        .ok_or(AppError::not_found("review", review_id))?;
    if existing.user_id != actor.id {
        return Err(AppError::Forbidden("you can only update your own reviews"));
    }

    let movie_id = existing.movie_id;
    let mut active: review::ActiveModel = existing.into();
    if payload.rating.is_some() {
        active.rating = Set(payload.rating);
    }
    if payload.comment.is_some() {
        active.comment = Set(payload.comment);
    }
    let updated = active.update(&txn).await?;

    ratings::refresh_avg_rating(&txn, movie_id).await?;
    txn.commit().await?;

    Ok(updated)
}

pub async fn delete_review(
    db: &DatabaseConnection,
    actor: &user::Model,
    review_id: i32,
) -> AppResult<()> {
    let txn = db.begin().await?;

    let existing = review::Entity::find_by_id(review_id)
        .one(&txn)
        .await?
        .ok_or(AppError::not_found("review", review_id))?;
    if existing.user_id != actor.id {
        return Err(AppError::Forbidden("you can only delete your own reviews"));
    }

    let movie_id = existing.movie_id;
    review::Entity::delete_by_id(review_id).exec(&txn).await?;

    ratings::refresh_avg_rating(&txn, movie_id).await?;
    txn.commit().await?;

    Ok(())
}

pub async fn get_review(db: &DatabaseConnection, review_id: i32) -> AppResult<review::Model> {
    review::Entity::find_by_id(review_id)
        .one(db)
        .await?
        .ok_or(AppError::not_found("review", review_id))
}

pub async fn list_reviews(
    db: &DatabaseConnection,
    query: ReviewListQuery,
) -> AppResult<Vec<review::Model>> {
    let mut find = review::Entity::find();
    if let Some(movie_id) = query.movie_id {
        find = find.filter(review::Column::MovieId.eq(movie_id));
    }
    if let Some(user_id) = query.user_id {
        find = find.filter(review::Column::UserId.eq(user_id));
    }
    Ok(find
        .order_by_desc(review::Column::CreatedAt)
        .offset(query.skip)
        .limit(query.limit.clamp(1, 100))
        .all(db)
        .await?)
}
