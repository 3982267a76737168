use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::{
    entities::{diary_entry, movie, review, user},
    error::{AppError, AppResult},
    models::{DiaryCreate, DiaryOut, DiaryUpdate, Page, now_sec},
    ratings,
    reviews::validate_rating,
};

/// Creates a diary entry, plus its linked review when a rating or comment was
/// supplied. Entry, review and aggregate refresh commit atomically, so a
/// failure can never leave an entry without its intended review. Several
/// entries for the same user, movie and date are allowed.
pub async fn create_entry(
    db: &DatabaseConnection,
    actor: &user::Model,
    payload: DiaryCreate,
) -> AppResult<DiaryOut> {
    if let Some(rating) = payload.rating {
        validate_rating(rating)?;
    }

    let txn = db.begin().await?;

    let m = movie::Entity::find_by_id(payload.movie_id)
        .one(&txn)
        .await?
        .ok_or(AppError::not_found("movie", payload.movie_id))?;

    let entry = diary_entry::ActiveModel {
        user_id: Set(actor.id),
        movie_id: Set(m.id),
        watched_on: Set(payload.watched_on.to_string()),
        created_at: Set(now_sec()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let linked = if payload.rating.is_some() || payload.comment.is_some() {
        Some(upsert_diary_review(&txn, &entry, payload.rating, payload.comment).await?)
    } else {
        None
    };

    txn.commit().await?;

    tracing::debug!(entry_id = entry.id, movie_id = m.id, "diary entry created");
    Ok(DiaryOut::from_parts(entry, linked))
}

/// Creates or partially updates the review linked to a diary entry, then
/// refreshes the movie's aggregate on the same connection. A `None` field
/// leaves the stored value untouched; the unique index on diary_entry_id
/// guarantees at most one review per entry.
pub async fn upsert_diary_review<C: ConnectionTrait>(
    conn: &C,
    entry: &diary_entry::Model,
    rating: Option<i16>,
    comment: Option<String>,
) -> AppResult<review::Model> {
    if let Some(rating) = rating {
        validate_rating(rating)?;
    }

    let existing = review::Entity::find()
        .filter(review::Column::DiaryEntryId.eq(entry.id))
        .one(conn)
        .await?;

    let linked = match existing {
        None => {
            review::ActiveModel {
                user_id: Set(entry.user_id),
                movie_id: Set(entry.movie_id),
                diary_entry_id: Set(Some(entry.id)),
                rating: Set(rating),
                comment: Set(comment),
                created_at: Set(now_sec()),
                ..Default::default()
            }
            .insert(conn)
            .await?
        },
        // nothing supplied, nothing to write
        Some(current) if rating.is_none() && comment.is_none() => current,
        Some(current) => {
            let mut active: review::ActiveModel = current.into();
            if rating.is_some() {
                active.rating = Set(rating);
            }
            if comment.is_some() {
                active.comment = Set(comment);
            }
            active.update(conn).await?
        },
    };

    ratings::refresh_avg_rating(conn, entry.movie_id).await?;
    Ok(linked)
}

pub async fn update_entry(
    db: &DatabaseConnection,
    actor: &user::Model,
    entry_id: i32,
    payload: DiaryUpdate,
) -> AppResult<DiaryOut> {
    let txn = db.begin().await?;

    let entry = diary_entry::Entity::find_by_id(entry_id)
        .one(&txn)
        .await?
        .ok_or(AppError::not_found("diary entry", entry_id))?;
    if entry.user_id != actor.id {
        return Err(AppError::Forbidden("you can only modify your own diary entries"));
    }

    let entry = match payload.watched_on {
        Some(date) => {
            let mut active: diary_entry::ActiveModel = entry.into();
            active.watched_on = Set(date.to_string());
            active.update(&txn).await?
        },
        None => entry,
    };

    let linked = if payload.rating.is_some() || payload.comment.is_some() {
        Some(upsert_diary_review(&txn, &entry, payload.rating, payload.comment).await?)
    } else {
        review::Entity::find()
            .filter(review::Column::DiaryEntryId.eq(entry.id))
            .one(&txn)
            .await?
    };

    txn.commit().await?;

    Ok(DiaryOut::from_parts(entry, linked))
}

/// Deletes the entry; the backing store cascades the delete to its linked
/// review, after which the aggregate refresh reads the post-delete state.
/// The refresh runs whether or not a review existed.
pub async fn delete_entry(
    db: &DatabaseConnection,
    actor: &user::Model,
    entry_id: i32,
) -> AppResult<()> {
    let txn = db.begin().await?;

    let entry = diary_entry::Entity::find_by_id(entry_id)
        .one(&txn)
        .await?
        .ok_or(AppError::not_found("diary entry", entry_id))?;
    if entry.user_id != actor.id {
        return Err(AppError::Forbidden("you can only delete your own diary entries"));
    }

    let movie_id = entry.movie_id;
    diary_entry::Entity::delete_by_id(entry_id).exec(&txn).await?;

    ratings::refresh_avg_rating(&txn, movie_id).await?;
    txn.commit().await?;

    tracing::debug!(entry_id, movie_id, "diary entry deleted");
    Ok(())
}

pub async fn list_entries(
    db: &DatabaseConnection,
    actor: &user::Model,
    page: Page,
) -> AppResult<Vec<DiaryOut>> {
    let entries = diary_entry::Entity::find()
        .filter(diary_entry::Column::UserId.eq(actor.id))
        .order_by_desc(diary_entry::Column::WatchedOn)
        .order_by_desc(diary_entry::Column::CreatedAt)
        .offset(page.skip)
        .limit(page.limit())
        .all(db)
        .await?;

    let ids: Vec<i32> = entries.iter().map(|e| e.id).collect();
    let mut linked: HashMap<i32, review::Model> = review::Entity::find()
        .filter(review::Column::DiaryEntryId.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .filter_map(|r| r.diary_entry_id.map(|id| (id, r)))
        .collect();

    Ok(entries
        .into_iter()
        .map(|e| {
            let r = linked.remove(&e.id);
            DiaryOut::from_parts(e, r)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entities::Role,
        test_util::{seed_movie, seed_user, test_db},
    };
    use jiff::civil::date;
    use sea_orm::PaginatorTrait;

    async fn movie_avg(db: &DatabaseConnection, movie_id: i32) -> f64 {
        movie::Entity::find_by_id(movie_id).one(db).await.unwrap().unwrap().avg_rating
    }

    #[tokio::test]
    async fn create_with_rating_links_review_and_refreshes() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;

        let out = create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: Some(8),
            comment: None,
        })
        .await
        .unwrap();

        assert!(out.review_id.is_some());
        assert_eq!(out.rating, Some(8));
        assert_eq!(out.watched_on, "2024-01-01");
        assert_eq!(movie_avg(&db, m.id).await, 8.0);
    }

    #[tokio::test]
    async fn create_without_rating_or_comment_has_no_review() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;

        let out = create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: None,
            comment: None,
        })
        .await
        .unwrap();

        assert!(out.review_id.is_none());
        assert_eq!(review::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(movie_avg(&db, m.id).await, 0.0);
    }

    #[tokio::test]
    async fn duplicate_user_movie_date_entries_are_allowed() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;
        let payload = || DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: None,
            comment: None,
        };

        create_entry(&db, &u, payload()).await.unwrap();
        create_entry(&db, &u, payload()).await.unwrap();

        assert_eq!(diary_entry::Entity::find().count(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn comment_only_update_creates_unrated_review() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;
        let out = create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: None,
            comment: None,
        })
        .await
        .unwrap();

        let out = update_entry(&db, &u, out.id, DiaryUpdate {
            watched_on: None,
            rating: None,
            comment: Some("haunting".to_string()),
        })
        .await
        .unwrap();

        assert!(out.review_id.is_some());
        assert_eq!(out.rating, None);
        assert_eq!(out.comment.as_deref(), Some("haunting"));
        // unrated review stays out of the mean
        assert_eq!(movie_avg(&db, m.id).await, 0.0);
    }

    #[tokio::test]
    async fn update_overwrites_only_supplied_fields() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;
        let out = create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: Some(6),
            comment: Some("ok".to_string()),
        })
        .await
        .unwrap();

        let out = update_entry(&db, &u, out.id, DiaryUpdate {
            watched_on: Some(date(2024, 2, 2)),
            rating: Some(9),
            comment: None,
        })
        .await
        .unwrap();

        assert_eq!(out.watched_on, "2024-02-02");
        assert_eq!(out.rating, Some(9));
        assert_eq!(out.comment.as_deref(), Some("ok"));
        assert_eq!(movie_avg(&db, m.id).await, 9.0);
        // still exactly one review for this entry
        assert_eq!(review::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_review_for_same_entry_is_rejected_by_the_store() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;
        let out = create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: Some(8),
            comment: None,
        })
        .await
        .unwrap();

        let dup = review::ActiveModel {
            user_id: Set(u.id),
            movie_id: Set(m.id),
            diary_entry_id: Set(Some(out.id)),
            rating: Set(Some(3)),
            comment: Set(None),
            created_at: Set(now_sec()),
            ..Default::default()
        }
        .insert(&db)
        .await;

        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn update_and_delete_are_owner_only() {
        let db = test_db().await;
        let alice = seed_user(&db, "alice", Role::User).await;
        let bob = seed_user(&db, "bob", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;
        let out = create_entry(&db, &alice, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: None,
            comment: None,
        })
        .await
        .unwrap();

        let err = update_entry(&db, &bob, out.id, DiaryUpdate {
            watched_on: Some(date(2024, 3, 3)),
            rating: None,
            comment: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = delete_entry(&db, &bob, out.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn delete_cascades_review_and_refreshes() {
        let db = test_db().await;
        let alice = seed_user(&db, "alice", Role::User).await;
        let bob = seed_user(&db, "bob", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;

        create_entry(&db, &alice, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: Some(8),
            comment: None,
        })
        .await
        .unwrap();
        let out = create_entry(&db, &bob, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 2),
            rating: Some(6),
            comment: None,
        })
        .await
        .unwrap();
        assert_eq!(movie_avg(&db, m.id).await, 7.0);

        delete_entry(&db, &bob, out.id).await.unwrap();

        assert_eq!(review::Entity::find().count(&db).await.unwrap(), 1);
        assert_eq!(movie_avg(&db, m.id).await, 8.0);
    }

    #[tokio::test]
    async fn delete_without_review_leaves_aggregate_unchanged() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;
        let out = create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: None,
            comment: None,
        })
        .await
        .unwrap();

        delete_entry(&db, &u, out.id).await.unwrap();
        assert_eq!(movie_avg(&db, m.id).await, 0.0);
    }

    #[tokio::test]
    async fn listing_joins_reviews_newest_watched_first() {
        let db = test_db().await;
        let u = seed_user(&db, "alice", Role::User).await;
        let m = seed_movie(&db, 7, "Seven").await;

        create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 1, 1),
            rating: Some(8),
            comment: None,
        })
        .await
        .unwrap();
        create_entry(&db, &u, DiaryCreate {
            movie_id: m.id,
            watched_on: date(2024, 5, 1),
            rating: None,
            comment: None,
        })
        .await
        .unwrap();

        let out = list_entries(&db, &u, Page { skip: 0, limit: 100 }).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].watched_on, "2024-05-01");
        assert!(out[0].review_id.is_none());
        assert_eq!(out[1].rating, Some(8));
    }
}
