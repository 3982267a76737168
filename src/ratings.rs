use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::{
    entities::{movie, review},
    error::AppResult,
};

/// Recomputes a movie's denormalized average rating from its current review
/// rows. Comment-only reviews (`rating` NULL) are excluded; no rated review
/// means 0.0. A vanished movie is a no-op so the caller's mutation stands.
///
/// Generic over the connection so callers can run it inside the transaction
/// that performed the review mutation, making the refresh read post-mutation
/// state.
pub async fn refresh_avg_rating<C: ConnectionTrait>(conn: &C, movie_id: i32) -> AppResult<()> {
    let Some(m) = movie::Entity::find_by_id(movie_id).one(conn).await? else {
        return Ok(());
    };

    // Full scan rather than incremental deltas: recomputing from source rows
    // self-heals any drift from missed updates.
    let reviews = review::Entity::find()
        .filter(review::Column::MovieId.eq(movie_id))
        .all(conn)
        .await?;

    let ratings: Vec<i64> = reviews.iter().filter_map(|r| r.rating.map(i64::from)).collect();
    let avg = if ratings.is_empty() {
        0.0
    } else {
        round2(ratings.iter().sum::<i64>() as f64 / ratings.len() as f64)
    };

    let mut active: movie::ActiveModel = m.into();
    active.avg_rating = Set(avg);
    active.update(conn).await?;

    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
