use futures::{StreamExt, stream};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use tracing::{debug, warn};

use crate::{
    entities::{genre, movie, movie_genre},
    error::AppResult,
    models::now_sec,
    tmdb::TmdbClient,
};

/// Imports a movie from the catalog provider by its external id. Idempotent:
/// a known tmdb_id returns the stored row unchanged, and losing an insert
/// race resolves to the winner's row rather than an error.
pub async fn import_movie(
    db: &DatabaseConnection,
    tmdb: &TmdbClient,
    tmdb_id: i32,
) -> AppResult<movie::Model> {
    if let Some(existing) = find_by_tmdb_id(db, tmdb_id).await? {
        debug!(tmdb_id, movie_id = existing.id, "movie already imported");
        return Ok(existing);
    }

    let details = tmdb.movie_details(tmdb_id).await?;

    let txn = db.begin().await?;

    let inserted = movie::ActiveModel {
        tmdb_id: Set(details.tmdb_id),
        title: Set(details.title),
        description: Set(details.description),
        release_date: Set(details.release_date),
        poster_url: Set(details.poster_url),
        popularity: Set(details.popularity),
        avg_rating: Set(0.0),
        created_at: Set(now_sec()),
        ..Default::default()
    }
    .insert(&txn)
    .await;

    let imported = match inserted {
        Ok(m) => m,
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            // lost the import race; the winner's row is the contract
            txn.rollback().await?;
            return find_by_tmdb_id(db, tmdb_id).await?.ok_or_else(|| {
                anyhow::anyhow!("movie {tmdb_id} vanished after conflicting import").into()
            });
        },
        Err(err) => return Err(err.into()),
    };

    for name in &details.genres {
        let g = ensure_genre(&txn, name).await?;
        movie_genre::ActiveModel { movie_id: Set(imported.id), genre_id: Set(g.id) }
            .insert(&txn)
            .await?;
    }

    txn.commit().await?;

    debug!(tmdb_id, movie_id = imported.id, "movie imported");
    Ok(imported)
}

/// Imports the provider's popular listing, skipping movies that fail.
/// Returns how many imports succeeded.
pub async fn populate(
    db: &DatabaseConnection,
    tmdb: &TmdbClient,
    pages: u32,
    max_concurrent: usize,
) -> AppResult<usize> {
    let mut ids = Vec::new();
    for page in 1..=pages.max(1) {
        ids.extend(tmdb.popular_movie_ids(page).await?);
    }

    debug!(candidates = ids.len(), "populating catalog");

    let imported: Vec<bool> = stream::iter(ids)
        .map(|tmdb_id| async move {
            match import_movie(db, tmdb, tmdb_id).await {
                Ok(_) => true,
                Err(err) => {
                    warn!(tmdb_id, error = %err, "failed to import movie");
                    false
                },
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    Ok(imported.into_iter().filter(|ok| *ok).count())
}

pub async fn find_by_tmdb_id(
    db: &DatabaseConnection,
    tmdb_id: i32,
) -> AppResult<Option<movie::Model>> {
    Ok(movie::Entity::find().filter(movie::Column::TmdbId.eq(tmdb_id)).one(db).await?)
}

async fn ensure_genre<C: ConnectionTrait>(conn: &C, name: &str) -> AppResult<genre::Model> {
    if let Some(g) = genre::Entity::find().filter(genre::Column::Name.eq(name)).one(conn).await? {
        return Ok(g);
    }
    Ok(genre::ActiveModel { name: Set(name.to_string()), ..Default::default() }
        .insert(conn)
        .await?)
}
