use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use serde_json::{Value, json};

use crate::{
    AppState,
    auth::CurrentUser,
    catalog,
    diary,
    entities::{Role, genre, movie, review, user, watchlist},
    error::{AppError, AppResult},
    models::{
        DiaryCreate, DiaryOut, DiaryUpdate, MovieListQuery, Page, PopulateRequest, ReviewCreate,
        ReviewListQuery, ReviewModerateUpdate, ReviewUpdate, WatchlistAdd, now_sec,
    },
    moderation, reviews,
};

// ---- movies ----

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(q): Query<MovieListQuery>,
) -> AppResult<Json<Vec<movie::Model>>> {
    let mut find = movie::Entity::find();
    if let Some(search) = q.search.as_deref().filter(|s| !s.trim().is_empty()) {
        find = find.filter(movie::Column::Title.contains(search.trim()));
    }
    if let Some(min_rating) = q.min_rating {
        find = find.filter(movie::Column::AvgRating.gte(min_rating));
    }
    if let Some(year) = q.year {
        find = find.filter(movie::Column::ReleaseDate.like(format!("{year:04}-%")));
    }

    let movies = find
        .order_by_desc(movie::Column::Popularity)
        .order_by_desc(movie::Column::AvgRating)
        .offset(q.skip)
        .limit(q.limit.clamp(1, 100))
        .all(&state.db)
        .await?;

    Ok(Json(movies))
}

pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i32>,
) -> AppResult<Json<movie::Model>> {
    let m = movie::Entity::find_by_id(movie_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::not_found("movie", movie_id))?;
    Ok(Json(m))
}

pub async fn get_movie_by_tmdb_id(
    State(state): State<Arc<AppState>>,
    Path(tmdb_id): Path<i32>,
) -> AppResult<Json<movie::Model>> {
    let m = catalog::find_by_tmdb_id(&state.db, tmdb_id)
        .await?
        .ok_or(AppError::not_found("movie", tmdb_id))?;
    Ok(Json(m))
}

pub async fn import_movie(
    State(state): State<Arc<AppState>>,
    Path(tmdb_id): Path<i32>,
) -> AppResult<(StatusCode, Json<movie::Model>)> {
    let m = catalog::import_movie(&state.db, &state.tmdb, tmdb_id).await?;
    Ok((StatusCode::CREATED, Json(m)))
}

pub async fn populate_movies(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Json(req): Json<PopulateRequest>,
) -> AppResult<Json<Value>> {
    if !matches!(actor.role, Role::Admin) {
        return Err(AppError::Forbidden("insufficient privilege"));
    }
    let imported = catalog::populate(
        &state.db,
        &state.tmdb,
        req.pages.unwrap_or(1),
        state.config.max_concurrent_imports,
    )
    .await?;
    Ok(Json(json!({ "imported": imported })))
}

// ---- genres ----

pub async fn list_genres(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<genre::Model>>> {
    let genres =
        genre::Entity::find().order_by_asc(genre::Column::Name).all(&state.db).await?;
    Ok(Json(genres))
}

pub async fn get_genre(
    State(state): State<Arc<AppState>>,
    Path(genre_id): Path<i32>,
) -> AppResult<Json<genre::Model>> {
    let g = genre::Entity::find_by_id(genre_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::not_found("genre", genre_id))?;
    Ok(Json(g))
}

// ---- reviews ----

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<ReviewCreate>,
) -> AppResult<(StatusCode, Json<review::Model>)> {
    let r = reviews::create_review(&state.db, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(r)))
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReviewListQuery>,
) -> AppResult<Json<Vec<review::Model>>> {
    Ok(Json(reviews::list_reviews(&state.db, q).await?))
}

pub async fn list_my_reviews(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<review::Model>>> {
    let q = ReviewListQuery {
        skip: page.skip,
        limit: page.limit,
        movie_id: None,
        user_id: Some(actor.id),
    };
    Ok(Json(reviews::list_reviews(&state.db, q).await?))
}

pub async fn list_movie_reviews(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i32>,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<review::Model>>> {
    movie::Entity::find_by_id(movie_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::not_found("movie", movie_id))?;
    let q = ReviewListQuery {
        skip: page.skip,
        limit: page.limit,
        movie_id: Some(movie_id),
        user_id: None,
    };
    Ok(Json(reviews::list_reviews(&state.db, q).await?))
}

pub async fn list_user_reviews(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i32>,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<review::Model>>> {
    user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::not_found("user", user_id))?;
    let q = ReviewListQuery {
        skip: page.skip,
        limit: page.limit,
        movie_id: None,
        user_id: Some(user_id),
    };
    Ok(Json(reviews::list_reviews(&state.db, q).await?))
}

pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<i32>,
) -> AppResult<Json<review::Model>> {
    Ok(Json(reviews::get_review(&state.db, review_id).await?))
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(review_id): Path<i32>,
    Json(payload): Json<ReviewUpdate>,
) -> AppResult<Json<review::Model>> {
    Ok(Json(reviews::update_review(&state.db, &actor, review_id, payload).await?))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(review_id): Path<i32>,
) -> AppResult<StatusCode> {
    reviews::delete_review(&state.db, &actor, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn moderate_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(review_id): Path<i32>,
    Json(payload): Json<ReviewModerateUpdate>,
) -> AppResult<Json<review::Model>> {
    Ok(Json(moderation::moderate_update_comment(&state.db, &actor, review_id, payload).await?))
}

pub async fn moderate_delete_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(review_id): Path<i32>,
) -> AppResult<StatusCode> {
    moderation::moderate_delete_review(&state.db, &actor, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- diary ----

pub async fn create_diary_entry(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<DiaryCreate>,
) -> AppResult<(StatusCode, Json<DiaryOut>)> {
    let out = diary::create_entry(&state.db, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn list_my_diary(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<DiaryOut>>> {
    Ok(Json(diary::list_entries(&state.db, &actor, page).await?))
}

pub async fn update_diary_entry(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(entry_id): Path<i32>,
    Json(payload): Json<DiaryUpdate>,
) -> AppResult<Json<DiaryOut>> {
    Ok(Json(diary::update_entry(&state.db, &actor, entry_id, payload).await?))
}

pub async fn delete_diary_entry(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(entry_id): Path<i32>,
) -> AppResult<StatusCode> {
    diary::delete_entry(&state.db, &actor, entry_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- watchlist ----

pub async fn add_to_watchlist(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<WatchlistAdd>,
) -> AppResult<(StatusCode, Json<watchlist::Model>)> {
    movie::Entity::find_by_id(payload.movie_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::not_found("movie", payload.movie_id))?;

    // let the primary key reject duplicates so concurrent adds conflict
    // instead of racing a pre-check
    let inserted = watchlist::ActiveModel {
        user_id: Set(actor.id),
        movie_id: Set(payload.movie_id),
        added_at: Set(now_sec()),
    }
    .insert(&state.db)
    .await;

    let item = match inserted {
        Ok(item) => item,
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            return Err(AppError::Conflict("movie is already in your watchlist".to_string()));
        },
        Err(err) => return Err(err.into()),
    };

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn list_my_watchlist(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<watchlist::Model>>> {
    let items = watchlist::Entity::find()
        .filter(watchlist::Column::UserId.eq(actor.id))
        .order_by_desc(watchlist::Column::AddedAt)
        .offset(page.skip)
        .limit(page.limit())
        .all(&state.db)
        .await?;
    Ok(Json(items))
}

pub async fn remove_from_watchlist(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(movie_id): Path<i32>,
) -> AppResult<StatusCode> {
    let res = watchlist::Entity::delete_by_id((actor.id, movie_id)).exec(&state.db).await?;
    if res.rows_affected == 0 {
        return Err(AppError::not_found("watchlist item", movie_id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        test_util::{seed_movie, seed_user, test_db},
        tmdb::TmdbClient,
    };

    async fn test_state() -> Arc<AppState> {
        let config = Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            database_url: "sqlite::memory:".to_string(),
            tmdb_access_token: String::new(),
            tmdb_base_url: "https://api.themoviedb.org/3".to_string(),
            tmdb_image_base_url: "https://image.tmdb.org/t/p/w500".to_string(),
            tmdb_rps: 4,
            max_concurrent_imports: 2,
        };
        let tmdb = TmdbClient::new(
            reqwest::Client::new(),
            config.tmdb_access_token.clone(),
            config.tmdb_base_url.clone(),
            config.tmdb_image_base_url.clone(),
            config.tmdb_rps,
        );
        Arc::new(AppState { config: Arc::new(config), db: test_db().await, tmdb: Arc::new(tmdb) })
    }

    #[tokio::test]
    async fn duplicate_watchlist_add_is_a_conflict() {
        let state = test_state().await;
        let u = seed_user(&state.db, "alice", Role::User).await;
        let m = seed_movie(&state.db, 7, "Seven").await;

        let (status, _) = add_to_watchlist(
            State(state.clone()),
            CurrentUser(u.clone()),
            Json(WatchlistAdd { movie_id: m.id }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let err = add_to_watchlist(
            State(state.clone()),
            CurrentUser(u),
            Json(WatchlistAdd { movie_id: m.id }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn removing_absent_watchlist_item_is_not_found() {
        let state = test_state().await;
        let u = seed_user(&state.db, "alice", Role::User).await;

        let err = remove_from_watchlist(State(state.clone()), CurrentUser(u), Path(12))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn genres_are_listed_by_name_after_import() {
        let state = test_state().await;
        // mock catalog data carries a single "Drama" genre
        crate::catalog::import_movie(&state.db, &state.tmdb, 550).await.unwrap();

        let Json(genres) = list_genres(State(state.clone())).await.unwrap();
        assert_eq!(genres.len(), 1);
        assert_eq!(genres[0].name, "Drama");

        let Json(got) = get_genre(State(state.clone()), Path(genres[0].id)).await.unwrap();
        assert_eq!(got.id, genres[0].id);

        let err = get_genre(State(state.clone()), Path(9999)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "genre", .. }));
    }

    #[tokio::test]
    async fn populate_requires_admin() {
        let state = test_state().await;
        let u = seed_user(&state.db, "alice", Role::User).await;

        let err = populate_movies(
            State(state.clone()),
            CurrentUser(u),
            Json(PopulateRequest { pages: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
