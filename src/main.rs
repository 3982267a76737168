mod auth;
mod catalog;
mod config;
mod db;
mod diary;
mod entities;
mod error;
mod models;
mod moderation;
mod ratings;
mod reviews;
mod routes;
#[cfg(test)]
mod test_util;
mod tmdb;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Config, tmdb::TmdbClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub tmdb: Arc<TmdbClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,movielog=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent("movielog/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;

    let tmdb = TmdbClient::new(
        http,
        config.tmdb_access_token.clone(),
        config.tmdb_base_url.clone(),
        config.tmdb_image_base_url.clone(),
        config.tmdb_rps,
    );

    let state = Arc::new(AppState { config: config.clone(), db, tmdb: Arc::new(tmdb) });

    let app = Router::new()
        .route("/movies", get(routes::list_movies))
        .route("/movies/{movie_id}", get(routes::get_movie))
        .route("/movies/tmdb/{tmdb_id}", get(routes::get_movie_by_tmdb_id))
        .route("/movies/import/{tmdb_id}", post(routes::import_movie))
        .route("/movies/populate", post(routes::populate_movies))
        .route("/genres", get(routes::list_genres))
        .route("/genres/{genre_id}", get(routes::get_genre))
        .route("/reviews", post(routes::create_review).get(routes::list_reviews))
        .route("/reviews/me", get(routes::list_my_reviews))
        .route("/reviews/movie/{movie_id}", get(routes::list_movie_reviews))
        .route("/reviews/user/{user_id}", get(routes::list_user_reviews))
        .route(
            "/reviews/{review_id}",
            get(routes::get_review).put(routes::update_review).delete(routes::delete_review),
        )
        .route(
            "/reviews/{review_id}/moderate",
            put(routes::moderate_review).delete(routes::moderate_delete_review),
        )
        .route("/diary", post(routes::create_diary_entry))
        .route("/diary/me", get(routes::list_my_diary))
        .route(
            "/diary/{entry_id}",
            put(routes::update_diary_entry).delete(routes::delete_diary_entry),
        )
        .route("/watchlist", post(routes::add_to_watchlist))
        .route("/watchlist/me", get(routes::list_my_watchlist))
        .route("/watchlist/{movie_id}", delete(routes::remove_from_watchlist))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
