use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Set};

use crate::{
    entities::{Role, movie, review, user},
    models::now_sec,
};

pub async fn test_db() -> DatabaseConnection {
    // Single connection: each pooled sqlite :memory: connection would be its
    // own database.
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    db.execute_unprepared("PRAGMA foreign_keys=ON").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn seed_user(db: &DatabaseConnection, username: &str, role: Role) -> user::Model {
    user::ActiveModel {
        email: Set(format!("{username}@example.com")),
        username: Set(username.to_string()),
        password_hash: Set("hash".to_string()),
        role: Set(role),
        created_at: Set(now_sec()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_movie(db: &DatabaseConnection, tmdb_id: i32, title: &str) -> movie::Model {
    movie::ActiveModel {
        tmdb_id: Set(tmdb_id),
        title: Set(title.to_string()),
        description: Set(None),
        release_date: Set(Some("2024-01-01".to_string())),
        poster_url: Set(None),
        popularity: Set(None),
        avg_rating: Set(0.0),
        created_at: Set(now_sec()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_review(
    db: &DatabaseConnection,
    user_id: i32,
    movie_id: i32,
    rating: Option<i16>,
) -> review::Model {
    review::ActiveModel {
        user_id: Set(user_id),
        movie_id: Set(movie_id),
        diary_entry_id: Set(None),
        rating: Set(rating),
        comment: Set(None),
        created_at: Set(now_sec()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

