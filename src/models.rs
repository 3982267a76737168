use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::entities::{diary_entry, review};

fn default_limit() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl Page {
    pub fn limit(&self) -> u64 {
        self.limit.clamp(1, 100)
    }
}

#[derive(Debug, Deserialize)]
pub struct MovieListQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub search: Option<String>,
    pub min_rating: Option<f64>,
    pub year: Option<i16>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub movie_id: Option<i32>,
    pub user_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewCreate {
    pub movie_id: i32,
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewUpdate {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

/// Moderation payload. Accepts a rating field so that an attempt to change
/// it can be rejected explicitly rather than silently dropped.
#[derive(Debug, Deserialize)]
pub struct ReviewModerateUpdate {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiaryCreate {
    pub movie_id: i32,
    pub watched_on: Date,
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiaryUpdate {
    pub watched_on: Option<Date>,
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

/// Diary entry joined with its optional review.
#[derive(Debug, Serialize)]
pub struct DiaryOut {
    pub id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    pub watched_on: String,
    pub created_at: i64,
    pub review_id: Option<i32>,
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

impl DiaryOut {
    pub fn from_parts(entry: diary_entry::Model, review: Option<review::Model>) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            movie_id: entry.movie_id,
            watched_on: entry.watched_on,
            created_at: entry.created_at,
            review_id: review.as_ref().map(|r| r.id),
            rating: review.as_ref().and_then(|r| r.rating),
            comment: review.and_then(|r| r.comment),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WatchlistAdd {
    pub movie_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct PopulateRequest {
    pub pages: Option<u32>,
}

pub fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}
