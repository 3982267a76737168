use std::{num::NonZeroU32, sync::Arc};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Deserialize;

use crate::error::AppResult;

/// Canonical movie attributes as returned by the catalog provider.
#[derive(Clone, Debug)]
pub struct MovieDetails {
    pub tmdb_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub poster_url: Option<String>,
    pub popularity: Option<f64>,
    pub genres: Vec<String>,
}

pub struct TmdbClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
    image_base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(
        client: reqwest::Client,
        access_token: String,
        base_url: String,
        image_base_url: String,
        rps: u32,
    ) -> Self {
        // Warn once on app load if using mock data
        if access_token.trim().is_empty() {
            tracing::warn!("Using mock TMDB data - no TMDB_ACCESS_TOKEN provided");
        }

        let limiter =
            Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::new(rps.max(1)).unwrap())));
        Self { client, access_token, base_url, image_base_url, limiter }
    }

    fn mock(&self) -> bool {
        self.access_token.trim().is_empty()
    }

    pub async fn movie_details(&self, tmdb_id: i32) -> AppResult<MovieDetails> {
        if self.mock() {
            return Ok(MovieDetails {
                tmdb_id,
                title: format!("Mock Movie {tmdb_id}"),
                description: Some("Mock description".to_string()),
                release_date: Some("1999-10-15".to_string()),
                poster_url: None,
                popularity: Some(1.0),
                genres: vec!["Drama".to_string()],
            });
        }

        self.limiter.until_ready().await;

        let url = format!("{}/movie/{}", self.base_url.trim_end_matches('/'), tmdb_id);
        let resp: DetailsResponse = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(MovieDetails {
            tmdb_id: resp.id,
            title: resp.title,
            description: resp.overview.filter(|s| !s.is_empty()),
            release_date: resp.release_date.filter(|s| !s.is_empty()),
            poster_url: resp
                .poster_path
                .map(|p| format!("{}{p}", self.image_base_url.trim_end_matches('/'))),
            popularity: resp.popularity,
            genres: resp.genres.into_iter().map(|g| g.name).collect(),
        })
    }

    pub async fn popular_movie_ids(&self, page: u32) -> AppResult<Vec<i32>> {
        if self.mock() {
            let base = page as i32 * 1000;
            return Ok((1..=3).map(|i| base + i).collect());
        }

        self.limiter.until_ready().await;

        let url = format!("{}/movie/popular", self.base_url.trim_end_matches('/'));
        let resp: ListingResponse = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("page", page)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.results.into_iter().map(|m| m.id).collect())
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    id: i32,
    title: String,
    overview: Option<String>,
    release_date: Option<String>,
    poster_path: Option<String>,
    popularity: Option<f64>,
    #[serde(default)]
    genres: Vec<GenreEntry>,
}

#[derive(Debug, Deserialize)]
struct GenreEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    results: Vec<ListedMovie>,
}

#[derive(Debug, Deserialize)]
struct ListedMovie {
    id: i32,
}
