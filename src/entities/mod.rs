pub mod diary_entry;
pub mod genre;
pub mod movie;
pub mod movie_genre;
pub mod review;
pub mod user;
pub mod watchlist;

pub use user::Role;
