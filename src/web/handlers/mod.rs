//! HTTP request handlers, grouped by resource.

pub mod admin;
pub mod comments;
pub mod health;
pub mod ratings;
pub mod supplements;
pub mod votes;
