pub mod filters;
pub mod ingest;
pub mod logging;
pub mod ranking;
pub mod storage;
pub mod votes;
pub mod web;
