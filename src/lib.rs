pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod flags;
pub mod graph;
pub mod models;
