pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod signals;
pub mod verdict;
