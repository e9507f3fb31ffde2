pub mod config;
pub mod error;
pub mod keywords;
pub mod models;
pub mod normalize;
pub mod scoring;
