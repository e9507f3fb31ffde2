pub mod client;
pub mod error;
pub mod types;

pub use client::YoutubeClient;
pub use error::YoutubeError;
