pub mod fetcher;
pub mod retry;
pub mod traits;
pub mod youtube;

pub use fetcher::{ChunkedFetcher, FetchOptions, FetchResult};
pub use retry::{Backoff, BatchOutcome, RetryPolicy};
pub use traits::{FetchBatch, MetadataSource, Retryable};
