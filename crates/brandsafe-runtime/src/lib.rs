mod orchestrator;
mod report;
mod sink;

pub use orchestrator::{AuditOrchestrator, ChannelRequest};
pub use report::{AuditReport, ItemFailure, RunState, RunStats};
pub use sink::{MemorySink, ScoreSink, SinkError};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("keyword error: {0}")]
    Keywords(String),
    #[error("sink error: {0}")]
    Sink(String),
}
