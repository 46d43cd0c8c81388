/// Error type for this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickbucketError {
    /// Invalid refill rate.
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    /// Invalid bucket capacity.
    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),

    /// The wait context was cancelled.
    #[error("wait cancelled")]
    Cancelled,

    /// The wait context deadline elapsed.
    #[error("wait deadline exceeded")]
    DeadlineExceeded,
}
