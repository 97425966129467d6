/// Errors that can occur while configuring a buffer pool.
///
/// Taking and giving buffers never fails; exhaustion falls back to a fresh
/// allocation.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool configuration is inconsistent.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
