use thiserror::Error;

pub type Result<T, E = PartitionError> = std::result::Result<T, E>;

/// Errors raised while planning how work is split across workers.
///
/// Validation happens before any computation, so a returned error never
/// comes with a partially built plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
  #[error("Invalid argument: {0}")]
  InvalidArgument(String),
}
