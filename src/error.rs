use thiserror::Error;

/// Why [`Allocator::acquire`](crate::Allocator::acquire) could not hand out a
/// span. Neither kind is retried internally.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  #[error("invalid request: {size} is not a valid payload size")]
  InvalidRequest { size: isize },

  #[error("out of memory: the grower could not provide {requested} bytes")]
  OutOfMemory { requested: usize },
}
