use thiserror::Error;

/// Failures of the underlying growth primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
  #[error("region exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },
  #[error("sbrk refused to move the program break")]
  Sbrk,
  #[error("program break was moved by another caller")]
  Discontiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error(transparent)]
  Region(#[from] RegionError),
  #[error("chunk size {0} must be a multiple of 8 and at least 16 bytes")]
  InvalidChunkSize(usize),
  #[error("heap is already initialized")]
  AlreadyInitialized,
  #[error("request of {0} bytes exceeds the largest representable block")]
  TooLarge(usize),
}

pub type Result<T> = core::result::Result<T, HeapError>;
