use thiserror::Error;

/// Outcome of a failed `get_or_compute`, shared by every waiter of the flight.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError<E> {
    #[error("{0}")]
    Compute(E),

    #[error("computation for '{key}' ended without producing a result")]
    Aborted { key: String },
}

impl<E> CacheError<E> {
    pub fn compute_error(&self) -> Option<&E> {
        match self {
            CacheError::Compute(e) => Some(e),
            CacheError::Aborted { .. } => None,
        }
    }
}
