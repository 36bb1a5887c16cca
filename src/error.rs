//! Typed error taxonomy for the retrieval and prediction pipeline.
//!
//! Every core operation returns [`Result`], so callers can tell malformed
//! input, dimension violations, unreachable collaborators, and unexpected
//! backend failures apart and map them to their own transport codes.
//!
//! A query that succeeds but finds nothing is *not* an error: search returns
//! an empty list and prediction returns a result whose
//! [`basis`](crate::models::PredictionResult::basis) is
//! [`NoMatchingData`](crate::models::PredictionBasis::NoMatchingData).

use std::fmt;

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, PrecedentError>;

/// Boxed source error carried by the infrastructure variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// External collaborator that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    VectorStore,
    Embedding,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::VectorStore => f.write_str("vector store"),
            Service::Embedding => f.write_str("embedding provider"),
        }
    }
}

/// Coarse classification of a [`PrecedentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    DimensionMismatch,
    ServiceUnavailable,
    Backend,
}

#[derive(Debug, Error)]
pub enum PrecedentError {
    /// Malformed input, rejected before any backend call.
    #[error("validation error: {0}")]
    Validation(String),

    /// A vector's length differs from the configured dimension.
    #[error("dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    /// A collaborator is unreachable or timed out. Never retried here.
    #[error("{service} unavailable during {operation} ({context}): {source}")]
    ServiceUnavailable {
        service: Service,
        operation: &'static str,
        context: String,
        #[source]
        source: BoxError,
    },

    /// Unexpected backend failure, wrapped with the operation that hit it.
    #[error("{operation} failed ({context}): {source}")]
    Backend {
        operation: &'static str,
        context: String,
        #[source]
        source: BoxError,
    },
}

impl PrecedentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PrecedentError::Validation(msg.into())
    }

    pub fn dimension_mismatch(expected: usize, actual: usize, context: impl Into<String>) -> Self {
        PrecedentError::DimensionMismatch {
            expected,
            actual,
            context: context.into(),
        }
    }

    pub fn unavailable(
        service: Service,
        operation: &'static str,
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        PrecedentError::ServiceUnavailable {
            service,
            operation,
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn backend(
        operation: &'static str,
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        PrecedentError::Backend {
            operation,
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PrecedentError::Validation(_) => ErrorKind::Validation,
            PrecedentError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            PrecedentError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            PrecedentError::Backend { .. } => ErrorKind::Backend,
        }
    }

    pub fn is_service_unavailable(&self) -> bool {
        self.kind() == ErrorKind::ServiceUnavailable
    }
}

/// Check a vector against the configured dimension.
pub fn check_dims(expected: usize, vector: &[f32], context: impl fmt::Display) -> Result<()> {
    if vector.len() != expected {
        return Err(PrecedentError::dimension_mismatch(
            expected,
            vector.len(),
            context.to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dims() {
        assert!(check_dims(3, &[0.0, 1.0, 2.0], "query").is_ok());
        let err = check_dims(3, &[0.0, 1.0], "query").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(
            err.to_string(),
            "dimension mismatch (query): expected 3, got 2"
        );
    }

    #[test]
    fn test_unavailable_keeps_context() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = PrecedentError::unavailable(Service::Embedding, "embed", "query text", io);
        assert!(err.is_service_unavailable());
        let msg = err.to_string();
        assert!(msg.contains("embedding provider unavailable during embed"));
        assert!(msg.contains("refused"));
    }
}
