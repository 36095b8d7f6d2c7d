//! Comparison error types.

/// Errors raised by a [`crate::Comparator`].
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// The supplied secret is unusable.
    #[error("Identity error: {0}")]
    Identity(String),

    /// A message was malformed, out of order, or carried a proof that
    /// failed verification.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The operation is not allowed once the comparison has finished.
    #[error("Invalid state: {operation} after the comparison has finished")]
    InvalidState { operation: &'static str },
}

impl CompareError {
    pub(crate) fn identity(message: impl Into<String>) -> Self {
        Self::Identity(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
