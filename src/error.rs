use thiserror::Error;

/// Failures raised by the resolution procedure itself, as opposed to
/// rejection reasons supplied by producers.
///
/// Rejection reasons are an arbitrary `E`, so wherever the procedure may
/// need to reject on its own (a cyclic chain), `E: From<ChainError>` is
/// required.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// A promise was asked to resolve with itself.
    #[error("chaining cycle detected: a promise cannot resolve with itself")]
    CyclicChain,
}

impl From<ChainError> for String {
    fn from(err: ChainError) -> Self {
        err.to_string()
    }
}
