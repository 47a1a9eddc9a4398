use thiserror::Error;

/// Error taxonomy for the swap-area manager's public surface (spec §7).
///
/// `CorruptSlot` and a newly-observed saturation event are logged and
/// absorbed at the call site rather than propagated; they still appear
/// here so a caller that wants to observe them can match on a `Result`.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("administrative operation requires authority the caller does not hold")]
    NotPermitted,

    #[error("invalid swap header: {0}")]
    InvalidHeader(String),

    #[error("regular-file backing has a hole in its usable slot range")]
    FileHasHoles,

    #[error("backing store is already registered to another area")]
    AlreadyActive,

    #[error("no active area is registered for the given identity")]
    NotActive,

    #[error("insufficient memory to {0}")]
    OutOfMemory(&'static str),

    #[error("operation was interrupted by a caller signal")]
    Interrupted,

    #[error("entry refers to a slot with counter 0 or BAD, or an unregistered area")]
    CorruptSlot,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
