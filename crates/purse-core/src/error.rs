use thiserror::Error;

/// Ledger-wide error types for the Purse staking ledger.
///
/// Every entry point validates before it mutates, so any of these errors
/// leaves the ledger exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Zero amount, zero address, or an otherwise malformed argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller is not the designated pool, distributor, or owner.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Withdrawal, claim, transfer, or recovery exceeds what is available.
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Nothing owed, nothing due, or nothing to distribute.
    #[error("Nothing to do: {0}")]
    NothingToDo(String),

    /// Operation blocked by an administrative pause.
    #[error("Paused: {0}")]
    Paused(String),

    /// Checked arithmetic overflowed or underflowed.
    #[error("Math overflow: {0}")]
    MathOverflow(String),

    /// Snapshot serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Category of a [`LedgerError`], for matching without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthorized,
    InsufficientBalance,
    NothingToDo,
    Paused,
    MathOverflow,
    Serialization,
}

impl LedgerError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LedgerError::Unauthorized(_) => ErrorKind::Unauthorized,
            LedgerError::InsufficientBalance(_) => ErrorKind::InsufficientBalance,
            LedgerError::NothingToDo(_) => ErrorKind::NothingToDo,
            LedgerError::Paused(_) => ErrorKind::Paused,
            LedgerError::MathOverflow(_) => ErrorKind::MathOverflow,
            LedgerError::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
