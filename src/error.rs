//! Unified error type for controller operations and profile commands.
//!
//! `AppError` is the single error type returned by every public operation.
//! It serializes as `{ "kind": "...", "message": "..." }` so a front-end can
//! programmatically distinguish error categories.

use serde::ser::SerializeStruct;

/// Application-level error.
///
/// None of these are fatal: the worst outcome of any of them is "no active
/// profile".
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    /// The tunnel provider software is absent or refused the command.
    #[error("{0}")]
    ProviderUnavailable(String),

    /// The network observer returned inconsistent state.
    #[error("{0}")]
    MalformedSnapshot(String),

    /// Errors from the profile repository / SQLite.
    #[error("{0}")]
    Repository(String),

    /// I/O and OS-level errors.
    #[error("{0}")]
    Io(String),

    /// Invalid or missing user input.
    #[error("{0}")]
    InvalidInput(String),

    /// A profile key that does not exist.
    #[error("{0}")]
    NotFound(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ProviderUnavailable(_) => "ProviderUnavailable",
            AppError::MalformedSnapshot(_) => "MalformedSnapshot",
            AppError::Repository(_) => "Repository",
            AppError::Io(_) => "Io",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Repository(format!("{err:#}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Repository(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Repository(err.to_string())
    }
}
