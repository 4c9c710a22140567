// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for session store operations.

use std::fmt::{self, Display};

/// The reason a session store operation failed.
///
/// Every kind is a contract outcome reported synchronously to the caller. The store
/// never retries an operation on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No entry exists for the key.
    NotFound,
    /// An entry exists, but its value is not of the requested type.
    TypeMismatch,
    /// An entry existed, but its time-to-live had elapsed at access time.
    ///
    /// The entry is evicted as a side effect, so a subsequent lookup reports [`NotFound`](Self::NotFound).
    Expired,
    /// An insert was attempted against a key whose entry is still live.
    AlreadyExists,
    /// Background reclamation was already started for this store.
    ReclamationStarted,
    /// Background reclamation was requested outside of a Tokio runtime.
    RuntimeUnavailable,
}

impl ErrorKind {
    /// Returns a short, stable name for the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::TypeMismatch => "type mismatch",
            Self::Expired => "expired",
            Self::AlreadyExists => "already exists",
            Self::ReclamationStarted => "reclamation already started",
            Self::RuntimeUnavailable => "no async runtime available",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a session store operation.
///
/// Use [`Error::kind`] or one of the `is_*` predicates to distinguish outcomes.
///
/// # Examples
///
/// ```
/// use session_store::SessionStore;
/// use tick::Clock;
///
/// let store = SessionStore::new(Clock::new_frozen());
///
/// let error = store.get::<String>("missing").unwrap_err();
/// assert!(error.is_not_found());
/// ```
#[ohno::error]
#[display("session store operation failed: {kind}")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` if the key was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Returns `true` if the stored value has a different type than requested.
    #[must_use]
    pub fn is_type_mismatch(&self) -> bool {
        self.kind == ErrorKind::TypeMismatch
    }

    /// Returns `true` if the key was present but had aged out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.kind == ErrorKind::Expired
    }

    /// Returns `true` if an insert hit a live entry.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.kind == ErrorKind::AlreadyExists
    }

    /// Returns `true` if reclamation had already been started.
    #[must_use]
    pub fn is_reclamation_started(&self) -> bool {
        self.kind == ErrorKind::ReclamationStarted
    }

    /// Returns `true` if reclamation could not find a runtime to run on.
    #[must_use]
    pub fn is_runtime_unavailable(&self) -> bool {
        self.kind == ErrorKind::RuntimeUnavailable
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// A specialized [`Result`] type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
