use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};

use barry_model::{ErrorKind, ModelBackendError};

/// The error returned when the model backend fails a turn.
///
/// When a turn fails, the conversation is left exactly as it was before
/// the turn started, so the same message can be sent again.
pub struct BackendError(Box<dyn ModelBackendError>);

impl BackendError {
    #[inline]
    pub(crate) fn new<E: ModelBackendError>(err: E) -> Self {
        Self(Box::new(err))
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    /// Returns the error reported by the backend.
    #[inline]
    pub fn get_ref(&self) -> &dyn ModelBackendError {
        self.0.as_ref()
    }

    /// Consumes the error, returning the error reported by the backend.
    #[inline]
    pub fn into_inner(self) -> Box<dyn ModelBackendError> {
        self.0
    }
}

impl Debug for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BackendError").field(&self.0).finish()
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.kind())
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}
