use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;
use crate::translate::{BackendKind, ToolDeclaration};

/// The error type for a model backend.
pub trait ModelBackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a model backend, which is an entry for sampling
/// conversation turns with function-calling support.
///
/// Tools are declared once, before the first turn, with the declarations
/// produced by [`translate`](crate::translate()) for the backend's
/// [`kind`](ModelBackend::kind). After that the backend should behave like
/// a stateless object: every call to [`converse`](ModelBackend::converse)
/// carries the complete conversation, and the backend must not rely on any
/// history of its own.
pub trait ModelBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: ModelBackendError;

    /// The response type for this backend.
    type Response: ModelResponse<Error = Self::Error>;

    /// Returns which declaration shape this backend expects.
    fn kind(&self) -> BackendKind;

    /// Registers the tools that the model may call.
    ///
    /// Calling this again replaces the previously declared set.
    fn declare_tools(&mut self, declarations: Vec<ToolDeclaration>);

    /// Sends the conversation to the model.
    fn converse(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
