use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The worker did not finish the handshake in time.
    ConnectionTimeout,
    /// The worker could not be spawned, or it violated the protocol.
    Protocol,
    /// The session is not connected to a worker.
    NotConnected,
    /// Error occurred while executing the tool.
    ToolExecution,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConnectionTimeout => write!(f, "Connection timed out"),
            ErrorKind::Protocol => write!(f, "Protocol error"),
            ErrorKind::NotConnected => write!(f, "Not connected"),
            ErrorKind::ToolExecution => write!(f, "Tool execution error"),
        }
    }
}

/// Describes a tool session error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

impl Error {
    /// Creates a new error with the `ConnectionTimeout` kind.
    #[inline]
    pub fn connection_timeout() -> Self {
        Self::new(ErrorKind::ConnectionTimeout)
    }

    /// Creates a new error with the `Protocol` kind.
    #[inline]
    pub fn protocol() -> Self {
        Self::new(ErrorKind::Protocol)
    }

    /// Creates a new error with the `NotConnected` kind.
    #[inline]
    pub fn not_connected() -> Self {
        Self::new(ErrorKind::NotConnected)
    }

    /// Creates a new error with the `ToolExecution` kind.
    #[inline]
    pub fn tool_execution() -> Self {
        Self::new(ErrorKind::ToolExecution)
    }

    #[inline]
    fn new(kind: ErrorKind) -> Self {
        Self { kind, reason: None }
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl StdError for Error {}
