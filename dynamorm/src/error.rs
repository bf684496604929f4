use std::error;
use std::fmt;

/// Categories of errors returned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A type was used without being registered, or its descriptor is
    /// internally inconsistent (missing hash key, duplicate field names,
    /// an index referring to a field that does not exist, zero
    /// serializable fields, or an unresolvable index in `local_index`).
    Schema,
    /// A value could not be converted to or from the requested `DbType`.
    Encoding,
    /// A predicate referenced a constant of the record type, used an
    /// unsupported operator, or compiled to zero placeholders where one
    /// was required.
    Expression,
    /// A retryable store error surfaced from the backend. Callers should
    /// never see this directly — [`crate::retry::exec`] absorbs it.
    TransientStore,
    /// A non-retryable store error, surfaced immediately.
    PermanentStore,
    /// The requested item does not exist. Passed through without retry.
    NotFound,
    /// `max_retry_on_exception_timeout` was exceeded inside the retry
    /// wrapper, or a schema readiness deadline was exceeded.
    Timeout,
}

impl ErrorKind {
    /// Builds an error from this kind and a literal message.
    pub fn with_message(self, message: impl Into<String>) -> Error {
        Error {
            kind: self,
            message: message.into(),
        }
    }

    /// Builds an error from this kind and a displayable context value.
    pub fn with_context(self, context: impl fmt::Display) -> Error {
        let message = match self {
            ErrorKind::Schema => format!("schema error: {context}"),
            ErrorKind::Encoding => format!("encoding error: {context}"),
            ErrorKind::Expression => format!("expression error: {context}"),
            ErrorKind::TransientStore => format!("transient store error: {context}"),
            ErrorKind::PermanentStore => format!("store error: {context}"),
            ErrorKind::NotFound => format!("not found: {context}"),
            ErrorKind::Timeout => format!("timed out: {context}"),
        };
        Error {
            kind: self,
            message,
        }
    }
}

/// Error type returned by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Returns the kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the field name this error concerns, if the message was
    /// built with one (encoding/schema errors always include it inline).
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Result type returned by the engine.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        ErrorKind::Encoding.with_context(error)
    }
}

impl<E, R> From<aws_sdk_dynamodb::error::SdkError<E, R>> for Error
where
    E: std::error::Error + aws_sdk_dynamodb::error::ProvideErrorMetadata + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    fn from(error: aws_sdk_dynamodb::error::SdkError<E, R>) -> Self {
        let code = error
            .as_service_error()
            .and_then(aws_sdk_dynamodb::error::ProvideErrorMetadata::code)
            .unwrap_or("Unknown")
            .to_owned();
        if crate::retry::is_retryable_code(&code) {
            ErrorKind::TransientStore.with_context(format_args!("{code}: {error}"))
        } else if code == "ConditionalCheckFailedException" {
            ErrorKind::PermanentStore.with_context(format_args!("{code}: {error}"))
        } else {
            ErrorKind::PermanentStore.with_context(error)
        }
    }
}
