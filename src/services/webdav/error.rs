use thiserror::Error;

/// Every failure the WebDAV client can report.
///
/// `Status` and `Path` are the canonical shapes returned by public
/// operations: the operation name, the resource path, and either the HTTP
/// status the server answered with or the nested cause.
#[derive(Debug, Error)]
pub enum DavError {
    #[error("{op} {path}: {status}")]
    Status {
        op: &'static str,
        path: String,
        status: u16,
    },

    #[error("{op} {path}: {source}")]
    Path {
        op: &'static str,
        path: String,
        #[source]
        source: Box<DavError>,
    },

    /// Raised by `verify` to ask the executor for a new authenticator.
    /// Never leaves the request loop.
    #[error("authentication failed, change algorithm")]
    AuthChanged,

    #[error("stopped after 10 redirects")]
    TooManyRedirects,

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("gave up after {0} authentication round trips")]
    RetryLimit(usize),

    #[error("authenticator already registered for scheme {0}")]
    DuplicateScheme(String),

    #[error("a preemptive authorizer may only have a single authentication method")]
    PreemptiveAuthorizer,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed challenge: {0}")]
    Challenge(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed multistatus body: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T, E = DavError> = std::result::Result<T, E>;

impl DavError {
    pub fn status(op: &'static str, path: impl Into<String>, status: u16) -> Self {
        DavError::Status {
            op,
            path: path.into(),
            status,
        }
    }

    /// Attaches the operation name and path to transport and decode errors.
    /// Errors that already carry a path, cancellation and the redirect cap
    /// are returned unchanged.
    pub fn at(self, op: &'static str, path: impl Into<String>) -> Self {
        match self {
            DavError::Status { .. }
            | DavError::Path { .. }
            | DavError::NotADirectory(_)
            | DavError::Cancelled
            | DavError::TooManyRedirects => self,
            other => DavError::Path {
                op,
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// HTTP status carried by this error or the error it wraps
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DavError::Status { status, .. } => Some(*status),
            DavError::Path { source, .. } => source.status_code(),
            DavError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            DavError::Cancelled => true,
            DavError::Path { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_format() {
        let err = DavError::status("ReadStream", "/a/b.txt", 404);
        assert_eq!(err.to_string(), "ReadStream /a/b.txt: 404");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_at_wraps_io_errors_only_once() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = DavError::from(io).at("WriteStream", "/x").at("Other", "/y");
        match &err {
            DavError::Path { op, path, .. } => {
                assert_eq!(*op, "WriteStream");
                assert_eq!(path, "/x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_at_leaves_redirect_cap_verbatim() {
        let err = DavError::TooManyRedirects.at("Connect", "/");
        assert!(matches!(err, DavError::TooManyRedirects));
        assert!(DavError::Cancelled.at("Stat", "/").is_cancelled());
    }

    #[test]
    fn test_nested_status_is_visible() {
        let err = DavError::Path {
            op: "MkdirAll",
            path: "/a".to_string(),
            source: Box::new(DavError::status("MKCOL", "/a", 403)),
        };
        assert_eq!(err.status_code(), Some(403));
        assert!(!err.is_not_found());
    }
}
