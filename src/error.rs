use std::fmt;
use std::io::Error as IoError;

use crate::response::Response;

/// Alias for results with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while driving a request.
///
/// Transport problems are retried while the retry budget and the retry
/// predicate allow it; everything else surfaces immediately. Whenever an
/// error is raised, the connection it happened on has already been closed
/// and removed from the pool.
#[derive(Debug)]
pub enum Error {
    /// The url could not be understood.
    BadUrl(String),
    /// The url scheme is not `http` or `https`.
    UnsupportedScheme(String),
    /// An `https` request was made but no TLS connector is available.
    ///
    /// Either enable the **tls** feature or configure a custom
    /// [`Connector`](crate::Connector) that can open TLS streams.
    MissingTlsProvider(String),
    /// DNS lookup failed.
    DnsFailed(String),
    /// Connection to server failed.
    ConnectionFailed(String),
    /// The server closed the connection before sending a status line.
    PrematureDisconnection,
    /// More redirects than the configured maximum depth.
    TooManyRedirects(u32),
    /// A redirect `Location` that could not be resolved against the
    /// current url.
    BadLocation(String),
    /// An authentication challenge with a scheme token no registered
    /// authenticator handles.
    UnknownAuthType(String),
    /// A status line we don't understand, e.g. not `HTTP/1.1 200 OK`.
    BadStatus,
    /// A header line that couldn't be parsed.
    BadHeader,
    /// The server responded 4xx.
    ///
    /// Read the inner response body for details and to return the
    /// connection to the pool.
    ClientError(Box<Response>),
    /// The server responded 5xx.
    ///
    /// Read the inner response body for details and to return the
    /// connection to the pool.
    ServerError(Box<Response>),
    /// The server responded with a status outside 2xx that is neither a
    /// redirect, an auth challenge, a 4xx nor a 5xx.
    UnexpectedStatus(Box<Response>),
    /// The form or multipart inputs could not be encoded into a body.
    FormDataError(String),
    /// Some unspecified `std::io::Error`.
    Io(IoError),
}

impl Error {
    /// The response carried by [`ClientError`](Error::ClientError),
    /// [`ServerError`](Error::ServerError) or
    /// [`UnexpectedStatus`](Error::UnexpectedStatus), if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Error::ClientError(r) | Error::ServerError(r) | Error::UnexpectedStatus(r) => Some(*r),
            _ => None,
        }
    }

    /// The status of the carried response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ClientError(r) | Error::ServerError(r) | Error::UnexpectedStatus(r) => {
                Some(r.status())
            }
            _ => None,
        }
    }

    pub(crate) fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::PrematureDisconnection
                | Error::DnsFailed(_)
                | Error::ConnectionFailed(_)
                | Error::Io(_)
        )
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadUrl(url) => write!(f, "bad url: {}", url),
            Error::UnsupportedScheme(scheme) => write!(f, "unsupported url scheme: {}", scheme),
            Error::MissingTlsProvider(host) => {
                write!(f, "https requested without a tls provider: {}", host)
            }
            Error::DnsFailed(err) => write!(f, "dns lookup failed: {}", err),
            Error::ConnectionFailed(err) => write!(f, "connection failed: {}", err),
            Error::PrematureDisconnection => {
                write!(f, "server disconnected before sending a response")
            }
            Error::TooManyRedirects(n) => write!(f, "too many redirects ({})", n),
            Error::BadLocation(loc) => write!(f, "bad redirect location: {}", loc),
            Error::UnknownAuthType(scheme) => {
                write!(f, "no authenticator for challenge scheme: {}", scheme)
            }
            Error::BadStatus => write!(f, "bad status line"),
            Error::BadHeader => write!(f, "bad header line"),
            Error::ClientError(r) => write!(f, "client error: {} {}", r.status(), r.status_text()),
            Error::ServerError(r) => write!(f, "server error: {} {}", r.status(), r.status_text()),
            Error::UnexpectedStatus(r) => {
                write!(f, "unexpected status: {} {}", r.status(), r.status_text())
            }
            Error::FormDataError(msg) => write!(f, "form data error: {}", msg),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}
