use std::{error, fmt, io, sync};

pub type Result<T> = std::result::Result<T, Error>;

/// The error variants produced by the cluster core.
#[derive(Debug)]
pub enum Error {
    /// A seed string could not be parsed into a server address.
    AddressParseError(String),
    /// An invalid argument or configuration value was provided.
    ArgumentError(String),
    /// A transport connection could not be established or used.
    ConnectionError(String),
    /// A socket operation exceeded its deadline.
    SocketTimeoutError(String),
    /// No pooled connection became available within the checkout timeout.
    PoolTimeoutError(String),
    /// Server selection exhausted its timeout without a matching candidate.
    NoServerAvailableError(String),
    IoError(io::Error),
    /// An operation returned a malformed or unexpected response.
    ResponseError(String),
    LockError,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Error::SocketTimeoutError(err.to_string())
            }
            _ => Error::IoError(err),
        }
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Error {
        Error::LockError
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::AddressParseError(ref inner) => inner.fmt(fmt),
            Error::ArgumentError(ref inner) => inner.fmt(fmt),
            Error::ConnectionError(ref inner) => inner.fmt(fmt),
            Error::SocketTimeoutError(ref inner) => inner.fmt(fmt),
            Error::PoolTimeoutError(ref inner) => inner.fmt(fmt),
            Error::NoServerAvailableError(ref inner) => inner.fmt(fmt),
            Error::IoError(ref inner) => inner.fmt(fmt),
            Error::ResponseError(ref inner) => inner.fmt(fmt),
            Error::LockError => write!(fmt, "Lock poisoned."),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(ref inner) => Some(inner),
            _ => None,
        }
    }
}
