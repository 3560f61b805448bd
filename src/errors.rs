use std::fmt;
use std::io;

use http::StatusCode;

use crate::fs::FsError;

/// The one error type that crosses module boundaries inside this crate.
///
/// Every verb handler converts its `Result<_, DavError>` into an HTTP
/// response at a single place (`DavInner::handle`); no handler maps status
/// codes itself.
#[derive(Debug)]
pub(crate) enum DavError {
    XmlReadError,
    XmlParseError,
    InvalidPath,
    IllegalPath,
    ForbiddenPath,
    UnknownDavMethod,
    Fs(FsError),
    Io(io::Error),
    XmlReader(xml::reader::Error),
    XmlWriter(xml::writer::Error),
    /// A plain status code, with the connection kept alive.
    Status(StatusCode),
    /// A plain status code, closing the connection afterwards.
    ///
    /// Used for cases where the request body may not have been fully
    /// drained (oversized uploads, malformed range headers) and the
    /// connection state is therefore unknown.
    StatusClose(StatusCode),
}

impl std::error::Error for DavError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DavError::Io(e) => Some(e),
            DavError::XmlReader(e) => Some(e),
            DavError::XmlWriter(e) => Some(e),
            DavError::Fs(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for DavError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DavError::XmlReadError => write!(f, "error reading XML body"),
            DavError::XmlParseError => write!(f, "error parsing XML body"),
            DavError::InvalidPath => write!(f, "invalid path"),
            DavError::IllegalPath => write!(f, "path outside of configured prefix"),
            DavError::ForbiddenPath => write!(f, "path escapes document root"),
            DavError::UnknownDavMethod => write!(f, "unknown DAV method"),
            DavError::Fs(e) => write!(f, "filesystem error: {}", e),
            DavError::Io(e) => write!(f, "I/O error: {}", e),
            DavError::XmlReader(e) => write!(f, "XML parse error: {}", e),
            DavError::XmlWriter(e) => write!(f, "XML generate error: {}", e),
            DavError::Status(s) | DavError::StatusClose(s) => write!(f, "{}", s),
        }
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::Io(e)
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::Fs(e)
    }
}

impl From<xml::reader::Error> for DavError {
    fn from(e: xml::reader::Error) -> Self {
        DavError::XmlReader(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriter(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

fn ioerror_to_status(e: &io::Error) -> StatusCode {
    match e.kind() {
        io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        io::ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        io::ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::Fs(e) => e.statuscode(),
            DavError::Io(e) => ioerror_to_status(e),
            DavError::XmlReader(_) => StatusCode::BAD_REQUEST,
            DavError::XmlWriter(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Status(s) | DavError::StatusClose(s) => *s,
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_))
    }
}
