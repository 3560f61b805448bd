//! The resource backend abstraction.
//!
//! `DavFileSystem` is the one pluggable collaborator in this crate: every
//! other component (lock registry, property store, If-header evaluator) is a
//! concrete implementation, but the resource tree itself is swappable so the
//! same dispatcher can serve an in-memory tree (`memfs`) or the local
//! filesystem (`localfs`).
//!
//! Methods return boxed futures (`FsFuture<T>`) rather than being declared
//! `async fn`, because `DavFileSystem` is used as a trait object
//! (`Box<dyn DavFileSystem>`) and `async fn` in traits is not (yet) object
//! safe.
use std::any::Any;
use std::fmt;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use bytes::{Buf, Bytes};
use futures_util::stream::Stream;
use http::StatusCode;

use crate::davpath::DavPath;

/// Future returned by `DavFileSystem`/`DavFile`/`DavDirEntry` methods.
pub type FsFuture<'a, T> = Pin<Box<dyn Future<Output = FsResult<T>> + Send + 'a>>;

/// Stream of directory entries, or of file data chunks.
pub type FsStream<T> = Pin<Box<dyn Stream<Item = FsResult<T>> + Send>>;

pub type FsResult<T> = Result<T, FsError>;

/// Errors a resource backend can report. Mapped to an HTTP status by
/// [`FsError::statuscode`]; callers never need to know the backend's own
/// error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
    InsufficientStorage,
    LockConflict,
    TooLarge,
    IsRemote,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            FsError::NotImplemented => "not implemented",
            FsError::GeneralFailure => "general failure",
            FsError::Exists => "already exists",
            FsError::NotFound => "not found",
            FsError::Forbidden => "forbidden",
            FsError::InsufficientStorage => "insufficient storage",
            FsError::LockConflict => "lock conflict",
            FsError::TooLarge => "payload too large",
            FsError::IsRemote => "is a remote resource",
        };
        write!(f, "{}", s)
    }
}

impl std::error::Error for FsError {}

impl FsError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
            FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
            FsError::NotFound => StatusCode::NOT_FOUND,
            FsError::Forbidden => StatusCode::FORBIDDEN,
            FsError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            FsError::LockConflict => StatusCode::LOCKED,
            FsError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            FsError::IsRemote => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound,
            std::io::ErrorKind::PermissionDenied => FsError::Forbidden,
            std::io::ErrorKind::AlreadyExists => FsError::Exists,
            _ => FsError::GeneralFailure,
        }
    }
}

/// Whether `read_dir` should eagerly fetch child metadata, so backends where
/// that's expensive (network filesystems) can skip it when not needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirMeta {
    Data,
    DataSymlink,
    None,
}

/// Subset of the request's open-mode relevant to a resource backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub read:       bool,
    pub write:      bool,
    pub append:     bool,
    pub truncate:   bool,
    pub create:     bool,
    pub create_new: bool,
}

impl OpenOptions {
    pub fn read() -> OpenOptions {
        OpenOptions { read: true, ..Default::default() }
    }

    pub fn write() -> OpenOptions {
        OpenOptions { write: true, create: true, truncate: true, ..Default::default() }
    }
}

/// Metadata about a resource: size, timestamps, collection-ness.
pub trait DavMetaData: Debug + Send + Sync + 'static {
    fn len(&self) -> u64;
    fn modified(&self) -> FsResult<SystemTime>;

    fn created(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }

    fn is_dir(&self) -> bool;

    fn is_file(&self) -> bool {
        !self.is_dir()
    }

    fn executable(&self) -> FsResult<bool> {
        Err(FsError::NotImplemented)
    }

    /// Strong validator. Backends that can produce one cheaply (e.g. a hash
    /// of mtime+size) should override this; the default has none.
    fn etag(&self) -> Option<String> {
        None
    }
}

/// A directory entry as returned from `read_dir`.
pub trait DavDirEntry: Debug + Send + Sync {
    fn name(&self) -> Vec<u8>;
    fn metadata<'a>(&'a self) -> FsFuture<'a, Box<dyn DavMetaData>>;

    fn is_dir<'a>(&'a self) -> FsFuture<'a, bool> {
        Box::pin(async move { Ok(self.metadata().await?.is_dir()) })
    }

    fn is_file<'a>(&'a self) -> FsFuture<'a, bool> {
        Box::pin(async move { Ok(self.metadata().await?.is_file()) })
    }

    fn is_symlink<'a>(&'a self) -> FsFuture<'a, bool> {
        Box::pin(async move { Ok(false) })
    }
}

/// An open file handle.
pub trait DavFile: Debug + Send + Sync {
    fn metadata<'a>(&'a mut self) -> FsFuture<'a, Box<dyn DavMetaData>>;
    fn write_bytes<'a>(&'a mut self, buf: Bytes) -> FsFuture<'a, ()>;

    fn write_buf<'a>(&'a mut self, mut buf: Box<dyn Buf + Send + 'a>) -> FsFuture<'a, ()> {
        let bytes = buf.copy_to_bytes(buf.remaining());
        self.write_bytes(bytes)
    }

    fn read_bytes<'a>(&'a mut self, count: usize) -> FsFuture<'a, Bytes>;
    fn seek<'a>(&'a mut self, pos: std::io::SeekFrom) -> FsFuture<'a, u64>;

    fn flush<'a>(&'a mut self) -> FsFuture<'a, ()> {
        Box::pin(async move { Ok(()) })
    }
}

/// The resource backend. The pluggable collaborator: everything above the
/// dispatcher level talks to a `Box<dyn DavFileSystem>` and never downcasts
/// it except for the "no backend configured" check below.
pub trait DavFileSystem: Debug + Send + Sync + Any {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>>;

    fn read_dir<'a>(&'a self, path: &'a DavPath, meta: ReadDirMeta) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>>;

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>>;

    fn create_dir<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn remove_dir<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn remove_file<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    /// Copy a single resource (not recursive; the dispatcher walks
    /// collections itself so it can report per-member failures in a
    /// multistatus response).
    fn copy<'a>(&'a self, _from: &'a DavPath, _to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    /// Rename/move a single resource. Used both for file moves and for
    /// collection moves the backend can do atomically; if unsupported the
    /// dispatcher falls back to copy+delete.
    fn rename<'a>(&'a self, _from: &'a DavPath, _to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    /// Whether this backend can do its own atomic rename of a collection (as
    /// opposed to the dispatcher's copy+delete fallback).
    fn have_adequate_rename(&self) -> bool {
        false
    }
}

pub(crate) fn is_voidfs(fs: &dyn Any) -> bool {
    fs.is::<Box<crate::voidfs::VoidFs>>()
}
