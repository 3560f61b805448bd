//! Core RFC 4918 WebDAV (Class 1 and 2) server.
//!
//! This crate implements the protocol machinery — method dispatch, property
//! storage, locking, conditional-request evaluation — against a pluggable
//! [`fs::DavFileSystem`] backend. It does not open a socket itself: embed
//! [`DavHandler`] in whatever HTTP server you're already running (see
//! `src/bin/main.rs` for a minimal `hyper` example).
//!
//! ```no_run
//! use webdav_core::{DavHandler, memfs::MemFs};
//!
//! # async fn doc() {
//! let handler = DavHandler::builder()
//!     .filesystem(MemFs::new())
//!     .strip_prefix("/webdav")
//!     .build_handler();
//! # }
//! ```
#[macro_use]
extern crate log;

mod async_stream;
pub mod body;
mod conditional;
mod davhandler;
mod davheaders;
mod davpath;
mod errors;
mod fs;
mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod index;
mod locks;
#[cfg(feature = "localfs")]
pub mod localfs;
#[cfg(feature = "memfs")]
pub mod memfs;
mod multierror;
mod props;
mod util;
mod voidfs;
mod xmltree_ext;

pub use crate::davhandler::{DavConfig, DavHandler};
pub use crate::davpath::DavPath;
pub use crate::fs::{DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsResult, OpenOptions, ReadDirMeta};
pub use crate::util::{DavMethod, DavMethodSet};

pub(crate) use crate::errors::DavError;
pub(crate) type DavResult<T> = Result<T, DavError>;
