//! Placeholder filesystem used when a `DavHandler` is built with no backend.
//!
//! Every method returns `FsError::NotImplemented`; `davhandler` checks
//! [`is_voidfs`] up front and answers 404 without ever calling into it.
use crate::davpath::DavPath;
use crate::fs::*;

#[derive(Debug, Clone)]
pub struct VoidFs;

impl VoidFs {
    pub fn new() -> Box<VoidFs> {
        Box::new(VoidFs)
    }
}

impl DavFileSystem for VoidFs {
    fn metadata<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn read_dir<'a>(&'a self, _path: &'a DavPath, _meta: ReadDirMeta) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn open<'a>(&'a self, _path: &'a DavPath, _options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::is_voidfs;
    use crate::memfs::MemFs;

    #[test]
    fn test_is_void() {
        assert!(is_voidfs(&VoidFs::new()));
        assert!(!is_voidfs(&MemFs::new()));
    }
}
