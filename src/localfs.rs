//! Resource backend backed directly by the local filesystem; roughly a 1:1
//! mapping onto `std::fs`.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::SeekFrom;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::stream;

use crate::davpath::DavPath;
use crate::fs::*;

#[derive(Debug, Clone)]
pub struct LocalFs {
    basedir: PathBuf,
    public: bool,
}

impl LocalFs {
    /// Serve `base`. If `public` is set, newly created files/directories get
    /// world-readable modes (644/755) rather than 600/700; umask still
    /// applies on top of either.
    pub fn new<P: AsRef<Path>>(base: P, public: bool) -> Box<LocalFs> {
        Box::new(LocalFs { basedir: base.as_ref().to_path_buf(), public })
    }

    fn fspath(&self, path: &DavPath) -> PathBuf {
        let mut p = self.basedir.clone();
        p.push(path.as_rel_ospath());
        p
    }
}

#[derive(Debug)]
struct LocalMeta(std::fs::Metadata);

impl DavMetaData for LocalMeta {
    fn len(&self) -> u64 {
        self.0.len()
    }

    fn modified(&self) -> FsResult<SystemTime> {
        self.0.modified().map_err(Into::into)
    }

    fn created(&self) -> FsResult<SystemTime> {
        self.0.created().map_err(Into::into)
    }

    fn is_dir(&self) -> bool {
        self.0.is_dir()
    }

    fn executable(&self) -> FsResult<bool> {
        if self.0.is_file() {
            return Ok((self.0.permissions().mode() & 0o100) > 0);
        }
        Err(FsError::NotImplemented)
    }

    fn etag(&self) -> Option<String> {
        // A strong validator would need the file's content hash; hashing
        // mtime+len is cheap and stable across requests, which is all a
        // local-disk backend needs for conditional GET/PUT.
        let mut h = DefaultHasher::new();
        if let Ok(t) = self.0.modified() {
            t.hash(&mut h);
        }
        self.0.len().hash(&mut h);
        Some(format!("{:016x}", h.finish()))
    }
}

#[derive(Debug)]
struct LocalDirEntry {
    entry: std::fs::DirEntry,
}

impl DavDirEntry for LocalDirEntry {
    fn name(&self) -> Vec<u8> {
        use std::os::unix::ffi::OsStrExt;
        self.entry.file_name().as_os_str().as_bytes().to_vec()
    }

    fn metadata<'a>(&'a self) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move { Ok(Box::new(LocalMeta(self.entry.metadata()?)) as Box<dyn DavMetaData>) })
    }
}

#[derive(Debug)]
struct LocalFile(std::fs::File);

impl DavFile for LocalFile {
    fn metadata<'a>(&'a mut self) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move { Ok(Box::new(LocalMeta(self.0.metadata()?)) as Box<dyn DavMetaData>) })
    }

    fn write_bytes<'a>(&'a mut self, buf: Bytes) -> FsFuture<'a, ()> {
        use std::io::Write;
        Box::pin(async move {
            self.0.write_all(&buf)?;
            Ok(())
        })
    }

    fn read_bytes<'a>(&'a mut self, count: usize) -> FsFuture<'a, Bytes> {
        use std::io::Read;
        Box::pin(async move {
            let mut buf = vec![0u8; count];
            let n = self.0.read(&mut buf)?;
            buf.truncate(n);
            Ok(Bytes::from(buf))
        })
    }

    fn seek<'a>(&'a mut self, pos: SeekFrom) -> FsFuture<'a, u64> {
        use std::io::Seek;
        Box::pin(async move { Ok(self.0.seek(pos)?) })
    }

    fn flush<'a>(&'a mut self) -> FsFuture<'a, ()> {
        use std::io::Write;
        Box::pin(async move {
            self.0.flush()?;
            Ok(())
        })
    }
}

impl DavFileSystem for LocalFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let meta = std::fs::metadata(self.fspath(path))?;
            Ok(Box::new(LocalMeta(meta)) as Box<dyn DavMetaData>)
        })
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath, _meta: ReadDirMeta) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let iter = std::fs::read_dir(self.fspath(path))?;
            let entries: Vec<FsResult<Box<dyn DavDirEntry>>> = iter
                .map(|e| e.map(|entry| Box::new(LocalDirEntry { entry }) as Box<dyn DavDirEntry>).map_err(Into::into))
                .collect();
            Ok(Box::pin(stream::iter(entries)) as FsStream<Box<dyn DavDirEntry>>)
        })
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            let file = std::fs::OpenOptions::new()
                .read(options.read)
                .write(options.write)
                .append(options.append)
                .truncate(options.truncate)
                .create(options.create)
                .create_new(options.create_new)
                .mode(if self.public { 0o644 } else { 0o600 })
                .open(self.fspath(path))?;
            Ok(Box::new(LocalFile(file)) as Box<dyn DavFile>)
        })
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            std::fs::DirBuilder::new().mode(if self.public { 0o755 } else { 0o700 }).create(self.fspath(path))?;
            Ok(())
        })
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move { Ok(std::fs::remove_dir(self.fspath(path))?) })
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move { Ok(std::fs::remove_file(self.fspath(path))?) })
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let (from, to) = (self.fspath(from), self.fspath(to));
            match reflink_copy::reflink_or_copy(&from, &to) {
                Ok(_) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move { Ok(std::fs::rename(self.fspath(from), self.fspath(to))?) })
    }

    fn have_adequate_rename(&self) -> bool {
        true
    }
}
