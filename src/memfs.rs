//! Simple in-memory resource backend.
//!
//! State lives in one `Arc<Mutex<HashMap<...>>>`; create a `MemFs` once,
//! store it in your handler, and `clone()` it every time you hand it to
//! `DavHandler` — cloning is cheap, it's a refcounted handle onto the same
//! tree.
use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::stream;

use crate::davpath::DavPath;
use crate::fs::*;

#[derive(Debug, Clone)]
enum Node {
    Dir(NodeMeta),
    File(NodeMeta, Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
struct NodeMeta {
    mtime: SystemTime,
    crtime: SystemTime,
}

impl NodeMeta {
    fn now() -> NodeMeta {
        let now = SystemTime::now();
        NodeMeta { mtime: now, crtime: now }
    }
}

type Tree = HashMap<String, Node>;

#[derive(Debug, Clone)]
pub struct MemFs {
    tree: Arc<Mutex<Tree>>,
}

#[derive(Debug)]
struct MemMeta {
    is_dir: bool,
    len: u64,
    meta: NodeMeta,
}

impl DavMetaData for MemMeta {
    fn len(&self) -> u64 {
        self.len
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.meta.mtime)
    }

    fn created(&self) -> FsResult<SystemTime> {
        Ok(self.meta.crtime)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

#[derive(Debug)]
struct MemDirEntry {
    name: Vec<u8>,
    meta: MemMeta,
}

impl DavDirEntry for MemDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.clone()
    }

    fn metadata<'a>(&'a self) -> FsFuture<'a, Box<dyn DavMetaData>> {
        let m = MemMeta { is_dir: self.meta.is_dir, len: self.meta.len, meta: self.meta.meta };
        Box::pin(async move { Ok(Box::new(m) as Box<dyn DavMetaData>) })
    }
}

#[derive(Debug)]
struct MemFile {
    tree: Arc<Mutex<Tree>>,
    path: String,
    pos: usize,
    append: bool,
}

impl DavFile for MemFile {
    fn metadata<'a>(&'a mut self) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let tree = self.tree.lock().unwrap();
            let node = tree.get(&self.path).ok_or(FsError::NotFound)?;
            Ok(Box::new(node_meta(node)) as Box<dyn DavMetaData>)
        })
    }

    fn write_bytes<'a>(&'a mut self, buf: Bytes) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut tree = self.tree.lock().unwrap();
            let node = tree.get_mut(&self.path).ok_or(FsError::NotFound)?;
            let data = match node {
                Node::File(meta, data) => {
                    meta.mtime = SystemTime::now();
                    data
                },
                Node::Dir(_) => return Err(FsError::Forbidden),
            };
            let start = if self.append { data.len() } else { self.pos };
            let end = start + buf.len();
            if end > data.len() {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(&buf);
            self.pos = end;
            Ok(())
        })
    }

    fn read_bytes<'a>(&'a mut self, count: usize) -> FsFuture<'a, Bytes> {
        Box::pin(async move {
            let tree = self.tree.lock().unwrap();
            let node = tree.get(&self.path).ok_or(FsError::NotFound)?;
            let data = match node {
                Node::File(_, data) => data,
                Node::Dir(_) => return Err(FsError::Forbidden),
            };
            let start = self.pos.min(data.len());
            let end = (start + count).min(data.len());
            let chunk = Bytes::copy_from_slice(&data[start..end]);
            self.pos = end;
            Ok(chunk)
        })
    }

    fn seek<'a>(&'a mut self, pos: SeekFrom) -> FsFuture<'a, u64> {
        Box::pin(async move {
            let len = {
                let tree = self.tree.lock().unwrap();
                match tree.get(&self.path).ok_or(FsError::NotFound)? {
                    Node::File(_, data) => data.len() as i64,
                    Node::Dir(_) => return Err(FsError::Forbidden),
                }
            };
            let newpos = match pos {
                SeekFrom::Start(p) => p as i64,
                SeekFrom::Current(p) => self.pos as i64 + p,
                SeekFrom::End(p) => len + p,
            };
            if newpos < 0 {
                return Err(FsError::GeneralFailure);
            }
            self.pos = newpos as usize;
            Ok(self.pos as u64)
        })
    }
}

fn node_meta(node: &Node) -> MemMeta {
    match node {
        Node::Dir(meta) => MemMeta { is_dir: true, len: 0, meta: *meta },
        Node::File(meta, data) => MemMeta { is_dir: false, len: data.len() as u64, meta: *meta },
    }
}

fn parent_of(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => trimmed[..i].to_string(),
        None => "/".to_string(),
    }
}

fn name_of(path: &str) -> Vec<u8> {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("").as_bytes().to_vec()
}

fn key(path: &DavPath) -> String {
    let s = path.as_rel_ospath();
    format!("/{}", s.to_string_lossy())
}

impl MemFs {
    pub fn new() -> Box<MemFs> {
        let mut tree = HashMap::new();
        tree.insert("/".to_string(), Node::Dir(NodeMeta::now()));
        Box::new(MemFs { tree: Arc::new(Mutex::new(tree)) })
    }
}

impl DavFileSystem for MemFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        let k = key(path);
        Box::pin(async move {
            let tree = self.tree.lock().unwrap();
            let node = tree.get(&k).ok_or(FsError::NotFound)?;
            Ok(Box::new(node_meta(node)) as Box<dyn DavMetaData>)
        })
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath, _meta: ReadDirMeta) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        let k = key(path);
        Box::pin(async move {
            let tree = self.tree.lock().unwrap();
            match tree.get(&k) {
                Some(Node::Dir(_)) => {},
                Some(Node::File(..)) => return Err(FsError::Forbidden),
                None => return Err(FsError::NotFound),
            }
            let prefix = if k == "/" { "/".to_string() } else { format!("{}/", k) };
            let mut entries: Vec<Box<dyn DavDirEntry>> = Vec::new();
            for (p, node) in tree.iter() {
                if p == &k {
                    continue;
                }
                let is_direct_child = p.starts_with(&prefix) && !p[prefix.len()..].contains('/');
                if is_direct_child {
                    entries.push(Box::new(MemDirEntry { name: name_of(p), meta: node_meta(node) }));
                }
            }
            Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))) as FsStream<Box<dyn DavDirEntry>>)
        })
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        let k = key(path);
        Box::pin(async move {
            let mut tree = self.tree.lock().unwrap();
            match tree.get(&k) {
                Some(Node::File(..)) => {
                    if options.create_new {
                        return Err(FsError::Exists);
                    }
                },
                Some(Node::Dir(_)) => return Err(FsError::Forbidden),
                None => {
                    if !options.create {
                        return Err(FsError::NotFound);
                    }
                    let parent = parent_of(&k);
                    match tree.get(&parent) {
                        Some(Node::Dir(_)) => {},
                        _ => return Err(FsError::Forbidden),
                    }
                    tree.insert(k.clone(), Node::File(NodeMeta::now(), Vec::new()));
                },
            }
            if options.truncate {
                if let Some(Node::File(meta, data)) = tree.get_mut(&k) {
                    data.clear();
                    meta.mtime = SystemTime::now();
                }
            }
            Ok(Box::new(MemFile { tree: self.tree.clone(), path: k, pos: 0, append: options.append }) as Box<dyn DavFile>)
        })
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        let k = key(path);
        Box::pin(async move {
            let mut tree = self.tree.lock().unwrap();
            if tree.contains_key(&k) {
                return Err(FsError::Exists);
            }
            let parent = parent_of(&k);
            match tree.get(&parent) {
                Some(Node::Dir(_)) => {},
                _ => return Err(FsError::Forbidden),
            }
            tree.insert(k, Node::Dir(NodeMeta::now()));
            Ok(())
        })
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        let k = key(path);
        Box::pin(async move {
            let mut tree = self.tree.lock().unwrap();
            match tree.get(&k) {
                Some(Node::Dir(_)) => {},
                Some(Node::File(..)) => return Err(FsError::Forbidden),
                None => return Err(FsError::NotFound),
            }
            let prefix = format!("{}/", k);
            if tree.keys().any(|p| p.starts_with(&prefix)) {
                return Err(FsError::Forbidden);
            }
            tree.remove(&k);
            Ok(())
        })
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        let k = key(path);
        Box::pin(async move {
            let mut tree = self.tree.lock().unwrap();
            match tree.get(&k) {
                Some(Node::File(..)) => {},
                Some(Node::Dir(_)) => return Err(FsError::Forbidden),
                None => return Err(FsError::NotFound),
            }
            tree.remove(&k);
            Ok(())
        })
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        let (kfrom, kto) = (key(from), key(to));
        Box::pin(async move {
            let mut tree = self.tree.lock().unwrap();
            let node = tree.get(&kfrom).ok_or(FsError::NotFound)?.clone();
            let parent = parent_of(&kto);
            match tree.get(&parent) {
                Some(Node::Dir(_)) => {},
                _ => return Err(FsError::Forbidden),
            }
            tree.insert(kto, node);
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        let (kfrom, kto) = (key(from), key(to));
        Box::pin(async move {
            let mut tree = self.tree.lock().unwrap();
            let node = tree.remove(&kfrom).ok_or(FsError::NotFound)?;
            let parent = parent_of(&kto);
            match tree.get(&parent) {
                Some(Node::Dir(_)) => {},
                _ => {
                    tree.insert(kfrom, node);
                    return Err(FsError::Forbidden);
                },
            }
            let is_dir = matches!(node, Node::Dir(_));
            if is_dir {
                let prefix = format!("{}/", kfrom);
                let subtree: Vec<(String, Node)> = {
                    let mut v = Vec::new();
                    let keys: Vec<String> = tree.keys().filter(|p| p.starts_with(&prefix)).cloned().collect();
                    for k in keys {
                        if let Some(n) = tree.remove(&k) {
                            v.push((format!("{}{}", kto, &k[kfrom.len()..]), n));
                        }
                    }
                    v
                };
                tree.insert(kto.clone(), node);
                for (k, n) in subtree {
                    tree.insert(k, n);
                }
            } else {
                tree.insert(kto, node);
            }
            Ok(())
        })
    }

    fn have_adequate_rename(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_key_roundtrip() {
        assert_eq!(parent_of("/a/b"), "/a");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(name_of("/a/b"), b"b".to_vec());
    }
}
