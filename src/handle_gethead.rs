//! GET/HEAD: byte-range support, conditional requests, and an optional
//! autoindex for collections.
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::async_stream::AsyncStream;
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davheaders::{self, ETagList, IfMatch, IfNoneMatch};
use crate::davpath::DavPath;
use crate::fs::{DavFileSystem, OpenOptions, ReadDirMeta};
use crate::index::{self, IndexEntry};
use crate::util::systemtime_to_httpdate;
use crate::DavResult;

pub(crate) async fn handle_get(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
    head: bool,
) -> DavResult<Response<Body>> {
    let meta = inner.fs.metadata(path).await?;
    if meta.is_dir() {
        return handle_dirlist(inner, path, head).await;
    }

    let mut file = inner.fs.open(path, OpenOptions::read()).await?;
    let meta = file.metadata().await?;
    if !meta.is_file() {
        return Err(StatusCode::METHOD_NOT_ALLOWED.into());
    }

    let len = meta.len();
    let etag = meta.etag();

    if let Some(s) = precondition_failed(parts, etag.as_deref()) {
        return Err(s.into());
    }

    let mut start = 0u64;
    let mut count = len;
    let mut partial = false;

    let mut do_range = true;
    if let Some(r) = parts.headers.typed_get::<davheaders::IfRange>() {
        do_range = match r {
            davheaders::IfRange::ETag(want) => etag.as_deref().map(|e| format!("\"{}\"", e)) == Some(want.to_string()),
            davheaders::IfRange::Date(since) => meta.modified().map(|m| m <= since.into()).unwrap_or(false),
        };
    }

    if do_range {
        if let Some(range) = parts.headers.typed_get::<headers::Range>() {
            let mut ranges = range.satisfiable_ranges(len);
            if let Some((s, e)) = ranges.next() {
                if ranges.next().is_none() {
                    let s = match s {
                        Bound::Included(n) => n,
                        Bound::Excluded(n) => n + 1,
                        Bound::Unbounded => 0,
                    };
                    let e = match e {
                        Bound::Included(n) => n,
                        Bound::Excluded(n) => n.saturating_sub(1),
                        Bound::Unbounded => len.saturating_sub(1),
                    };
                    if s >= len || s > e {
                        return Err(StatusCode::RANGE_NOT_SATISFIABLE.into());
                    }
                    start = s;
                    count = e - s + 1;
                    partial = true;
                }
            }
        }
    }

    let mut res = Response::builder();
    if let Ok(modified) = meta.modified() {
        res = res.header("last-modified", systemtime_to_httpdate(modified));
    }
    if let Some(tag) = &etag {
        res = res.header("etag", format!("\"{}\"", tag));
    }
    res = res.header("content-type", path.get_mime_type_str());
    res = res.header("accept-ranges", "bytes");
    res = res.header("content-length", count.to_string());

    if partial {
        res = res.header("content-range", format!("bytes {}-{}/{}", start, start + count - 1, len));
        res = res.status(StatusCode::PARTIAL_CONTENT);
    } else {
        res = res.status(StatusCode::OK);
    }

    if head {
        return Ok(res.body(Body::empty()).unwrap());
    }

    if start > 0 {
        file.seek(std::io::SeekFrom::Start(start)).await?;
    }

    let body = Body::from(AsyncStream::new(|mut tx| async move {
        let mut remaining = count;
        while remaining > 0 {
            let want = remaining.min(8192) as usize;
            let chunk = file.read_bytes(want).await?;
            if chunk.is_empty() {
                break;
            }
            remaining -= chunk.len() as u64;
            tx.send(chunk).await;
        }
        Ok::<(), std::io::Error>(())
    }));

    Ok(res.body(body).unwrap())
}

/// Plain HTTP conditional GET (If-Match/If-None-Match), independent of the
/// WebDAV `If:` header which only guards write-type methods.
fn precondition_failed(parts: &http::request::Parts, etag: Option<&str>) -> Option<StatusCode> {
    let quoted = etag.map(|e| format!("\"{}\"", e));

    if let Some(IfMatch(list)) = parts.headers.typed_get::<IfMatch>() {
        let ok = match (&list, &quoted) {
            (ETagList::Star, Some(_)) => true,
            (ETagList::Star, None) => false,
            (ETagList::Tags(tags), Some(q)) => tags.iter().any(|t| &t.to_string() == q),
            (ETagList::Tags(_), None) => false,
        };
        if !ok {
            return Some(StatusCode::PRECONDITION_FAILED);
        }
    }

    if let Some(IfNoneMatch(list)) = parts.headers.typed_get::<IfNoneMatch>() {
        let matches = match (&list, &quoted) {
            (ETagList::Star, Some(_)) => true,
            (ETagList::Star, None) => false,
            (ETagList::Tags(tags), Some(q)) => tags.iter().any(|t| &t.to_string() == q),
            (ETagList::Tags(_), None) => false,
        };
        if matches {
            return Some(StatusCode::NOT_MODIFIED);
        }
    }

    None
}

async fn handle_dirlist(inner: Arc<DavInner>, path: &DavPath, head: bool) -> DavResult<Response<Body>> {
    if !path.is_collection() {
        let mut redir = path.clone();
        redir.add_slash();
        return Ok(Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header("location", redir.as_url_string_with_prefix())
            .header("content-length", "0")
            .body(Body::empty())
            .unwrap());
    }

    if !inner.autoindex {
        return Err(StatusCode::METHOD_NOT_ALLOWED.into());
    }

    let mut entries_stream = inner.fs.read_dir(path, ReadDirMeta::Data).await?;
    let mut entries = Vec::new();
    {
        use futures_util::StreamExt;
        while let Some(dirent) = entries_stream.next().await {
            let Ok(dirent) = dirent else { continue };
            let name = String::from_utf8_lossy(&dirent.name()).to_string();
            if let Ok(meta) = dirent.metadata().await {
                entries.push(IndexEntry::from_meta(name, &*meta));
            }
        }
    }

    let html = index::render(path, entries);
    let mut res = Response::builder().status(StatusCode::OK).header("content-type", "text/html; charset=utf-8");
    if head {
        res = res.header("content-length", html.len().to_string());
        return Ok(res.body(Body::empty()).unwrap());
    }
    Ok(res.body(Body::from(html)).unwrap())
}
