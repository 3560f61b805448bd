//! PUT: streams the request body straight to the backend rather than
//! buffering it, so upload size isn't bounded by available memory.
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Buf;
use headers::HeaderMapExt;
use http::StatusCode;
use http_body_util::BodyExt;

use crate::body::Body;
use crate::conditional::check_precondition;
use crate::davhandler::DavInner;
use crate::davheaders::{self, ETagList};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::{DavFileSystem, FsError, OpenOptions};
use crate::util::systemtime_to_httpdate;
use crate::DavResult;

pub(crate) async fn handle_put<ReqBody>(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
    body: ReqBody,
) -> DavResult<http::Response<Body>>
where
    ReqBody: http_body::Body,
    ReqBody::Data: Buf,
    ReqBody::Error: StdError + Send + Sync + 'static,
{
    let meta = inner.fs.metadata(path).await;
    let existed = meta.is_ok();

    check_precondition(
        parts.headers.typed_get::<davheaders::If>().as_ref(),
        path,
        meta.as_deref().ok(),
        &inner.locks,
        SystemTime::now(),
    )
    .map_err(|_: FsError| StatusCode::LOCKED)?;

    let mut oo = OpenOptions::write();
    if parts.headers.typed_get::<davheaders::IfMatch>().map_or(false, |h| h.0 == ETagList::Star) {
        oo.create = false;
    }
    if parts.headers.typed_get::<davheaders::IfNoneMatch>().map_or(false, |h| h.0 == ETagList::Star) {
        oo.create_new = true;
    }

    let mut file = match inner.fs.open(path, oo).await {
        Ok(f) => f,
        Err(FsError::Exists) if oo.create_new => return Err(StatusCode::PRECONDITION_FAILED.into()),
        Err(FsError::NotFound) if !oo.create => return Err(StatusCode::PRECONDITION_FAILED.into()),
        Err(FsError::NotFound) => return Err(StatusCode::CONFLICT.into()),
        Err(e) => return Err(e.into()),
    };

    let mut body = std::pin::pin!(body);
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| DavError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let Ok(mut data) = frame.into_data() else { continue };
        let bytes = data.copy_to_bytes(data.remaining());
        file.write_bytes(bytes).await?;
    }
    file.flush().await?;

    let status = if existed { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
    let mut res = http::Response::builder().status(status).header("accept-ranges", "bytes");

    if let Ok(m) = file.metadata().await {
        if let Some(tag) = m.etag() {
            res = res.header("etag", format!("\"{}\"", tag));
        }
        if let Ok(modified) = m.modified() {
            res = res.header("last-modified", systemtime_to_httpdate(modified));
        }
    }

    Ok(res.body(Body::empty()).unwrap())
}
