//! MKCOL: RFC 4918 §9.3.1.
use std::sync::Arc;
use std::time::SystemTime;

use headers::HeaderMapExt;
use http::StatusCode;

use crate::body::Body;
use crate::conditional::check_precondition;
use crate::davhandler::DavInner;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::fs::{DavFileSystem, FsError};
use crate::DavResult;

pub(crate) async fn handle_mkcol(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
    xmldata: &[u8],
) -> DavResult<http::Response<Body>> {
    if !xmldata.is_empty() {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
    }

    let meta = inner.fs.metadata(path).await;

    check_precondition(
        parts.headers.typed_get::<davheaders::If>().as_ref(),
        path,
        meta.as_deref().ok(),
        &inner.locks,
        SystemTime::now(),
    )
    .map_err(|_: FsError| StatusCode::LOCKED)?;

    match inner.fs.create_dir(path).await {
        // RFC 4918 9.3.1 MKCOL status codes.
        Err(FsError::Exists) => Err(StatusCode::METHOD_NOT_ALLOWED.into()),
        Err(FsError::NotFound) => Err(StatusCode::CONFLICT.into()),
        Err(e) => Err(e.into()),
        Ok(()) => {
            let mut path = path.clone();
            path.add_slash();
            Ok(http::Response::builder()
                .status(StatusCode::CREATED)
                .header("content-location", path.as_url_string_with_prefix())
                .body(Body::empty())
                .unwrap())
        },
    }
}
