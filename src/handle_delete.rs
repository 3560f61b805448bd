//! DELETE, including the recursive walk over a collection RFC 4918 §9.6.1
//! requires, reporting any per-member failure as a 207 multistatus rather
//! than aborting the whole operation.
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::StreamExt;
use headers::HeaderMapExt;
use http::StatusCode;

use crate::body::Body;
use crate::conditional::check_precondition;
use crate::davhandler::DavInner;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::fs::{DavFileSystem, DavMetaData, FsError, ReadDirMeta};
use crate::multierror::MultiError;
use crate::props::PropertyBackend;
use crate::DavResult;

pub(crate) async fn handle_delete(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
) -> DavResult<http::Response<Body>> {
    let mut path = path.clone();
    let meta = inner.fs.metadata(&path).await?;
    path.add_slash_if(meta.is_dir());
    let now = SystemTime::now();

    let held = check_precondition(
        parts.headers.typed_get::<davheaders::If>().as_ref(),
        &path,
        Some(meta.as_ref()),
        &inner.locks,
        now,
    )
    .map_err(|_: FsError| StatusCode::LOCKED)?;

    if meta.is_dir() && !inner.locks.dependent_locks(path.as_url_string().as_str(), None, &held, now).is_empty() {
        return Err(StatusCode::LOCKED.into());
    }

    let mut multierror = MultiError::new();
    delete_items(&inner, &mut multierror, meta, &path).await;

    if multierror.is_empty() {
        let url = path.as_url_string();
        for lock in inner.locks.by_id(url.as_str(), SystemTime::now()) {
            inner.locks.remove(&lock.token);
        }
    }
    multierror.into_response(StatusCode::NO_CONTENT)
}

/// Recursively delete `path`, recording every failure against `multierror`
/// instead of aborting so siblings still get a chance. Boxed explicitly
/// because an `async fn` can't recurse into itself directly.
fn delete_items<'a>(
    inner: &'a Arc<DavInner>,
    multierror: &'a mut MultiError,
    meta: Box<dyn DavMetaData>,
    path: &'a DavPath,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        if !meta.is_dir() {
            if let Err(e) = inner.fs.remove_file(path).await {
                multierror.add_status(path, e.statuscode());
            } else {
                inner.props.delete_resource(path.as_url_string().as_str());
            }
            return;
        }

        let mut failed = false;
        match inner.fs.read_dir(path, ReadDirMeta::Data).await {
            Ok(mut entries) => {
                while let Some(dirent) = entries.next().await {
                    let dirent = match dirent {
                        Ok(d) => d,
                        Err(e) => {
                            multierror.add_status(path, e.statuscode());
                            failed = true;
                            continue;
                        },
                    };
                    let child_meta = match dirent.metadata().await {
                        Ok(m) => m,
                        Err(e) => {
                            multierror.add_status(path, e.statuscode());
                            failed = true;
                            continue;
                        },
                    };
                    let mut child = path.clone();
                    child.push_segment(&dirent.name());
                    child.add_slash_if(child_meta.is_dir());
                    delete_items(inner, multierror, child_meta, &child).await;
                }
            },
            Err(e) => {
                multierror.add_status(path, e.statuscode());
                failed = true;
            },
        }

        if failed {
            return;
        }

        match inner.fs.remove_dir(path).await {
            Ok(()) => inner.props.delete_subtree(path.as_url_string().as_str()),
            Err(FsError::Exists) => multierror.add_status(path, StatusCode::CONFLICT),
            Err(e) => multierror.add_status(path, e.statuscode()),
        }
    })
}
