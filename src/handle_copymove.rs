//! COPY and MOVE, RFC 4918 §9.8/§9.9.
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
use crate::davheaders::{self, Depth, Destination, Overwrite};
use crate::davpath::DavPath;
use crate::fs::{DavFileSystem, DavMetaData, FsError, ReadDirMeta};
use crate::locks::LockScope;
use crate::multierror::MultiError;
use crate::props::PropertyBackend;
use crate::DavResult;

pub(crate) async fn handle_copy(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
) -> DavResult<http::Response<Body>> {
    let depth = match parts.headers.typed_get::<Depth>() {
        Some(Depth::Infinity) | None => Depth::Infinity,
        Some(Depth::Zero) => Depth::Zero,
        _ => return Err(StatusCode::BAD_REQUEST.into()),
    };
    let (path, dest, _meta, exists) = prepare(&inner, parts, path, depth, false).await?;

    let mut multierror = MultiError::new();
    let _ = do_copy(&inner, &path, &dest, &dest, depth, &mut multierror).await;
    let status = if exists { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
    multierror.into_response(status)
}

pub(crate) async fn handle_move(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
) -> DavResult<http::Response<Body>> {
    let depth = match parts.headers.typed_get::<Depth>() {
        Some(Depth::Infinity) | None => Depth::Infinity,
        _ => return Err(StatusCode::BAD_REQUEST.into()),
    };
    let (path, dest, meta, exists) = prepare(&inner, parts, path, depth, true).await?;

    let mut multierror = MultiError::new();
    let result = if inner.fs.have_adequate_rename() || !meta.is_dir() {
        inner.fs.rename(&path, &dest).await
    } else {
        // Backend can't atomically rename a collection: fall back to a
        // recursive copy followed by a recursive delete.
        match do_copy(&inner, &path, &dest, &dest, Depth::Infinity, &mut multierror).await {
            Ok(()) => {
                delete_items(&inner, &mut multierror, &path).await;
                Ok(())
            },
            Err(e) => Err(e),
        }
    };

    match result {
        Ok(()) => {
            inner.props.move_subtree(path.as_url_string().as_str(), dest.as_url_string().as_str());
            remove_locks_at(&inner, path.as_url_string().as_str());
            let status = if exists { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
            multierror.into_response(status)
        },
        Err(e) => {
            multierror.add_status(&path, e.statuscode());
            multierror.into_response(StatusCode::NO_CONTENT)
        },
    }
}

/// Shared preflight for COPY/MOVE: resolve & validate the destination,
/// check overwrite/If-header/lock conditions. Returns `(source, dest,
/// source-meta, dest-existed)`.
async fn prepare(
    inner: &Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
    depth: Depth,
    is_move: bool,
) -> DavResult<(DavPath, DavPath, Box<dyn DavMetaData>, bool)> {
    let mut path = path.clone();
    let meta = inner.fs.metadata(&path).await?;
    path.add_slash_if(meta.is_dir());

    let destination = parts
        .headers
        .typed_get::<Destination>()
        .ok_or(StatusCode::BAD_REQUEST)?;
    let mut dest = DavPath::from_str_and_prefix(&destination.0, &inner.prefix)?;

    let dest_parent_exists = inner.fs.metadata(&dest.parent()).await.map(|m| m.is_dir()).unwrap_or(false);
    if !dest_parent_exists {
        return Err(StatusCode::CONFLICT.into());
    }

    let dest_meta = inner.fs.metadata(&dest).await;
    let exists = dest_meta.is_ok();
    if let Ok(ref dm) = dest_meta {
        dest.add_slash_if(dm.is_dir());
    }

    let overwrite = parts.headers.typed_get::<Overwrite>().map_or(true, |o| o.0);
    if !overwrite && exists {
        return Err(StatusCode::PRECONDITION_FAILED.into());
    }
    if path == dest {
        return Err(StatusCode::FORBIDDEN.into());
    }

    let held = check_precondition(
        parts.headers.typed_get::<davheaders::If>().as_ref(),
        &path,
        Some(meta.as_ref()),
        &inner.locks,
        SystemTime::now(),
    )
    .map_err(|_: FsError| StatusCode::LOCKED)?;

    let now = SystemTime::now();
    if is_move && !inner.locks.conflict_locks(path.as_url_string().as_str(), LockScope::Exclusive, &held, now).is_empty() {
        return Err(StatusCode::LOCKED.into());
    }
    if !inner.locks.conflict_locks(dest.as_url_string().as_str(), LockScope::Exclusive, &held, now).is_empty() {
        return Err(StatusCode::LOCKED.into());
    }
    // MOVE recursing away a subtree, or COPY/MOVE overwriting one, must not
    // silently drop a lock held on a descendant the caller didn't submit.
    if is_move && meta.is_dir() && !inner.locks.dependent_locks(path.as_url_string().as_str(), None, &held, now).is_empty() {
        return Err(StatusCode::LOCKED.into());
    }
    if let Ok(ref dm) = dest_meta {
        if dm.is_dir() && !inner.locks.dependent_locks(dest.as_url_string().as_str(), None, &held, now).is_empty() {
            return Err(StatusCode::LOCKED.into());
        }
    }

    if overwrite && exists && depth != Depth::Zero {
        if let Ok(dm) = inner.fs.metadata(&dest).await {
            if dm.is_dir() {
                let mut multierror = MultiError::new();
                delete_items(inner, &mut multierror, &dest).await;
                remove_locks_at(inner, dest.as_url_string().as_str());
            }
        }
    }

    Ok((path, dest, meta, exists))
}

/// Drop every lock (of any depth) rooted exactly at `path`, e.g. after the
/// resource there has been deleted, moved away, or overwritten.
fn remove_locks_at(inner: &Arc<DavInner>, path: &str) {
    for lock in inner.locks.by_id(path, SystemTime::now()) {
        inner.locks.remove(&lock.token);
    }
}

/// Copy a single resource per RFC 4918 §9.8, recursing into collections.
/// `topdest` guards against `COPY /a/b /a/b/c` recursively copying the
/// destination into itself.
fn do_copy<'a>(
    inner: &'a Arc<DavInner>,
    source: &'a DavPath,
    topdest: &'a DavPath,
    dest: &'a DavPath,
    depth: Depth,
    multierror: &'a mut MultiError,
) -> Pin<Box<dyn Future<Output = DavResult<()>> + Send + 'a>> {
    Box::pin(async move {
        if source == topdest {
            return Ok(());
        }

        let meta = match inner.fs.metadata(source).await {
            Ok(m) => m,
            Err(e) => {
                multierror.add_status(source, e.statuscode());
                return Err(e.into());
            },
        };

        if !meta.is_dir() {
            return match inner.fs.copy(source, dest).await {
                Ok(()) => {
                    inner.props.copy_subtree(source.as_url_string().as_str(), dest.as_url_string().as_str());
                    Ok(())
                },
                Err(e) => {
                    multierror.add_status(dest, e.statuscode());
                    Err(e.into())
                },
            };
        }

        // Depth 0 against an existing collection just means "properties
        // only", which isn't separately modeled here; a collection that
        // already exists at the destination is not an error.
        if let Err(e) = inner.fs.create_dir(dest).await {
            if depth != Depth::Zero || e != FsError::Exists {
                multierror.add_status(dest, e.statuscode());
                return Err(e.into());
            }
        }
        inner.props.copy_subtree(source.as_url_string().as_str(), dest.as_url_string().as_str());

        if depth == Depth::Zero {
            return Ok(());
        }

        let mut entries = match inner.fs.read_dir(source, ReadDirMeta::Data).await {
            Ok(e) => e,
            Err(e) => {
                multierror.add_status(source, e.statuscode());
                return Err(e.into());
            },
        };

        let mut result = Ok(());
        while let Some(dirent) = entries.next().await {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) => {
                    multierror.add_status(source, e.statuscode());
                    result = Err(e.into());
                    continue;
                },
            };
            let child_meta = match dirent.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    multierror.add_status(source, e.statuscode());
                    result = Err(e.into());
                    continue;
                },
            };
            let mut nsrc = source.clone();
            let mut ndest = dest.clone();
            nsrc.push_segment(&dirent.name());
            ndest.push_segment(&dirent.name());
            if child_meta.is_dir() {
                nsrc.add_slash();
                ndest.add_slash();
            }
            if let Err(e) = do_copy(inner, &nsrc, topdest, &ndest, depth, multierror).await {
                result = Err(e);
            }
        }
        result
    })
}

fn delete_items<'a>(
    inner: &'a Arc<DavInner>,
    multierror: &'a mut MultiError,
    path: &'a DavPath,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let meta = match inner.fs.metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                multierror.add_status(path, e.statuscode());
                return;
            },
        };
        if !meta.is_dir() {
            if let Err(e) = inner.fs.remove_file(path).await {
                multierror.add_status(path, e.statuscode());
            } else {
                inner.props.delete_resource(path.as_url_string().as_str());
            }
            return;
        }

        if let Ok(mut entries) = inner.fs.read_dir(path, ReadDirMeta::Data).await {
            while let Some(dirent) = entries.next().await {
                let Ok(dirent) = dirent else { continue };
                let Ok(child_meta) = dirent.metadata().await else { continue };
                let mut child = path.clone();
                child.push_segment(&dirent.name());
                child.add_slash_if(child_meta.is_dir());
                delete_items(inner, multierror, &child).await;
            }
        }

        match inner.fs.remove_dir(path).await {
            Ok(()) => inner.props.delete_subtree(path.as_url_string().as_str()),
            Err(e) => multierror.add_status(path, e.statuscode()),
        }
    })
}
