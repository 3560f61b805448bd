//! LOCK and UNLOCK, RFC 4918 §9.10/§9.11.
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use headers::HeaderMapExt;
use http::StatusCode;
use xmltree::Element;

use crate::conditional::submitted_tokens_for;
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davheaders::{self, Depth, ETagList, LockToken, Timeout};
use crate::davpath::{DavPath, DavPathRef};
use crate::errors::DavError;
use crate::fs::{DavFileSystem, FsError, OpenOptions};
use crate::locks::{Lock, LockRegistry, LockScope, MAX_TIMEOUT};
use crate::multierror::MultiError;
use crate::util::MemBuffer;
use crate::xmltree_ext::{emitter, ElementExt};
use crate::DavResult;

pub(crate) async fn handle_lock(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
    xmldata: &[u8],
) -> DavResult<http::Response<Body>> {
    let meta = inner.fs.metadata(path).await;
    let mut path = path.clone();
    if let Ok(ref m) = meta {
        path.add_slash_if(m.is_dir());
    }
    let now = SystemTime::now();

    if xmldata.is_empty() {
        return handle_refresh(&inner, parts, &path, now).await;
    }

    let deep = match parts.headers.typed_get::<Depth>() {
        Some(Depth::Infinity) | None => true,
        Some(Depth::Zero) => false,
        _ => return Err(StatusCode::BAD_REQUEST.into()),
    };

    let (shared, owner) = parse_lockinfo(xmldata)?;
    let scope = if shared { LockScope::Shared } else { LockScope::Exclusive };

    let url = path.as_url_string();
    let conflicts = inner.locks.conflict_locks(url.as_str(), scope, &[], now);
    if !conflicts.is_empty() {
        return Err(StatusCode::LOCKED.into());
    }
    if deep {
        // A deep exclusive lock is blocked by any descendant lock; a deep
        // shared lock only by a descendant exclusive lock, since two shared
        // locks never conflict.
        let descendant_scope = match scope {
            LockScope::Exclusive => None,
            LockScope::Shared => Some(LockScope::Exclusive),
        };
        let blockers = inner.locks.dependent_locks(url.as_str(), descendant_scope, &[], now);
        if !blockers.is_empty() {
            let mut me = MultiError::new();
            for lock in &blockers {
                let p = DavPath::new(&lock.path)?;
                me.add_status(&p, StatusCode::FORBIDDEN);
            }
            me.add_status(&path, StatusCode::FAILED_DEPENDENCY);
            return me.into_response(StatusCode::OK);
        }
    }

    let timeout = parts.headers.typed_get::<Timeout>().map_or(MAX_TIMEOUT, |t| t.resolve(MAX_TIMEOUT));
    let token = inner.locks.add(url.as_str(), scope, deep, owner, timeout, now);
    let lock = inner.locks.by_token(&token, now).expect("lock just inserted");

    let existed = meta.is_ok();
    if !existed {
        let mut oo = OpenOptions::write();
        if parts.headers.typed_get::<davheaders::IfMatch>().map_or(false, |h| h.0 == ETagList::Star) {
            oo.create = false;
        }
        if parts.headers.typed_get::<davheaders::IfNoneMatch>().map_or(false, |h| h.0 == ETagList::Star) {
            oo.create_new = true;
        }
        if let Err(e) = inner.fs.open(&path, oo).await {
            inner.locks.remove(&lock.token);
            return match e {
                FsError::NotFound | FsError::Exists => Err(StatusCode::CONFLICT.into()),
                e => Err(e.into()),
            };
        }
    }

    let prop = build_lock_prop(&lock, &path, true);
    let mut buf = MemBuffer::new();
    let mut em = emitter(&mut buf)?;
    prop.write_ev(&mut em).map_err(DavError::from)?;
    drop(em);

    Ok(http::Response::builder()
        .status(if existed { StatusCode::OK } else { StatusCode::CREATED })
        .header("lock-token", format!("<{}>", lock.token))
        .header("content-type", "application/xml; charset=utf-8")
        .body(Body::from(buf.take()))
        .unwrap())
}

async fn handle_refresh(
    inner: &Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
    now: SystemTime,
) -> DavResult<http::Response<Body>> {
    let hdr = parts.headers.typed_get::<davheaders::If>().ok_or(StatusCode::BAD_REQUEST)?;
    let tokens = submitted_tokens_for(&hdr, path, &inner.locks, now);
    if tokens.len() != 1 {
        return Err(StatusCode::BAD_REQUEST.into());
    }

    let timeout = parts.headers.typed_get::<Timeout>().map_or(MAX_TIMEOUT, |t| t.resolve(MAX_TIMEOUT));
    let lock = inner.locks.refresh(&tokens[0], timeout, now).ok_or(StatusCode::PRECONDITION_FAILED)?;

    let prop = build_lock_prop(&lock, path, true);
    let mut buf = MemBuffer::new();
    let mut em = emitter(&mut buf)?;
    prop.write_ev(&mut em).map_err(DavError::from)?;
    drop(em);

    Ok(http::Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/xml; charset=utf-8")
        .body(Body::from(buf.take()))
        .unwrap())
}

pub(crate) async fn handle_unlock(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    _path: &DavPath,
) -> DavResult<http::Response<Body>> {
    let t = parts.headers.typed_get::<LockToken>().ok_or(StatusCode::BAD_REQUEST)?;
    let token = t.0.trim_matches(|c| c == '<' || c == '>');
    if inner.locks.remove(token) {
        Ok(http::Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).unwrap())
    } else {
        Err(StatusCode::CONFLICT.into())
    }
}

/// Parse a `<D:lockinfo>` request body into `(shared, owner)`.
fn parse_lockinfo(xmldata: &[u8]) -> DavResult<(bool, Option<String>)> {
    let tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "lockinfo" {
        return Err(DavError::XmlParseError);
    }

    let mut shared = None;
    let mut locktype = false;
    let mut owner = None;

    for elem in &tree.children {
        match elem.name.as_str() {
            "lockscope" if elem.children.len() == 1 => {
                shared = match elem.children[0].name.as_str() {
                    "exclusive" => Some(false),
                    "shared" => Some(true),
                    _ => return Err(DavError::XmlParseError),
                };
            },
            "locktype" if elem.children.len() == 1 => {
                locktype = elem.children[0].name == "write";
            },
            "owner" => {
                owner = elem.text.clone().or_else(|| {
                    elem.children.iter().find_map(|c| c.text.clone())
                });
            },
            _ => return Err(DavError::XmlParseError),
        }
    }

    match shared {
        Some(shared) if locktype => Ok((shared, owner)),
        _ => Err(DavError::XmlParseError),
    }
}

/// `<D:lockdiscovery>` property value: every lock currently covering `path`.
pub(crate) fn list_lockdiscovery(locks: &LockRegistry, path: &DavPathRef, now: SystemTime) -> Element {
    let mut elem = Element::new2("D:lockdiscovery");
    for lock in locks.all_locks(path.as_url_string().as_str(), now) {
        elem.push(build_lock_prop(&lock, path, false));
    }
    elem
}

/// `<D:supportedlock>` property value: this server always supports both
/// exclusive and shared write locks.
pub(crate) fn list_supportedlock() -> Element {
    let mut elem = Element::new2("D:supportedlock");
    for scope in ["exclusive", "shared"] {
        let mut entry = Element::new2("D:lockentry");
        let mut lockscope = Element::new2("D:lockscope");
        lockscope.push(Element::new2(scope));
        entry.push(lockscope);
        let mut locktype = Element::new2("D:locktype");
        locktype.push(Element::new2("D:write"));
        entry.push(locktype);
        elem.push(entry);
    }
    elem
}

fn build_lock_prop(lock: &Lock, path: &DavPathRef, full: bool) -> Element {
    let mut actlock = Element::new2("D:activelock");

    let mut scope = Element::new2("D:lockscope");
    scope.push(Element::new2(match lock.scope {
        LockScope::Exclusive => "D:exclusive",
        LockScope::Shared => "D:shared",
    }));
    actlock.push(scope);

    let mut locktype = Element::new2("D:locktype");
    locktype.push(Element::new2("D:write"));
    actlock.push(locktype);

    actlock.push(Element::new2("D:depth").text(if lock.deep { "Infinity" } else { "0" }.to_string()));
    actlock.push(Element::new2("D:timeout").text(format!("Second-{}", lock.timeout.as_secs())));

    let mut locktoken = Element::new2("D:locktoken");
    locktoken.push(Element::new2("D:href").text(lock.token.clone()));
    actlock.push(locktoken);

    let mut lockroot = Element::new2("D:lockroot");
    lockroot.push(Element::new2("D:href").text(path.as_url_string()));
    actlock.push(lockroot);

    if let Some(ref owner) = lock.owner {
        actlock.push(Element::new2("D:owner").text(owner.clone()));
    }

    if !full {
        return actlock;
    }

    let mut ldis = Element::new2("D:lockdiscovery");
    ldis.push(actlock);
    let mut prop = Element::new2("D:prop").ns("D", "DAV:");
    prop.push(ldis);
    prop
}
