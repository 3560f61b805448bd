//! OPTIONS: advertises Class 1/2 compliance and the methods valid for the
//! requested resource.
use std::sync::Arc;

use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davpath::DavPath;
use crate::util::DavMethod;
use crate::DavResult;

pub(crate) async fn handle_options(
    inner: Arc<DavInner>,
    _parts: &http::request::Parts,
    path: &DavPath,
) -> DavResult<Response<Body>> {
    let allow = if path.is_star() {
        allow_for(&inner, None, false)
    } else {
        let meta = inner.fs.metadata(path).await;
        let is_file = meta.as_ref().map(|m| m.is_file()).unwrap_or(false);
        let exists = meta.is_ok();
        let is_root = path.as_url_string() == "/";
        allow_for(&inner, Some((exists, is_file)), is_root)
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("dav", "1,2")
        .header("ms-author-via", "DAV")
        .header("allow", allow)
        .header("content-length", "0")
        .body(Body::empty())
        .unwrap())
}

/// `resource` is `None` for `OPTIONS *`, otherwise `(exists, is_file)`.
fn allow_for(inner: &DavInner, resource: Option<(bool, bool)>, is_root: bool) -> String {
    let mut v: Vec<&str> = Vec::new();
    let push = |v: &mut Vec<&str>, name: &'static str, m: DavMethod| {
        if inner.allow.contains(m) {
            v.push(name);
        }
    };

    push(&mut v, "OPTIONS", DavMethod::Options);

    match resource {
        None => {
            // OPTIONS * — advertise capability, not resource-specific state.
            push(&mut v, "GET", DavMethod::Get);
            push(&mut v, "HEAD", DavMethod::Head);
            push(&mut v, "PUT", DavMethod::Put);
            push(&mut v, "PROPFIND", DavMethod::PropFind);
            push(&mut v, "MKCOL", DavMethod::MkCol);
            push(&mut v, "LOCK", DavMethod::Lock);
            push(&mut v, "UNLOCK", DavMethod::Unlock);
        },
        Some((exists, _)) if !exists => {
            // unmapped URL: only methods that can create a resource here.
            push(&mut v, "MKCOL", DavMethod::MkCol);
            push(&mut v, "PUT", DavMethod::Put);
            push(&mut v, "LOCK", DavMethod::Lock);
        },
        Some((_, is_file)) => {
            if is_file {
                push(&mut v, "GET", DavMethod::Get);
                push(&mut v, "HEAD", DavMethod::Head);
                push(&mut v, "PUT", DavMethod::Put);
            }
            push(&mut v, "PROPFIND", DavMethod::PropFind);
            push(&mut v, "PROPPATCH", DavMethod::PropPatch);
            push(&mut v, "COPY", DavMethod::Copy);
            if !is_root {
                push(&mut v, "MOVE", DavMethod::Move);
                push(&mut v, "DELETE", DavMethod::Delete);
            }
            push(&mut v, "LOCK", DavMethod::Lock);
            push(&mut v, "UNLOCK", DavMethod::Unlock);
        },
    }

    v.join(",")
}
