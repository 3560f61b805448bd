//! The main entry point of the crate: [`DavHandler`] dispatches an incoming
//! HTTP request to the right WebDAV method handler and turns any
//! [`DavError`] that escapes into a response, so handlers themselves only
//! ever need to produce a `DavResult<Response<Body>>`.
use std::error::Error as StdError;
use std::sync::Arc;

use bytes::Buf;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::DavFileSystem;
use crate::locks::LockRegistry;
use crate::props::{MemPropDb, PropertyBackend};
use crate::util::{dav_method, notfound, DavMethod, DavMethodSet};
use crate::voidfs::VoidFs;
use crate::{handle_copymove, handle_delete, handle_gethead, handle_lock, handle_mkcol, handle_options, handle_props, handle_put};
use crate::DavResult;

/// Cap on a request body we read fully into memory (PROPFIND/PROPPATCH/LOCK
/// XML payloads). PUT bodies are streamed straight to the backend instead.
const MAX_XML_BODY: usize = 10 * 1024 * 1024;

/// Builder for a [`DavHandler`].
pub struct DavConfig {
    prefix:    String,
    fs:        Option<Box<dyn DavFileSystem>>,
    allow:     DavMethodSet,
    autoindex: bool,
}

impl Default for DavConfig {
    fn default() -> Self {
        DavConfig {
            prefix:    String::new(),
            fs:        None,
            allow:     DavMethodSet::WEBDAV_RW,
            autoindex: false,
        }
    }
}

impl DavConfig {
    /// URL path prefix to strip before resolving requests against the
    /// backend, e.g. `/webdav` if the handler is mounted under that path.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Resource backend to serve. If never called, the handler answers every
    /// request with 404 (see [`crate::voidfs::VoidFs`]).
    pub fn filesystem(mut self, fs: Box<dyn DavFileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Restrict which methods are accepted; defaults to every method this
    /// crate implements.
    pub fn allow_methods(mut self, allow: DavMethodSet) -> Self {
        self.allow = allow;
        self
    }

    /// Serve an HTML directory listing on GET of a collection, for requests
    /// that don't look like a WebDAV client (no Depth header). Off by default.
    pub fn autoindex(mut self, on: bool) -> Self {
        self.autoindex = on;
        self
    }

    pub fn build_handler(self) -> DavHandler {
        DavHandler(Arc::new(DavInner {
            prefix:    self.prefix,
            fs:        self.fs.unwrap_or_else(|| VoidFs::new()),
            locks:     LockRegistry::new(),
            props:     Box::new(MemPropDb::new()),
            allow:     self.allow,
            autoindex: self.autoindex,
        }))
    }
}

/// Shared, immutable state behind a [`DavHandler`]. Held in an `Arc` so
/// streaming handlers (PROPFIND) can clone it into a `'static` response
/// stream without cloning the backend itself.
pub(crate) struct DavInner {
    pub(crate) prefix:    String,
    pub(crate) fs:        Box<dyn DavFileSystem>,
    pub(crate) locks:     LockRegistry,
    pub(crate) props:     Box<dyn PropertyBackend>,
    pub(crate) allow:     DavMethodSet,
    pub(crate) autoindex: bool,
}

impl DavInner {
    pub(crate) fn path(&self, uri: &http::Uri) -> DavResult<DavPath> {
        Ok(DavPath::from_uri_and_prefix(uri, &self.prefix)?)
    }
}

/// A ready-to-use WebDAV request handler. Cheap to clone (an `Arc` bump);
/// clone it into every connection/task that needs to call [`Self::handle`].
#[derive(Clone)]
pub struct DavHandler(pub(crate) Arc<DavInner>);

impl DavHandler {
    pub fn builder() -> DavConfig {
        DavConfig::default()
    }

    /// Handle one request. Never fails: every internal error is turned into
    /// an HTTP response with the appropriate status code.
    pub async fn handle<ReqBody>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqBody: http_body::Body + Send,
        ReqBody::Data: Buf + Send,
        ReqBody::Error: StdError + Send + Sync + 'static,
    {
        if crate::fs::is_voidfs(&self.0.fs) {
            return notfound();
        }
        match self.dispatch(req).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("{}", e);
                let mut resp = Response::builder().status(e.statuscode());
                if e.must_close() {
                    resp = resp.header("connection", "close");
                }
                resp.body(Body::empty()).unwrap()
            },
        }
    }

    async fn dispatch<ReqBody>(&self, req: Request<ReqBody>) -> DavResult<Response<Body>>
    where
        ReqBody: http_body::Body + Send,
        ReqBody::Data: Buf + Send,
        ReqBody::Error: StdError + Send + Sync + 'static,
    {
        let inner = self.0.clone();
        let method = dav_method(req.method())?;
        if !inner.allow.contains(method) {
            return Err(StatusCode::METHOD_NOT_ALLOWED.into());
        }

        let (parts, body) = req.into_parts();
        let path = inner.path(&parts.uri)?;

        match method {
            DavMethod::Options => handle_options::handle_options(inner, &parts, &path).await,
            DavMethod::Head => handle_gethead::handle_get(inner, &parts, &path, true).await,
            DavMethod::Get => handle_gethead::handle_get(inner, &parts, &path, false).await,
            DavMethod::Put => handle_put::handle_put(inner, &parts, &path, body).await,
            DavMethod::Delete => handle_delete::handle_delete(inner, &parts, &path).await,
            DavMethod::MkCol => {
                let data = read_request(body, MAX_XML_BODY).await?;
                handle_mkcol::handle_mkcol(inner, &parts, &path, &data).await
            },
            DavMethod::Copy => handle_copymove::handle_copy(inner, &parts, &path).await,
            DavMethod::Move => handle_copymove::handle_move(inner, &parts, &path).await,
            DavMethod::Lock => {
                let data = read_request(body, MAX_XML_BODY).await?;
                handle_lock::handle_lock(inner, &parts, &path, &data).await
            },
            DavMethod::Unlock => handle_lock::handle_unlock(inner, &parts, &path).await,
            DavMethod::PropFind => {
                let data = read_request(body, MAX_XML_BODY).await?;
                handle_props::handle_propfind(inner, &parts, &path, &data).await
            },
            DavMethod::PropPatch => {
                let data = read_request(body, MAX_XML_BODY).await?;
                handle_props::handle_proppatch(inner, &parts, &path, &data).await
            },
        }
    }
}

/// Drain a request body fully into memory, rejecting it once `max_size` is
/// exceeded. Used for the XML-bearing methods, which need the complete
/// payload anyway before they can parse it.
pub(crate) async fn read_request<ReqBody>(body: ReqBody, max_size: usize) -> DavResult<Vec<u8>>
where
    ReqBody: http_body::Body,
    ReqBody::Data: Buf,
    ReqBody::Error: StdError + Send + Sync + 'static,
{
    let collected = body
        .collect()
        .await
        .map_err(|e| DavError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    let bytes = collected.to_bytes();
    if bytes.len() > max_size {
        return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
    }
    Ok(bytes.to_vec())
}
