//! PROPFIND and PROPPATCH, RFC 4918 §9.1/§9.2.
use std::future::Future;
use std::io::{Cursor, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::StreamExt;
use headers::HeaderMapExt;
use http::StatusCode;
use xml::writer::XmlEvent as XmlWEvent;
use xmltree::Element;

use crate::body::Body;
use crate::conditional::check_precondition;
use crate::davhandler::DavInner;
use crate::davheaders::{self, Depth};
use crate::davpath::{DavPath, DavPathRef};
use crate::errors::DavError;
use crate::fs::{DavFileSystem, DavMetaData, FsError, ReadDirMeta};
use crate::handle_lock::{list_lockdiscovery, list_supportedlock};
use crate::locks::LockRegistry;
use crate::props::{DavProp, PatchOp, PatchStatus, PropName, PropertyBackend};
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339, MemBuffer};
use crate::xmltree_ext::{emitter, ElementExt};
use crate::DavResult;

const DAV_NS: &str = "DAV:";

/// What a `<D:propfind>` request body asked for.
enum PropfindRequest {
    AllProp,
    PropName,
    Named(Vec<PropName>),
}

pub(crate) async fn handle_propfind(
    inner: Arc<DavInner>,
    parts: &http::request::Parts,
    path: &DavPath,
    xmldata: &[u8],
) -> DavResult<http::Response<Body>> {
    let depth = match parts.headers.typed_get::<Depth>() {
        Some(Depth::Zero) => Depth::Zero,
        Some(Depth::One) => Depth::One,
        Some(Depth::Infinity) | None => Depth::Infinity,
    };
    let request = parse_propfind(xmldata)?;

    let meta = inner.fs.metadata(path).await?;
    let mut path = path.clone();
    path.add_slash_if(meta.is_dir());

    let mut buf = MemBuffer::new();
    {
        let mut em = emitter(&mut buf)?;
        em.write(XmlWEvent::start_element("D:multistatus").ns("D", DAV_NS)).map_err(DavError::from)?;
        write_propfind_entries(&inner, &mut em, &path, meta, &request, depth).await?;
        em.write(XmlWEvent::end_element()).map_err(DavError::from)?;
    }

    Ok(http::Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header("content-type", "application/xml; charset=utf-8")
        .body(Body::from(buf.take()))
        .unwrap())
}

/// Write one `<D:response>` per resource under `path`, recursing into
/// collections up to `depth`. Boxed explicitly since an `async fn` can't
/// recurse into itself directly.
fn write_propfind_entries<'a, W: Write + Send + 'a>(
    inner: &'a Arc<DavInner>,
    em: &'a mut xml::writer::EventWriter<W>,
    path: &'a DavPath,
    meta: Box<dyn DavMetaData>,
    request: &'a PropfindRequest,
    depth: Depth,
) -> Pin<Box<dyn Future<Output = DavResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let elem = build_propfind_response(&inner.locks, inner.props.as_ref(), path, meta.as_ref(), request, SystemTime::now());
        elem.write_ev(em).map_err(DavError::from)?;

        if !meta.is_dir() || depth == Depth::Zero {
            return Ok(());
        }

        let mut entries = inner.fs.read_dir(path, ReadDirMeta::Data).await?;
        let next_depth = if depth == Depth::Infinity { Depth::Infinity } else { Depth::Zero };
        while let Some(dirent) = entries.next().await {
            let Ok(dirent) = dirent else { continue };
            let Ok(child_meta) = dirent.metadata().await else { continue };
            let mut child = path.clone();
            child.push_segment(&dirent.name());
            child.add_slash_if(child_meta.is_dir());
            write_propfind_entries(inner, em, &child, child_meta, request, next_depth).await?;
        }
        Ok(())
    })
}

fn parse_propfind(xmldata: &[u8]) -> DavResult<PropfindRequest> {
    if xmldata.is_empty() {
        return Ok(PropfindRequest::AllProp);
    }
    let tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "propfind" {
        return Err(DavError::XmlParseError);
    }
    let body = tree.children.first().ok_or(DavError::XmlParseError)?;
    match body.name.as_str() {
        "allprop" => Ok(PropfindRequest::AllProp),
        "propname" => Ok(PropfindRequest::PropName),
        "prop" => {
            let names = body
                .children
                .iter()
                .map(|e| PropName { ns: e.namespace.clone().unwrap_or_else(|| DAV_NS.to_string()), name: e.name.clone() })
                .collect();
            Ok(PropfindRequest::Named(names))
        },
        _ => Err(DavError::XmlParseError),
    }
}

/// Build one `<D:response>` element for `path`, grouping properties into
/// `<D:propstat>` blocks by status (found vs. not-found).
fn build_propfind_response(
    locks: &LockRegistry,
    props: &dyn PropertyBackend,
    path: &DavPathRef,
    meta: &dyn DavMetaData,
    request: &PropfindRequest,
    now: SystemTime,
) -> Element {
    let mut response = Element::new2("D:response");
    response.push(Element::new2("D:href").text(path.as_url_string()));

    let (found, missing): (Vec<Element>, Vec<PropName>) = match request {
        PropfindRequest::AllProp => {
            let mut found: Vec<Element> =
                default_live_names().iter().filter_map(|n| live_prop(n, path, meta, locks, now)).collect();
            found.extend(dead_props_with_defaults(props, path, meta));
            (found, Vec::new())
        },
        PropfindRequest::PropName => {
            let mut found: Vec<Element> = default_live_names()
                .iter()
                .map(|n| {
                    let owned = format!("D:{}", n);
                    Element::new2(&owned[..])
                })
                .collect();
            found.extend(props.all(path.as_url_string().as_str()).into_iter().map(|p| Element::new2(&p.name.name[..])));
            (found, Vec::new())
        },
        PropfindRequest::Named(names) => {
            let mut found = Vec::new();
            let mut missing = Vec::new();
            let mut dead_wanted = Vec::new();
            for n in names {
                if n.ns == DAV_NS {
                    if let Some(e) = live_prop(&n.name, path, meta, locks, now) {
                        found.push(e);
                        continue;
                    }
                }
                dead_wanted.push(n.clone());
            }
            let selected = props.select(path.as_url_string().as_str(), &dead_wanted);
            for n in dead_wanted {
                match selected.iter().find(|p| p.name == n) {
                    Some(DavProp { value: Some(v), .. }) => found.push(v.clone()),
                    _ => {
                        if n.ns == DAV_NS {
                            if let Some(e) = default_dead_value(&n.name, path, meta) {
                                found.push(e);
                                continue;
                            }
                        }
                        missing.push(n);
                    },
                }
            }
            (found, missing)
        },
    };

    if !found.is_empty() {
        response.push(propstat(found, StatusCode::OK));
    }
    if !missing.is_empty() {
        let elems = missing.into_iter().map(|n| Element::new2(&n.name[..])).collect();
        response.push(propstat(elems, StatusCode::NOT_FOUND));
    }
    response
}

fn propstat(props: Vec<Element>, status: StatusCode) -> Element {
    let mut prop = Element::new2("D:prop");
    for p in props {
        prop.push(p);
    }
    let mut propstat = Element::new2("D:propstat");
    propstat.push(prop);
    propstat.push(Element::new2("D:status").text(format!("HTTP/1.1 {}", status)));
    propstat
}

/// Default-live properties: always computed from `DavMetaData`, never
/// stored, and returned verbatim by `allprop`/`propname`.
fn default_live_names() -> &'static [&'static str] {
    &["resourcetype", "getcontentlength", "getlastmodified", "creationdate", "getetag"]
}

/// DAV-namespace properties that are mutable dead props but fall back to a
/// computed default when no value has ever been PROPPATCHed in.
fn defaulted_dead_names() -> &'static [&'static str] {
    &["displayname", "getcontenttype"]
}

fn live_prop(name: &str, path: &DavPathRef, meta: &dyn DavMetaData, locks: &LockRegistry, now: SystemTime) -> Option<Element> {
    match name {
        "resourcetype" => {
            let mut e = Element::new2("D:resourcetype");
            if meta.is_dir() {
                e.push(Element::new2("D:collection"));
            }
            Some(e)
        },
        "getcontentlength" => meta.is_file().then(|| Element::new2("D:getcontentlength").text(meta.len().to_string())),
        "getlastmodified" => meta.modified().ok().map(|m| Element::new2("D:getlastmodified").text(systemtime_to_httpdate(m))),
        "creationdate" => meta.created().ok().map(|c| Element::new2("D:creationdate").text(systemtime_to_rfc3339(c))),
        "getetag" => meta.etag().map(|tag| Element::new2("D:getetag").text(format!("\"{}\"", tag))),
        // lockdiscovery/supportedlock are live but non-default: only served
        // when a PROPFIND names them explicitly, never via allprop/propname.
        "lockdiscovery" => Some(list_lockdiscovery(locks, path, now)),
        "supportedlock" => Some(list_supportedlock()),
        _ => None,
    }
}

/// Computed fallback for a defaulted-dead property, used when PROPPATCH has
/// never set an override.
fn default_dead_value(name: &str, path: &DavPathRef, meta: &dyn DavMetaData) -> Option<Element> {
    match name {
        "displayname" => path.file_name().map(|n| Element::new2("D:displayname").text(n.to_string())),
        "getcontenttype" => Some(Element::new2("D:getcontenttype").text(if meta.is_dir() {
            "httpd/unix-directory".to_string()
        } else {
            path.get_mime_type_str().to_string()
        })),
        _ => None,
    }
}

/// All dead properties stored for `path`, plus computed defaults for
/// `displayname`/`getcontenttype` when no override has been set.
fn dead_props_with_defaults(props: &dyn PropertyBackend, path: &DavPathRef, meta: &dyn DavMetaData) -> Vec<Element> {
    let all = props.all(path.as_url_string().as_str());
    let mut seen_defaulted = std::collections::HashSet::new();
    let mut found: Vec<Element> = all
        .into_iter()
        .filter_map(|p| {
            if p.name.ns == DAV_NS && defaulted_dead_names().contains(&p.name.name.as_str()) {
                seen_defaulted.insert(p.name.name.clone());
            }
            p.value
        })
        .collect();
    for name in defaulted_dead_names() {
        if !seen_defaulted.contains(*name) {
            if let Some(e) = default_dead_value(name, path, meta) {
                found.push(e);
            }
        }
    }
    found
}

pub(crate) async fn handle_proppatch(
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

    check_precondition(
        parts.headers.typed_get::<davheaders::If>().as_ref(),
        &path,
        meta.as_deref().ok(),
        &inner.locks,
        SystemTime::now(),
    )
    .map_err(|_: FsError| StatusCode::LOCKED)?;

    let ops = parse_propertyupdate(xmldata)?;
    let results = inner.props.patch(path.as_url_string().as_str(), &ops);

    let mut buf = MemBuffer::new();
    {
        let mut em = emitter(&mut buf)?;
        em.write(XmlWEvent::start_element("D:multistatus").ns("D", DAV_NS)).map_err(DavError::from)?;

        let mut response = Element::new2("D:response");
        response.push(Element::new2("D:href").text(path.as_url_string()));
        for (status, group) in [
            (StatusCode::OK, PatchStatus::Ok),
            (StatusCode::FORBIDDEN, PatchStatus::Forbidden),
            (StatusCode::FAILED_DEPENDENCY, PatchStatus::FailedDependency),
        ] {
            let names: Vec<Element> =
                results.iter().filter(|(_, s)| *s == group).map(|(n, _)| Element::new2(&n.name[..])).collect();
            if !names.is_empty() {
                response.push(propstat(names, status));
            }
        }
        response.write_ev(&mut em).map_err(DavError::from)?;

        em.write(XmlWEvent::end_element()).map_err(DavError::from)?;
    }

    Ok(http::Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header("content-type", "application/xml; charset=utf-8")
        .body(Body::from(buf.take()))
        .unwrap())
}

fn parse_propertyupdate(xmldata: &[u8]) -> DavResult<Vec<PatchOp>> {
    let tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "propertyupdate" {
        return Err(DavError::XmlParseError);
    }
    let mut ops = Vec::new();
    for group in &tree.children {
        let Some(prop) = group.children.first() else { continue };
        match group.name.as_str() {
            "set" => {
                for p in &prop.children {
                    let name = PropName { ns: p.namespace.clone().unwrap_or_else(|| DAV_NS.to_string()), name: p.name.clone() };
                    ops.push(PatchOp::Set(DavProp { name, value: Some(p.clone()) }));
                }
            },
            "remove" => {
                for p in &prop.children {
                    let name = PropName { ns: p.namespace.clone().unwrap_or_else(|| DAV_NS.to_string()), name: p.name.clone() };
                    ops.push(PatchOp::Remove(name));
                }
            },
            _ => return Err(DavError::XmlParseError),
        }
    }
    Ok(ops)
}
