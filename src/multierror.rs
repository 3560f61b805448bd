//! Accumulates per-resource outcomes during a recursive DELETE/COPY/MOVE, so
//! a partial failure can be reported as a single 207 Multi-Status response
//! instead of one bare status code that can't describe "everything but this
//! one locked file moved".
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPathRef;
use crate::errors::DavError;
use crate::util::MemBuffer;
use crate::xmltree_ext::{emitter, ElementExt};
use crate::DavResult;
use xml::writer::XmlEvent as XmlWEvent;
use xmltree::Element;

pub(crate) struct MultiError {
    statuses: Vec<(String, StatusCode)>,
}

impl MultiError {
    pub(crate) fn new() -> MultiError {
        MultiError { statuses: Vec::new() }
    }

    pub(crate) fn add_status(&mut self, path: &DavPathRef, status: StatusCode) {
        self.statuses.push((path.as_url_string(), status));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// `success` is the status to return when every resource touched by the
    /// operation reported `StatusCode::OK`-equivalent success and no entry
    /// was ever added; otherwise always a 207.
    pub(crate) fn into_response(self, success: StatusCode) -> DavResult<Response<Body>> {
        if self.statuses.is_empty() {
            return Ok(Response::builder().status(success).body(Body::empty()).unwrap());
        }

        let mut buf = MemBuffer::new();
        let mut em = emitter(&mut buf)?;
        em.write(XmlWEvent::start_element("D:multistatus").ns("D", "DAV:"))
            .map_err(DavError::from)?;
        for (href, status) in &self.statuses {
            em.write(XmlWEvent::start_element("D:response")).map_err(DavError::from)?;
            Element::new2("D:href").text(href.clone()).write_ev(&mut em).map_err(DavError::from)?;
            Element::new2("D:status")
                .text(format!("HTTP/1.1 {}", status))
                .write_ev(&mut em)
                .map_err(DavError::from)?;
            em.write(XmlWEvent::end_element()).map_err(DavError::from)?;
        }
        em.write(XmlWEvent::end_element()).map_err(DavError::from)?;
        drop(em);

        Ok(Response::builder()
            .status(StatusCode::MULTI_STATUS)
            .header("content-type", "application/xml; charset=utf-8")
            .body(Body::from(buf.take()))
            .unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::davpath::DavPath;

    #[tokio::test]
    async fn empty_gives_plain_success() {
        let me = MultiError::new();
        let resp = me.into_response(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn nonempty_gives_multistatus() {
        let mut me = MultiError::new();
        let p = DavPath::new("/a/b").unwrap();
        me.add_status(&p, StatusCode::LOCKED);
        let resp = me.into_response(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    }
}
