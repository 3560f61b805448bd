//! Request and response body types.
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;
use http_body::{Body as HttpBody, Frame};

use crate::async_stream::AsyncStream;

/// Body returned by the handler. Implements both `futures_util::Stream` and
/// `http_body::Body`, so it plugs into hyper directly or can be drained
/// manually (as the test harness does).
pub struct Body {
    pub(crate) inner: BodyType,
}

pub(crate) enum BodyType {
    Bytes(Option<Bytes>),
    AsyncStream(AsyncStream<Bytes, io::Error>),
    Empty,
}

impl Body {
    /// Return an empty body.
    pub fn empty() -> Body {
        Body { inner: BodyType::Empty }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match self.inner {
            BodyType::Bytes(ref mut strm) => Poll::Ready(strm.take().map(Ok)),
            BodyType::AsyncStream(ref mut strm) => {
                let strm = Pin::new(strm);
                strm.poll_next(cx)
            },
            BodyType::Empty => Poll::Ready(None),
        }
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx).map(|opt| opt.map(|r| r.map(Frame::data)))
    }
}

impl From<String> for Body {
    fn from(t: String) -> Body {
        Body { inner: BodyType::Bytes(Some(Bytes::from(t))) }
    }
}

impl From<&str> for Body {
    fn from(t: &str) -> Body {
        Body { inner: BodyType::Bytes(Some(Bytes::from(t.to_string()))) }
    }
}

impl From<Bytes> for Body {
    fn from(t: Bytes) -> Body {
        Body { inner: BodyType::Bytes(Some(t)) }
    }
}

impl From<AsyncStream<Bytes, io::Error>> for Body {
    fn from(s: AsyncStream<Bytes, io::Error>) -> Body {
        Body { inner: BodyType::AsyncStream(s) }
    }
}
