//! Minimal standalone WebDAV server built on the library crate.
//!
//! Serves a single directory tree (or an in-memory filesystem) over plain
//! HTTP, with no TLS and no authentication — point a WebDAV client at it to
//! exercise the protocol implementation by hand.
use std::convert::Infallible;
use std::net::SocketAddr;

use clap::Parser;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use log::{debug, info, warn};
use tokio::net::TcpListener;
use webdav_core::memfs::MemFs;
use webdav_core::{localfs::LocalFs, DavHandler};

#[derive(Parser, Debug)]
#[command(about = "Serve a directory (or an in-memory filesystem) over WebDAV")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:4918")]
    listen: SocketAddr,

    /// Directory to serve. If omitted, an empty in-memory filesystem is used.
    #[arg(long)]
    dir: Option<String>,

    /// URL path prefix to strip before resolving requests against the backend.
    #[arg(long, default_value = "")]
    prefix: String,

    /// Serve a directory listing on GET of a collection.
    #[arg(long)]
    autoindex: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut builder = DavHandler::builder().strip_prefix(args.prefix).autoindex(args.autoindex);
    builder = match &args.dir {
        Some(dir) => builder.filesystem(LocalFs::new(dir, true)),
        None => builder.filesystem(MemFs::new()),
    };
    let handler = builder.build_handler();

    let listener = TcpListener::bind(args.listen).await.expect("failed to bind listen address");
    info!("listening on {}", args.listen);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(a) => a,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            },
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req: Request<Incoming>| {
                let handler = handler.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let body = body.boxed();
                    let req = Request::from_parts(parts, body);
                    Ok::<_, Infallible>(handler.handle(req).await)
                }
            });
            if let Err(e) = Builder::new(TokioExecutor::new()).serve_connection(io, service).await {
                debug!("connection from {} failed: {}", peer, e);
            }
        });
    }
}
