//! End-to-end lifecycle test for statically configured proxies: config file
//! in, running reverse proxy out, clean shutdown at the end.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tempfile::tempdir;
use tokio::net::TcpListener;

use webtail::config::Config;
use webtail::proxy::{ProxyHandle, ProxyServer};

fn full_body(bytes: Bytes) -> BoxBody<Bytes, Infallible> {
    Full::new(bytes).map_err(|_| unreachable!()).boxed()
}

/// Minimal backend answering every request with its path.
async fn spawn_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                    let body = format!("path={}", req.uri().path());
                    Ok::<_, Infallible>(Response::new(full_body(Bytes::from(body))))
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

#[tokio::test]
async fn config_file_to_running_proxy_and_back() {
    let backend = spawn_backend().await;

    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        format!(
            r#"{{ "services": [ {{ "target": "http://{backend}", "node_name": "app" }} ] }}"#
        ),
    )
    .unwrap();

    let config = Config::load(&path, false).unwrap();

    let proxy = ProxyServer::new(config.services[0].clone(), config.listen.host.clone());
    proxy.start().await.unwrap();
    assert_eq!(proxy.node_name(), "app");
    assert_eq!(proxy.target(), format!("http://{backend}"));
    let addr = proxy.local_addr().await.unwrap();

    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "path=/metrics");

    proxy.stop().await.unwrap();

    // After shutdown new connections are refused.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(reqwest::get(format!("http://{addr}/metrics")).await.is_err());
}
