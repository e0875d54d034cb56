/*
 * WebDAV round-trip tests
 *
 * Runs the client against a real WebDAV implementation (dav-server over an
 * in-memory filesystem) to check the laws callers rely on: what is written
 * reads back byte for byte, directory creation and deletion are idempotent,
 * and listings reflect what was stored.
 */

use std::collections::HashMap;
use std::io::Write;

use anyhow::{anyhow, Result};
use clouddav::{DavConfig, StorageBackend, WebDavBackend, WebDavClient};
use dav_server::{fakels::FakeLs, memfs::MemFs, DavHandler};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::debug;

/// In-memory WebDAV server bound to an ephemeral port
struct MemDavServer {
    port: u16,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemDavServer {
    async fn start() -> Result<Self> {
        let dav_handler = DavHandler::builder()
            .filesystem(MemFs::new())
            .locksystem(FakeLs::new())
            .build_handler();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow!("Failed to bind to port: {}", e))?;
        let port = listener
            .local_addr()
            .map_err(|e| anyhow!("Failed to get local address: {}", e))?
            .port();

        let server_handle = tokio::spawn(async move {
            while let Ok((stream, _addr)) = listener.accept().await {
                let io = TokioIo::new(stream);
                let handler = dav_handler.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let handler = handler.clone();
                        async move {
                            let response = handler.handle(req).await;
                            let (parts, body) = response.into_parts();
                            let body_bytes = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
                            Ok::<_, std::convert::Infallible>(hyper::Response::from_parts(parts, Full::new(body_bytes)))
                        }
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("WebDAV connection error: {}", e);
                    }
                });
            }
        });

        Ok(Self {
            port,
            server_handle: Some(server_handle),
        })
    }

    fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    fn client(&self) -> WebDavClient {
        WebDavClient::new(&self.url(), "", "").expect("client")
    }
}

impl Drop for MemDavServer {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

async fn read_all(client: &WebDavClient, path: &str) -> Vec<u8> {
    let mut reader = match client.read_stream(path).await {
        Ok(reader) => reader,
        Err(e) => panic!("read {path}: {e}"),
    };
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await.expect("read body");
    data
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_connect() {
    let server = MemDavServer::start().await.expect("server");
    server.client().connect().await.expect("connect");
}

#[tokio::test]
async fn test_buffered_write_reads_back() {
    let server = MemDavServer::start().await.expect("server");
    let client = server.client();
    let data = payload(300_000);

    client
        .write_stream("/backups/site/db.sql.gz", std::io::Cursor::new(data.clone()))
        .await
        .expect("write_stream");
    assert_eq!(read_all(&client, "/backups/site/db.sql.gz").await, data);

    client.write_bytes("/backups/empty.txt", Vec::new()).await.expect("write empty");
    assert!(read_all(&client, "/backups/empty.txt").await.is_empty());
}

#[tokio::test]
async fn test_seekable_write_reads_back() {
    let server = MemDavServer::start().await.expect("server");
    let client = server.client();
    let data = payload(1_500_000);

    let mut local = tempfile::NamedTempFile::new().expect("temp file");
    local.write_all(&data).expect("fill temp file");
    local.flush().expect("flush");
    let file = tokio::fs::File::open(local.path()).await.expect("open");

    client.write_file("/archive/2024/full.tar", file).await.expect("write_file");
    assert_eq!(read_all(&client, "/archive/2024/full.tar").await, data);

    let info = client.stat("/archive/2024/full.tar").await.expect("stat");
    assert_eq!(info.size, data.len() as i64);
    assert!(!info.is_dir);
}

#[tokio::test]
async fn test_overwrite_replaces_content() {
    let server = MemDavServer::start().await.expect("server");
    let client = server.client();

    client.write_bytes("/f.txt", "first version").await.expect("write");
    client.write_bytes("/f.txt", "second").await.expect("overwrite");
    assert_eq!(read_all(&client, "/f.txt").await, b"second".to_vec());
}

#[tokio::test]
async fn test_mkdir_all_is_idempotent() {
    let server = MemDavServer::start().await.expect("server");
    let client = server.client();

    client.mkdir_all("/x/y/z/").await.expect("first mkdir");
    client.mkdir_all("/x/y/z/").await.expect("second mkdir");

    let listing = client.read_dir("/x/y/").await.expect("read_dir");
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "z");
    assert!(listing[0].is_dir);
    assert_eq!(listing[0].path, "/x/y/z/");

    assert!(client.stat("/x/y/z/").await.expect("stat").is_dir);
}

#[tokio::test]
async fn test_remove_all_is_idempotent() {
    let server = MemDavServer::start().await.expect("server");
    let client = server.client();

    client.write_bytes("/tmp/a/b.txt", "bye").await.expect("write");
    client.remove_all("/tmp/a/").await.expect("first delete");
    client.remove_all("/tmp/a/").await.expect("second delete");

    let err = client.stat("/tmp/a/b.txt").await.expect_err("deleted");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_listing_reflects_contents() {
    let server = MemDavServer::start().await.expect("server");
    let client = server.client();

    client.write_bytes("/list/a.txt", "aaaa").await.expect("write a");
    client.write_bytes("/list/b c.txt", "bb").await.expect("write b");
    client.mkdir_all("/list/sub/").await.expect("mkdir sub");

    let mut listing = client.read_dir("/list").await.expect("read_dir");
    listing.sort_by(|l, r| l.name.cmp(&r.name));

    let names: Vec<&str> = listing.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b c.txt", "sub"]);
    assert_eq!(listing[0].size, 4);
    assert_eq!(listing[1].size, 2);
    assert_eq!(listing[1].path, "/list/b c.txt");
    assert!(listing[2].is_dir);
    assert_eq!(listing[2].size, 0);
}

#[tokio::test]
async fn test_concurrent_clones_share_one_client() {
    let server = MemDavServer::start().await.expect("server");
    let client = server.client();
    // MKCOL of the same collection from two callers would race
    client.mkdir_all("/parallel/dir0/").await.expect("mkdir dir0");
    client.mkdir_all("/parallel/dir1/").await.expect("mkdir dir1");

    let writes = (0..8).map(|i| {
        let client = client.clone();
        async move {
            let path = format!("/parallel/dir{}/part{}.bin", i % 2, i);
            client.write_bytes(&path, payload(1024 + i)).await.map(|_| path)
        }
    });
    let paths: Vec<String> = futures::future::join_all(writes)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("concurrent writes");

    let reads = paths.iter().map(|path| read_all(&client, path));
    for (i, data) in futures::future::join_all(reads).await.into_iter().enumerate() {
        assert_eq!(data, payload(1024 + i));
    }

    let mut names: Vec<String> = client
        .read_dir("/parallel/dir0/")
        .await
        .expect("read_dir")
        .into_iter()
        .map(|f| f.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["part0.bin", "part2.bin", "part4.bin", "part6.bin"]);
}

#[tokio::test]
async fn test_storage_backend_round_trip() {
    let server = MemDavServer::start().await.expect("server");
    let vars: HashMap<String, serde_json::Value> = serde_json::from_value(serde_json::json!({
        "address": server.url(),
        "username": "",
        "password": "",
        "bucket": "panel-backups"
    }))
    .expect("vars");
    let backend = WebDavBackend::from_vars(&vars).await.expect("backend");

    let workdir = tempfile::tempdir().expect("tempdir");
    let source = workdir.path().join("site.tar.gz");
    let data = payload(64 * 1024);
    std::fs::write(&source, &data).expect("write source");

    backend.upload(&source, "website/site.tar.gz").await.expect("upload");
    assert!(backend.exist("website/site.tar.gz").await.expect("exist"));
    assert!(!backend.exist("website/other.tar.gz").await.expect("exist"));
    assert_eq!(backend.size("website/site.tar.gz").await.expect("size"), data.len() as i64);
    assert_eq!(backend.list_objects("website").await.expect("list"), vec!["site.tar.gz".to_string()]);

    let target = workdir.path().join("restored.tar.gz");
    backend.download("website/site.tar.gz", &target).await.expect("download");
    assert_eq!(std::fs::read(&target).expect("read restored"), data);

    // same size locally: nothing is transferred and the file is untouched
    let marker = vec![0u8; data.len()];
    std::fs::write(&target, &marker).expect("overwrite restored");
    backend.download("website/site.tar.gz", &target).await.expect("skip download");
    assert_eq!(std::fs::read(&target).expect("read restored"), marker);

    backend.delete("website/").await.expect("delete");
    assert!(!backend.exist("website/site.tar.gz").await.expect("exist"));
    backend.delete("website/").await.expect("delete again");
}

#[tokio::test]
async fn test_backend_construction_fails_without_server() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let config = DavConfig::new(format!("http://127.0.0.1:{}", port), "u", "p");
    assert!(WebDavBackend::new(&config).await.is_err());
}
