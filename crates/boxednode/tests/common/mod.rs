#![allow(dead_code, unreachable_pub)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use boxednode::Reporter;
use camino::Utf8PathBuf;
use flate2::{Compression, write::GzEncoder};
use sha2::{Digest, Sha256};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

type Shared<T> = Arc<Mutex<T>>;

/// Minimal HTTP/1.1 server standing in for the Node.js distribution site
pub struct Mirror {
    pub url: Url,
    routes: Shared<HashMap<String, Vec<u8>>>,
    hits: Shared<HashMap<String, usize>>,
}

impl Mirror {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let routes: Shared<HashMap<String, Vec<u8>>> = Arc::default();
        let hits: Shared<HashMap<String, usize>> = Arc::default();

        let (r, h) = (routes.clone(), hits.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(respond(stream, r.clone(), h.clone()));
            }
        });

        Self { url, routes, hits }
    }

    pub fn serve(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), body.into());
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Publishes a release with index entry, tarball and checksum manifest
    pub fn publish(&self, versions: &[&str], version: &str, tarball: &[u8]) {
        let index: Vec<_> = versions
            .iter()
            .map(|v| serde_json::json!({ "version": v, "files": ["src"] }))
            .collect();
        self.serve("/release/index.json", serde_json::to_vec(&index).unwrap());
        self.serve(
            &format!("/release/{version}/node-{version}.tar.gz"),
            tarball.to_vec(),
        );
        self.serve(
            &format!("/release/{version}/SHASUMS256.txt"),
            format!(
                "{}  node-{version}-headers.tar.gz\n{}  node-{version}.tar.gz\n",
                "0".repeat(64),
                sha256(tarball)
            ),
        );
    }
}

async fn respond(
    mut stream: TcpStream,
    routes: Shared<HashMap<String, Vec<u8>>>,
    hits: Shared<HashMap<String, usize>>,
) {
    let mut request = vec![];
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    let request = String::from_utf8_lossy(&request);
    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

    *hits.lock().unwrap().entry(path.clone()).or_default() += 1;
    let body = routes.lock().unwrap().get(&path).cloned();

    let (status, body) = match body {
        Some(body) => ("200 OK", body),
        None => ("404 Not Found", b"not found".to_vec()),
    };
    let mut response = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(&body);
    let _ = stream.write_all(&response).await;
    let _ = stream.shutdown().await;
}

pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Gzipped tarball with every file under `<root>/`
pub fn tarball(root: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let files: Vec<(String, &str)> = files
        .iter()
        .map(|(path, contents)| (format!("{root}/{path}"), *contents))
        .collect();
    tarball_of(&files)
}

pub fn tarball_of(files: &[(String, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(vec![], Compression::fast()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Just enough of a runtime source tree for everything before the native
/// build
pub fn fake_node_source(version: &str) -> Vec<u8> {
    tarball(
        &format!("node-{version}"),
        &[
            ("configure", "#!/bin/sh\nexit 1\n"),
            ("node.gypi", "{ 'variables': { 'node_shared': 'false' } }\n"),
            ("src/node.h", "#ifndef SRC_NODE_H_\n#define SRC_NODE_H_\n#endif\n"),
            ("src/node_api.h", "#ifndef SRC_NODE_API_H_\n#define SRC_NODE_API_H_\n#endif\n"),
        ],
    )
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Keeps every reporter call for assertions
#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
    pub progress: Mutex<u64>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Bytes received as of the last progress update
    pub fn progress(&self) -> u64 {
        *self.progress.lock().unwrap()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Reporter for RecordingReporter {
    fn step_starting(&self, info: &str) {
        self.push(format!("start: {info}"));
    }

    fn step_completed(&self) {
        self.push("completed".into());
    }

    fn step_failed(&self, err: &dyn std::error::Error) {
        self.push(format!("failed: {err}"));
    }

    fn start_progress(&self, total: u64) {
        self.push(format!("progress total: {total}"));
    }

    fn do_progress(&self, current: u64) {
        *self.progress.lock().unwrap() = current;
    }
}
