//! Downloads and unpacks the runtime source tree into the cache directory.

use std::{
    collections::BTreeSet,
    io::{self, Read},
    path::Component,
};

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use tokio::{io::AsyncWriteExt, sync::mpsc, task::JoinHandle};
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::{
    error::{BoxednodeError, Result},
    release::{ReleaseSource, ResolvedRelease},
    reporter::Reporter,
};

const DEFAULT_RETRIES: u32 = 2;
const CHUNK_BUFFER: usize = 32;

pub struct SourceAcquirer<'a> {
    client: reqwest::Client,
    reporter: &'a dyn Reporter,
    retries: u32,
}

impl<'a> SourceAcquirer<'a> {
    pub fn new(client: reqwest::Client, reporter: &'a dyn Reporter) -> Self {
        Self {
            client,
            reporter,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Additional attempts after a failed download or extraction
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Makes the release's source tree available under `cache_dir` and
    /// returns its path
    ///
    /// # Errors
    ///
    /// The last attempt's error once retries are exhausted, or the first
    /// non-retryable one
    pub async fn acquire(
        &self,
        release: &ResolvedRelease,
        cache_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        tokio::fs::create_dir_all(cache_dir).await?;

        let mut attempt = 0;
        loop {
            match self.acquire_once(release, cache_dir).await {
                Ok(tree) => {
                    self.reporter.step_completed();
                    return Ok(tree);
                }
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    self.reporter.step_failed(&e);
                    self.reporter
                        .step_starting(&format!("Re-trying ({attempt}/{})", self.retries));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn acquire_once(
        &self,
        release: &ResolvedRelease,
        cache_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        if let ReleaseSource::Local(tarball) = &release.source {
            self.reporter
                .step_starting(&format!("Unpacking {tarball} to {cache_dir}"));
            return unpack_file(tarball.clone(), cache_dir.to_owned()).await;
        }

        let tarball = cache_dir.join(release.tarball_name());
        if self.cached_tarball_usable(release, &tarball).await? {
            self.reporter
                .step_starting(&format!("Unpacking existing tarball to {cache_dir}"));
            return match unpack_file(tarball.clone(), cache_dir.to_owned()).await {
                Ok(tree) => Ok(tree),
                Err(e) => {
                    remove_if_exists(&tarball).await?;
                    Err(e)
                }
            };
        }

        self.download_and_unpack(release, &tarball, cache_dir).await
    }

    async fn cached_tarball_usable(
        &self,
        release: &ResolvedRelease,
        tarball: &Utf8Path,
    ) -> Result<bool> {
        let non_empty = tokio::fs::metadata(tarball)
            .await
            .is_ok_and(|m| m.is_file() && m.len() > 0);
        if !non_empty {
            return Ok(false);
        }
        let Some(checksums_url) = release.checksums_url() else {
            debug!("Reusing unverified tarball {tarball}");
            return Ok(true);
        };

        self.reporter
            .step_starting(&format!("Verifying existing tarball via {checksums_url}"));
        let tarball_name = release.tarball_name();
        let (expected, actual) = tokio::join!(
            self.fetch_checksum(&checksums_url, &tarball_name),
            sha256_file(tarball.to_owned())
        );
        let actual = actual?;
        match expected {
            Ok(expected) if expected.eq_ignore_ascii_case(&actual) => Ok(true),
            Ok(expected) => {
                let err = BoxednodeError::IntegrityMismatch {
                    path: tarball.to_owned(),
                    expected,
                    actual,
                };
                warn!("{err}, downloading it again");
                remove_if_exists(tarball).await?;
                Ok(false)
            }
            Err(e) => {
                warn!("Could not verify {tarball} ({e}), using it anyway");
                Ok(true)
            }
        }
    }

    async fn fetch_checksum(&self, url: &url::Url, tarball_name: &str) -> Result<String> {
        let manifest = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_error(url.as_str(), &e))?
            .text()
            .await
            .map_err(|e| fetch_error(url.as_str(), &e))?;
        find_checksum(&manifest, tarball_name).ok_or_else(|| BoxednodeError::SourceFetch {
            url: url.to_string(),
            reason: format!("no checksum listed for {tarball_name}"),
        })
    }

    async fn download_and_unpack(
        &self,
        release: &ResolvedRelease,
        tarball: &Utf8Path,
        cache_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        let url = release
            .tarball_url()
            .ok_or_else(|| {
                BoxednodeError::InvalidInput(format!("no download url for {}", release.version))
            })?;

        self.reporter.step_starting(&format!("Downloading from {url}"));
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_error(url.as_str(), &e))?;

        self.reporter
            .step_starting(&format!("Unpacking tarball to {cache_dir}"));
        let total = response.content_length();
        if let Some(total) = total {
            self.reporter.start_progress(total);
        }

        // chunks go to the cache file and, through the channel, to the extractor
        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let reader = chunk_reader(rx);
        let origin = url.to_string();
        let dest = cache_dir.to_owned();
        let mut extractor = tokio::task::spawn_blocking(move || unpack(reader, &dest, &origin));

        let mut file = tokio::fs::File::create(tarball).await?;
        let mut extracted = None;
        let pumped = async {
            let mut received = 0u64;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| fetch_error(url.as_str(), &e))?
            {
                received += chunk.len() as u64;
                file.write_all(&chunk).await?;
                if extracted.is_none() && tx.send(Ok(chunk)).await.is_err() {
                    // the extractor is done; after a failure the rest of the body is useless
                    let early = join_extractor(&mut extractor).await;
                    let failed = early.is_err();
                    extracted = Some(early);
                    if failed {
                        break;
                    }
                }
                if total.is_some() {
                    self.reporter.do_progress(received);
                }
            }
            file.flush().await?;
            Ok::<(), BoxednodeError>(())
        }
        .await;
        drop(tx);

        let extracted = match extracted {
            Some(extracted) => extracted,
            None => join_extractor(&mut extractor).await,
        };
        let err = match (pumped, extracted) {
            (Ok(()), Ok(tree)) => return Ok(tree),
            (Err(e), _) | (Ok(()), Err(e)) => e,
        };
        remove_if_exists(tarball).await?;
        Err(err)
    }
}

async fn join_extractor(extractor: &mut JoinHandle<Result<Utf8PathBuf>>) -> Result<Utf8PathBuf> {
    extractor
        .await
        .map_err(|e| BoxednodeError::Io(io::Error::other(e)))?
}

/// Hex SHA256 listed for `file_name` in a `SHASUMS256.txt` manifest
pub fn find_checksum(manifest: &str, file_name: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let hash = fields.next()?;
        let name = fields.next()?.trim_start_matches('*');
        (name == file_name && hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| hash.to_ascii_lowercase())
    })
}

async fn sha256_file(path: Utf8PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| BoxednodeError::Io(io::Error::other(e)))?
}

async fn unpack_file(tarball: Utf8PathBuf, dest: Utf8PathBuf) -> Result<Utf8PathBuf> {
    tokio::task::spawn_blocking(move || -> Result<Utf8PathBuf> {
        let file = std::fs::File::open(&tarball)?;
        unpack(io::BufReader::new(file), &dest, tarball.as_str())
    })
    .await
    .map_err(|e| BoxednodeError::Io(io::Error::other(e)))?
}

/// Extracts a gzipped tarball into `dest`. The archive must hold exactly one
/// top-level directory, whose path is returned.
fn unpack(reader: impl Read, dest: &Utf8Path, origin: &str) -> Result<Utf8PathBuf> {
    let malformed = |reason: String| BoxednodeError::MalformedArchive {
        path: origin.to_string(),
        reason,
    };

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut roots = BTreeSet::new();
    for entry in archive.entries().map_err(|e| malformed(e.to_string()))? {
        let mut entry = entry.map_err(|e| malformed(e.to_string()))?;
        if entry.header().entry_type().is_pax_global_extensions() {
            continue;
        }
        let path = entry.path().map_err(|e| malformed(e.to_string()))?;
        let root = path.components().find_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        });
        if let Some(root) = root {
            roots.insert(root);
        }
        entry
            .unpack_in(dest.as_std_path())
            .map_err(|e| malformed(e.to_string()))?;
    }

    let mut roots = roots.into_iter();
    match (roots.next(), roots.next()) {
        (Some(root), None) if dest.join(&root).is_dir() => {
            debug!("Unpacked {origin} to {dest}/{root}");
            Ok(dest.join(root))
        }
        (None, _) => Err(malformed("archive is empty".into())),
        _ => Err(malformed(
            "expected exactly one top-level directory".into(),
        )),
    }
}

/// Blocking reader over chunks sent from the async download loop. Must be
/// created inside the runtime.
fn chunk_reader(rx: mpsc::Receiver<io::Result<Bytes>>) -> impl Read + Send {
    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    SyncIoBridge::new(StreamReader::new(Box::pin(chunks)))
}

async fn remove_if_exists(path: &Utf8Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn fetch_error(url: &str, err: &reqwest::Error) -> BoxednodeError {
    BoxednodeError::SourceFetch {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use flate2::{Compression, write::GzEncoder};

    use super::*;

    fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(vec![], Compression::fast()));
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_find_checksum() {
        let manifest = format!(
            "{a}  node-v18.17.1-headers.tar.gz\n{b}  node-v18.17.1.tar.gz\n{c} *node-v18.17.1.tar.xz\n",
            a = "a".repeat(64),
            b = "B".repeat(64),
            c = "c".repeat(64),
        );
        assert_eq!(
            find_checksum(&manifest, "node-v18.17.1.tar.gz"),
            Some("b".repeat(64))
        );
        assert_eq!(
            find_checksum(&manifest, "node-v18.17.1.tar.xz"),
            Some("c".repeat(64))
        );
        assert_eq!(find_checksum(&manifest, "node-v20.0.0.tar.gz"), None);
        assert_eq!(find_checksum("nothex  node-v1.tar.gz", "node-v1.tar.gz"), None);
    }

    #[test]
    fn test_unpack_single_root() {
        let (_dir, dest) = utf8_tempdir();
        let data = tarball(&[
            ("node-v18.17.1/configure", "#!/bin/sh\n"),
            ("node-v18.17.1/src/node.h", "// node\n"),
        ]);
        let tree = unpack(data.as_slice(), &dest, "test.tar.gz").unwrap();
        assert_eq!(tree, dest.join("node-v18.17.1"));
        assert_eq!(
            std::fs::read_to_string(tree.join("src/node.h")).unwrap(),
            "// node\n"
        );
    }

    #[test]
    fn test_unpack_rejects_multiple_roots() {
        let (_dir, dest) = utf8_tempdir();
        let data = tarball(&[("a/file", "1"), ("b/file", "2")]);
        let err = unpack(data.as_slice(), &dest, "test.tar.gz").unwrap_err();
        assert!(matches!(err, BoxednodeError::MalformedArchive { .. }));
    }

    #[test]
    fn test_unpack_rejects_lone_file() {
        let (_dir, dest) = utf8_tempdir();
        let data = tarball(&[("README", "hi")]);
        let err = unpack(data.as_slice(), &dest, "test.tar.gz").unwrap_err();
        assert!(matches!(err, BoxednodeError::MalformedArchive { .. }));
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let (_dir, dest) = utf8_tempdir();
        let err = unpack(&b"definitely not gzip"[..], &dest, "test.tar.gz").unwrap_err();
        assert!(matches!(err, BoxednodeError::MalformedArchive { .. }));
    }

    #[tokio::test]
    async fn test_chunk_reader_reassembles_chunks() {
        let (tx, rx) = mpsc::channel(4);
        let reader = chunk_reader(rx);
        for chunk in ["hel", "", "lo"] {
            tx.send(Ok(Bytes::from_static(chunk.as_bytes())))
                .await
                .unwrap();
        }
        drop(tx);

        let out = tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut out = String::new();
            reader.read_to_string(&mut out).map(|_| out)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let (_dir, dir) = utf8_tempdir();
        let path = dir.join("data");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
