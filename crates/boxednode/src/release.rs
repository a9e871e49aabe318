//! Picks the Node.js source release a version spec refers to.

use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use regex::Regex;
use semver::{Version, VersionReq};
use serde::Deserialize;
use url::Url;

use crate::error::{BoxednodeError, Result};

pub const DEFAULT_DIST_URL: &str = "https://nodejs.org/download/";

static NIGHTLY_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?\d+\.\d+\.\d+-nightly\d{8}[0-9a-f]+$").expect("valid nightly pattern")
});

static LOCAL_TARBALL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^node-(v\d+\.\d+\.\d+[^/]*?)\.tar\.gz$").expect("valid pattern"));

/// Where the source tarball of a release comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSource {
    /// Directory on the distribution server holding `node-<version>.tar.gz`
    Remote { base_url: Url, verify: bool },
    /// Tarball on disk, used as-is
    Local(Utf8PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    /// Version with its `v` prefix, e.g. `v18.17.1`
    pub version: String,
    pub source: ReleaseSource,
}

impl ResolvedRelease {
    pub fn tarball_name(&self) -> String {
        format!("node-{}.tar.gz", self.version)
    }

    pub fn tarball_url(&self) -> Option<Url> {
        match &self.source {
            ReleaseSource::Remote { base_url, .. } => base_url.join(&self.tarball_name()).ok(),
            ReleaseSource::Local(_) => None,
        }
    }

    /// Checksum manifest for releases whose tarball gets verified
    pub fn checksums_url(&self) -> Option<Url> {
        match &self.source {
            ReleaseSource::Remote {
                base_url,
                verify: true,
            } => base_url.join("SHASUMS256.txt").ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    version: String,
}

pub struct Resolver {
    client: reqwest::Client,
    dist_url: Url,
}

impl Resolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            dist_url: Url::parse(DEFAULT_DIST_URL).expect("valid default dist url"),
        }
    }

    /// Use another mirror of the `release/` and `nightly/` layout
    #[must_use]
    pub fn with_dist_url(mut self, url: Url) -> Self {
        self.dist_url = with_trailing_slash(url);
        self
    }

    /// # Errors
    ///
    /// [`BoxednodeError::NoMatchingVersion`] if the spec is unusable, nothing
    /// in the release index matches, or the index cannot be fetched
    pub async fn resolve(&self, spec: &str) -> Result<ResolvedRelease> {
        let spec = spec.trim();
        if let Some(release) = self.resolve_without_index(spec)? {
            return Ok(release);
        }

        let index_url = self.dist_join(spec, "release/index.json")?;
        debug!("Fetching release index from {index_url}");
        let entries: Vec<IndexEntry> = self
            .client
            .get(index_url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| no_match(spec, format!("cannot fetch {index_url}: {e}")))?
            .json()
            .await
            .map_err(|e| no_match(spec, format!("invalid release index: {e}")))?;

        let versions = entries.iter().map(|e| e.version.as_str());
        let version = best_match(versions, spec)?;
        let base_url = self.dist_join(spec, &format!("release/{version}/"))?;
        Ok(ResolvedRelease {
            version,
            source: ReleaseSource::Remote {
                base_url,
                verify: true,
            },
        })
    }

    /// Local tarballs and nightly tags need no index lookup
    fn resolve_without_index(&self, spec: &str) -> Result<Option<ResolvedRelease>> {
        if spec.starts_with("file:") {
            let url = Url::parse(spec).map_err(|e| no_match(spec, e.to_string()))?;
            let path = url
                .to_file_path()
                .ok()
                .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
                .ok_or_else(|| no_match(spec, "not a local UTF-8 path".into()))?;
            return Ok(Some(ResolvedRelease {
                version: local_version(&path),
                source: ReleaseSource::Local(path),
            }));
        }

        if NIGHTLY_VERSION.is_match(spec) {
            let version = with_v_prefix(spec);
            let base_url = self.dist_join(spec, &format!("nightly/{version}/"))?;
            return Ok(Some(ResolvedRelease {
                version,
                source: ReleaseSource::Remote {
                    base_url,
                    verify: false,
                },
            }));
        }

        Ok(None)
    }

    fn dist_join(&self, spec: &str, path: &str) -> Result<Url> {
        self.dist_url
            .join(path)
            .map_err(|e| no_match(spec, format!("invalid distribution url: {e}")))
    }
}

/// Highest version (as listed, with `v` prefix) satisfying `spec`
///
/// # Errors
///
/// [`BoxednodeError::NoMatchingVersion`] when the spec does not parse or
/// nothing matches
pub fn best_match<'a>(versions: impl IntoIterator<Item = &'a str>, spec: &str) -> Result<String> {
    let reqs = parse_range(spec)?;
    versions
        .into_iter()
        .filter_map(|listed| {
            let version = Version::parse(listed.trim_start_matches('v')).ok()?;
            reqs.iter()
                .any(|req| req.matches(&version))
                .then(|| (version, listed))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, listed)| with_v_prefix(listed))
        .ok_or_else(|| no_match(spec, "no release in the index satisfies it".into()))
}

/// Parses an npm style range: `||` alternatives of whitespace separated
/// comparators, where a bare full version means exactly that version
///
/// # Errors
///
/// [`BoxednodeError::NoMatchingVersion`] if an alternative does not parse
pub fn parse_range(spec: &str) -> Result<Vec<VersionReq>> {
    spec.split("||")
        .map(|alternative| {
            let normalized = normalize_alternative(alternative);
            VersionReq::parse(&normalized).map_err(|e| no_match(spec, e.to_string()))
        })
        .collect()
}

fn normalize_alternative(alternative: &str) -> String {
    let tokens: Vec<&str> = alternative.split_whitespace().collect();
    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={}, <={}", bare(low), bare(high));
    }

    let mut comparators = vec![];
    let mut pending_op = String::new();
    for token in tokens {
        let split = token
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
            .unwrap_or(token.len());
        let (op, version) = token.split_at(split);
        if version.is_empty() {
            pending_op.push_str(op);
            continue;
        }
        let op = if op.is_empty() {
            std::mem::take(&mut pending_op)
        } else {
            pending_op.clear();
            op.to_string()
        };
        comparators.push(comparator(&op, &bare(version)));
    }

    if comparators.is_empty() {
        "*".into()
    } else {
        comparators.join(", ")
    }
}

fn comparator(op: &str, version: &str) -> String {
    if version == "*" || !op.is_empty() {
        return format!("{op}{version}");
    }
    let parts = version.split('.').count();
    let wildcard = version.split('.').any(|p| p == "*");
    if parts >= 3 && !wildcard {
        format!("={version}")
    } else if wildcard {
        version.to_string()
    } else {
        format!("{version}.*")
    }
}

fn bare(version: &str) -> String {
    version
        .trim_start_matches(['v', '='])
        .split('.')
        .map(|part| if part.eq_ignore_ascii_case("x") { "*" } else { part })
        .collect::<Vec<_>>()
        .join(".")
}

fn with_v_prefix(version: &str) -> String {
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{version}")
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn local_version(path: &Utf8Path) -> String {
    path.file_name()
        .and_then(|name| LOCAL_TARBALL_NAME.captures(name))
        .map_or_else(|| "local".into(), |caps| caps[1].to_string())
}

fn no_match(spec: &str, reason: String) -> BoxednodeError {
    BoxednodeError::NoMatchingVersion {
        spec: spec.to_string(),
        reason,
    }
}
