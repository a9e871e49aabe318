use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::ConfigError;

/// A native addon that gets statically linked into the produced binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonSpec {
    /// Directory containing the addon sources and its `binding.gyp`
    pub path: Utf8PathBuf,
    /// JavaScript regular expression source; `require()` ids matching it
    /// resolve to this addon
    pub require_pattern: String,
    /// JavaScript regular expression flags
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub require_flags: String,
}

impl AddonSpec {
    pub fn new(path: impl Into<Utf8PathBuf>, require_pattern: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            require_pattern: require_pattern.into(),
            require_flags: String::new(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.require_flags = flags.into();
        self
    }

    /// Content-derived identifier of this addon.
    ///
    /// Two specs with identical content always map to the same id, which
    /// keeps generated symbol names and paths stable between builds.
    pub fn content_id(&self) -> String {
        // serializing a plain struct of strings cannot fail
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut id = hex::encode(Sha256::digest(&canonical));
        id.truncate(32);
        id
    }
}

impl FromStr for AddonSpec {
    type Err = ConfigError;

    /// Parses `<PATH>=<REGEX>`, splitting on the first `=`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((path, pattern)) if !path.is_empty() && !pattern.is_empty() => {
                Ok(Self::new(path, pattern))
            }
            _ => Err(ConfigError::InvalidInput(format!(
                "addon must be given as <PATH>=<REGEX>, got {s:?}"
            ))),
        }
    }
}
