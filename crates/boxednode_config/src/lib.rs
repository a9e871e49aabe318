//! Configuration for a single boxednode compilation.
//!
//! A [`CompilationOptions`] value is built once per invocation and treated as
//! immutable afterwards: anything derived from it (environment-provided build
//! arguments, the namespace, the cache directory) is computed into new values.

pub mod addon;
pub mod env_args;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use addon::AddonSpec;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Callback invoked with the patched runtime source tree right before the
/// native build runs
#[derive(Clone)]
pub struct PreBuildHook(Arc<dyn Fn(&Utf8Path) -> anyhow::Result<()> + Send + Sync>);

impl PreBuildHook {
    pub fn new(hook: impl Fn(&Utf8Path) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    /// # Errors
    ///
    /// Returns whatever the hook returns
    pub fn call(&self, source_tree: &Utf8Path) -> anyhow::Result<()> {
        (self.0)(source_tree)
    }
}

impl std::fmt::Debug for PreBuildHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PreBuildHook(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationOptions {
    /// Exact version, semver range, nightly tag, or `file:` URL of a source tarball
    pub node_version: String,
    pub source_file: Utf8PathBuf,
    pub target_file: Utf8PathBuf,
    /// Directory the runtime source gets unpacked into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmpdir: Option<Utf8PathBuf>,
    /// Scopes generated paths and identifiers, defaults to the source base name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub addons: Vec<AddonSpec>,
    #[serde(default)]
    pub configure_args: Vec<String>,
    #[serde(default)]
    pub make_args: Vec<String>,
    /// When set, build commands run with exactly this environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<IndexMap<String, String>>,
    /// Remove the cache directory after a successful build
    #[serde(default)]
    pub clean: bool,
    #[serde(default)]
    pub use_code_cache: bool,
    #[serde(default)]
    pub use_node_snapshot: bool,
    #[serde(default)]
    pub compress_blobs: bool,
    #[serde(skip)]
    pub pre_build_hook: Option<PreBuildHook>,
}

impl CompilationOptions {
    pub fn new(source_file: impl Into<Utf8PathBuf>, target_file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            node_version: "*".into(),
            source_file: source_file.into(),
            target_file: target_file.into(),
            tmpdir: None,
            namespace: None,
            addons: vec![],
            configure_args: vec![],
            make_args: vec![],
            env: None,
            clean: false,
            use_code_cache: false,
            use_node_snapshot: false,
            compress_blobs: false,
            pre_build_hook: None,
        }
    }

    #[must_use]
    pub fn with_node_version(mut self, spec: impl Into<String>) -> Self {
        self.node_version = spec.into();
        self
    }

    #[must_use]
    pub fn with_tmpdir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.tmpdir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_addon(mut self, addon: AddonSpec) -> Self {
        self.addons.push(addon);
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: IndexMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    #[must_use]
    pub fn with_pre_build_hook(mut self, hook: PreBuildHook) -> Self {
        self.pre_build_hook = Some(hook);
        self
    }

    /// Namespace for generated paths, e.g. `lib/<namespace>/<namespace>.js`
    pub fn namespace(&self) -> String {
        if let Some(ns) = &self.namespace {
            return ns.clone();
        }
        let file_name = self.source_file.file_name().unwrap_or("main.js");
        file_name
            .strip_suffix(".js")
            .unwrap_or(file_name)
            .to_string()
    }

    /// Absolute cache directory for the runtime source tree. Stable for a
    /// given namespace, so repeated builds reuse the unpacked tree.
    ///
    /// Build commands run inside the tree and addon descriptors reference it
    /// from their own directories, so a relative `tmpdir` is resolved against
    /// the current directory here.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be made absolute or is not valid UTF-8
    pub fn cache_dir(&self) -> Result<Utf8PathBuf> {
        let dir = match &self.tmpdir {
            Some(dir) => dir.clone().into_std_path_buf(),
            None => std::env::temp_dir()
                .join("boxednode")
                .join(self.namespace()),
        };
        Utf8PathBuf::try_from(std::path::absolute(dir)?).map_err(|e| {
            ConfigError::InvalidInput(format!("cache directory is not valid UTF-8: {e}"))
        })
    }

    /// Checks the inputs before any expensive work starts
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidInput`] for a non-`.js` or missing source file and
    /// for requesting code cache and snapshot support at the same time
    pub fn validate(&self) -> Result<()> {
        if self.source_file.extension() != Some("js") {
            return Err(ConfigError::InvalidInput(format!(
                "Only .js files can be compiled (got: {})",
                self.source_file
            )));
        }
        if !self.source_file.is_file() {
            return Err(ConfigError::InvalidInput(format!(
                "Source file {} does not exist",
                self.source_file
            )));
        }
        if self.use_code_cache && self.use_node_snapshot {
            return Err(ConfigError::InvalidInput(
                "code cache and snapshot support cannot be combined".into(),
            ));
        }
        Ok(())
    }

    /// Returns a copy with the process environment's extra argument lists
    /// appended after the explicitly configured ones
    ///
    /// # Errors
    ///
    /// Fails on malformed `BOXEDNODE_CONFIGURE_ARGS` / `BOXEDNODE_MAKE_ARGS`
    pub fn resolved(&self) -> Result<Self> {
        self.resolved_with(|k| std::env::var(k).ok())
    }

    /// Same as [`Self::resolved`] with an explicit variable lookup
    ///
    /// # Errors
    ///
    /// Fails on malformed argument list variables
    pub fn resolved_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut resolved = self.clone();
        resolved
            .configure_args
            .extend(env_args::arg_list_from(env_args::CONFIGURE_ARGS_VAR, &lookup)?);
        resolved
            .make_args
            .extend(env_args::arg_list_from(env_args::MAKE_ARGS_VAR, &lookup)?);
        Ok(resolved)
    }
}
