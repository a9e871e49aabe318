//! Two-phase builds for ahead-of-time artifacts.
//!
//! The first build produces a binary that writes the artifact (a code cache
//! or a heap snapshot) to [`INTERMEDIATE_FILE`]; the second build embeds it.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use codegen::{BlobMode, INTERMEDIATE_FILE};
use log::debug;

use crate::{
    error::{BoxednodeError, Result},
    reporter::Reporter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    CodeCache,
    Snapshot,
}

impl Artifact {
    /// # Errors
    ///
    /// [`BoxednodeError::InvalidInput`] when both are requested
    pub fn requested(use_code_cache: bool, use_node_snapshot: bool) -> Result<Option<Self>> {
        match (use_code_cache, use_node_snapshot) {
            (true, true) => Err(BoxednodeError::InvalidInput(
                "code cache and snapshot support cannot be combined".into(),
            )),
            (true, false) => Ok(Some(Self::CodeCache)),
            (false, true) => Ok(Some(Self::Snapshot)),
            (false, false) => Ok(None),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::CodeCache => "code cache",
            Self::Snapshot => "snapshot",
        }
    }
}

/// What a single native build embeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    pub code_cache_mode: BlobMode,
    pub code_cache: Vec<u8>,
    pub snapshot_mode: BlobMode,
    pub snapshot: Vec<u8>,
}

impl Stage {
    pub fn generate(artifact: Artifact) -> Self {
        match artifact {
            Artifact::CodeCache => Self {
                code_cache_mode: BlobMode::Generate,
                ..Self::default()
            },
            Artifact::Snapshot => Self {
                snapshot_mode: BlobMode::Generate,
                ..Self::default()
            },
        }
    }

    pub fn consume(artifact: Artifact, data: Vec<u8>) -> Self {
        match artifact {
            Artifact::CodeCache => Self {
                code_cache_mode: BlobMode::Consume,
                code_cache: data,
                ..Self::default()
            },
            Artifact::Snapshot => Self {
                snapshot_mode: BlobMode::Consume,
                snapshot: data,
                ..Self::default()
            },
        }
    }
}

#[async_trait]
pub trait BuildDriver: Send {
    /// Renders the entry point for `stage`, builds, and returns the binary
    async fn build(&mut self, stage: &Stage) -> Result<Utf8PathBuf>;

    /// Runs a generating binary with `work_dir` as its working directory
    async fn run_generator(&mut self, binary: &Utf8Path, work_dir: &Utf8Path) -> Result<()>;
}

/// Builds once, or twice when an artifact is requested, and returns the
/// final binary
///
/// # Errors
///
/// [`BoxednodeError::EmptyArtifact`] if the generating run leaves no
/// artifact behind, otherwise whatever the driver fails with
pub async fn build_with_artifact<D: BuildDriver + ?Sized>(
    artifact: Option<Artifact>,
    work_dir: &Utf8Path,
    driver: &mut D,
    reporter: &dyn Reporter,
) -> Result<Utf8PathBuf> {
    let Some(artifact) = artifact else {
        return driver.build(&Stage::default()).await;
    };

    let generator = driver.build(&Stage::generate(artifact)).await?;

    let intermediate = work_dir.join(INTERMEDIATE_FILE);
    match tokio::fs::remove_file(&intermediate).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }

    reporter.step_starting(&format!("Running {generator} to generate {}", artifact.describe()));
    driver.run_generator(&generator, work_dir).await?;
    let data = match tokio::fs::read(&intermediate).await {
        Ok(data) if !data.is_empty() => data,
        Ok(_) => return Err(BoxednodeError::EmptyArtifact { path: intermediate }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BoxednodeError::EmptyArtifact { path: intermediate });
        }
        Err(e) => return Err(e.into()),
    };
    debug!("Generated {} bytes of {}", data.len(), artifact.describe());
    reporter.step_completed();

    driver.build(&Stage::consume(artifact, data)).await
}
