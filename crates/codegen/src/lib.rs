pub mod blob;
pub mod case;
pub mod entry_point;
pub mod format;
pub mod headers;
pub mod shim;

use thiserror::Error;

pub use entry_point::{EntryPoint, INTERMEDIATE_FILE};
pub use shim::{RequireMapping, Shim};

pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),
}

/// How the produced binary treats an ahead-of-time artifact (code cache or
/// heap snapshot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlobMode {
    #[default]
    Ignore,
    /// Write the artifact to [`INTERMEDIATE_FILE`] instead of running normally
    Generate,
    /// Use the artifact embedded in the binary
    Consume,
}

impl BlobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BlobMode::Ignore => "ignore",
            BlobMode::Generate => "generate",
            BlobMode::Consume => "consume",
        }
    }
}

impl std::fmt::Display for BlobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
