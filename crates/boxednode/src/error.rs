use boxednode_config::ConfigError;
use camino::Utf8PathBuf;
use codegen::CodegenError;
use gyp::DescriptorError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoxednodeError>;

#[derive(Debug, Error)]
pub enum BoxednodeError {
    #[error("No Node.js version matching {spec:?}: {reason}")]
    NoMatchingVersion { spec: String, reason: String },

    #[error("Failed to fetch {url}: {reason}")]
    SourceFetch { url: String, reason: String },

    #[error("SHA256 mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: Utf8PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Malformed archive {path}: {reason}")]
    MalformedArchive { path: String, reason: String },

    #[error("{0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Cannot link addon at {path}: {reason}")]
    AddonLink { path: Utf8PathBuf, reason: String },

    #[error("Command `{command}` failed ({})", exit_description(.code))]
    BuildCommandFailed { command: String, code: Option<i32> },

    #[error("{path} is missing or empty after running the generating build")]
    EmptyArtifact { path: Utf8PathBuf },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pre-build hook failed: {0:#}")]
    PreBuildHook(anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Code generation failed: {0}")]
    Codegen(#[from] CodegenError),
}

impl BoxednodeError {
    /// Failures worth another download attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceFetch { .. }
                | Self::IntegrityMismatch { .. }
                | Self::MalformedArchive { .. }
                | Self::Io(_)
        )
    }
}

impl From<ConfigError> for BoxednodeError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidInput(msg) => Self::InvalidInput(msg),
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}

#[allow(clippy::ref_option)]
fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failure_message() {
        let err = BoxednodeError::BuildCommandFailed {
            command: "make -j4".into(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "Command `make -j4` failed (exit code 2)");

        let err = BoxednodeError::BuildCommandFailed {
            command: "./configure".into(),
            code: None,
        };
        assert_eq!(
            err.to_string(),
            "Command `./configure` failed (terminated by signal)"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(
            BoxednodeError::SourceFetch {
                url: "https://nodejs.org".into(),
                reason: "timeout".into()
            }
            .is_retryable()
        );
        assert!(!BoxednodeError::InvalidInput("nope".into()).is_retryable());
        assert!(
            !BoxednodeError::EmptyArtifact {
                path: "intermediate.out".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_config_errors_map_to_invalid_input() {
        let err: BoxednodeError = ConfigError::InvalidInput("bad".into()).into();
        assert!(matches!(err, BoxednodeError::InvalidInput(msg) if msg == "bad"));
    }
}
