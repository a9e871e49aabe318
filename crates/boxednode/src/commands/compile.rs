use anyhow::Context;
use boxednode_config::{AddonSpec, CompilationOptions};
use camino::Utf8PathBuf;
use clap::Parser;
use indexmap::IndexMap;

use crate::{compile::compile_js_file_as_binary, reporter::LogReporter};

#[derive(Debug, Clone, Parser)]
pub struct CompileCmd {
    /// Source .js file
    #[arg(long, short = 's')]
    pub source: Utf8PathBuf,

    /// Target executable file
    #[arg(long, short = 't')]
    pub target: Utf8PathBuf,

    /// Node.js version, semver range, nightly version, or file: URL of a
    /// source tarball
    #[arg(long, short = 'n', default_value = "*")]
    pub node_version: String,

    /// Extra ./configure or vcbuild arguments, comma-separated
    #[arg(long, short = 'C', value_delimiter = ',', allow_hyphen_values = true)]
    pub configure_args: Vec<String>,

    /// Extra make or vcbuild arguments, comma-separated
    #[arg(long, short = 'M', value_delimiter = ',', allow_hyphen_values = true)]
    pub make_args: Vec<String>,

    /// Directory for the Node.js source tree, defaults to
    /// <system temp>/boxednode/<namespace>
    #[arg(long)]
    pub tmpdir: Option<Utf8PathBuf>,

    /// Module identifier for the generated binary, defaults to the source
    /// file name
    #[arg(long, short = 'N')]
    pub namespace: Option<String>,

    /// Remove the temporary directory after a successful build
    #[arg(long, short = 'c')]
    pub clean: bool,

    /// Embed a V8 code cache to speed up startup
    #[arg(long, short = 'H', conflicts_with = "use_node_snapshot")]
    pub use_code_cache: bool,

    /// Embed a startup snapshot of the evaluated script (Node.js 20+)
    #[arg(long, short = 'S')]
    pub use_node_snapshot: bool,

    /// Brotli-compress embedded blobs
    #[arg(long, short = 'Z')]
    pub compress_blobs: bool,

    /// Native addon to link statically, as <PATH>=<REGEX> where REGEX
    /// matches the require() ids that should load it
    #[arg(long = "addon", value_name = "PATH=REGEX")]
    pub addons: Vec<AddonSpec>,

    /// Run build commands with exactly these environment variables instead
    /// of the inherited environment
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,
}

impl CompileCmd {
    pub fn options(&self) -> CompilationOptions {
        let mut options = CompilationOptions::new(self.source.clone(), self.target.clone())
            .with_node_version(&self.node_version);
        options.tmpdir.clone_from(&self.tmpdir);
        options.namespace.clone_from(&self.namespace);
        options.addons.clone_from(&self.addons);
        options.configure_args = non_empty(&self.configure_args);
        options.make_args = non_empty(&self.make_args);
        if !self.env.is_empty() {
            options.env = Some(self.env.iter().cloned().collect::<IndexMap<_, _>>());
        }
        options.clean = self.clean;
        options.use_code_cache = self.use_code_cache;
        options.use_node_snapshot = self.use_node_snapshot;
        options.compress_blobs = self.compress_blobs;
        options
    }

    #[allow(clippy::missing_errors_doc)]
    pub async fn handle(&self) -> anyhow::Result<()> {
        let reporter = LogReporter::new();
        compile_js_file_as_binary(&self.options(), &reporter)
            .await
            .with_context(|| format!("Failed to compile {}", self.source))
    }
}

fn non_empty(args: &[String]) -> Vec<String> {
    args.iter().filter(|a| !a.is_empty()).cloned().collect()
}

fn parse_env_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        cmd: CompileCmd,
    }

    fn parse(args: &[&str]) -> CompileCmd {
        TestCli::try_parse_from(std::iter::once("boxednode").chain(args.iter().copied()))
            .unwrap()
            .cmd
    }

    #[test]
    fn test_defaults() {
        let options = parse(&["-s", "app.js", "-t", "app"]).options();
        assert_eq!(options.node_version, "*");
        assert_eq!(options.source_file, "app.js");
        assert_eq!(options.target_file, "app");
        assert!(options.configure_args.is_empty());
        assert!(options.env.is_none());
        assert!(!options.clean);
    }

    #[test]
    fn test_all_flags() {
        let options = parse(&[
            "-s", "src/app.js", "-t", "dist/app", "-n", "^18.0.0", "-C", "--openssl-no-asm,,--ninja",
            "-M", "-j4", "--tmpdir", "/tmp/build", "-N", "myapp", "-c", "-H", "-Z", "--addon",
            "./addon=addon\\.node$", "--env", "PATH=/usr/bin", "--env", "CC=clang",
        ])
        .options();

        assert_eq!(options.node_version, "^18.0.0");
        assert_eq!(options.configure_args, vec!["--openssl-no-asm", "--ninja"]);
        assert_eq!(options.make_args, vec!["-j4"]);
        assert_eq!(options.tmpdir.as_deref().map(|p| p.as_str()), Some("/tmp/build"));
        assert_eq!(options.namespace(), "myapp");
        assert!(options.clean && options.use_code_cache && options.compress_blobs);
        assert_eq!(options.addons.len(), 1);
        assert_eq!(options.addons[0].require_pattern, "addon\\.node$");

        let env = options.env.unwrap();
        assert_eq!(env.get_index(0), Some((&"PATH".to_string(), &"/usr/bin".to_string())));
        assert_eq!(env["CC"], "clang");
    }

    #[test]
    fn test_code_cache_conflicts_with_snapshot() {
        let res = TestCli::try_parse_from(["boxednode", "-s", "a.js", "-t", "a", "-H", "-S"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_env_var_parser() {
        assert_eq!(
            parse_env_var("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_env_var("=x").is_err());
        assert!(parse_env_var("novalue").is_err());
    }
}
