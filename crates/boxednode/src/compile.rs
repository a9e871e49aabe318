//! The compile pipeline: from a `.js` file and [`CompilationOptions`] to a
//! standalone executable.

use async_trait::async_trait;
use boxednode_config::{CompilationOptions, PreBuildHook, env_args::debug_build_requested};
use camino::{Utf8Path, Utf8PathBuf};
use codegen::{
    EntryPoint, Shim,
    headers::{PATCHES, patch_header},
};
use gyp::GypFile;
use log::{debug, info};
use url::Url;

use crate::{
    addons::AddonLinker,
    blobs::{Artifact, BuildDriver, Stage, build_with_artifact},
    build::{BuildCommand, BuildEnv, BuildPlan, run_command},
    error::{BoxednodeError, Result},
    release::{Resolver, ResolvedRelease},
    reporter::Reporter,
    source::SourceAcquirer,
};

/// Compiles `options.source_file` into `options.target_file`. The target is
/// only written once every step succeeded.
///
/// # Errors
///
/// The failing step's error, after it has been passed to
/// [`Reporter::step_failed`]
pub async fn compile_js_file_as_binary(
    options: &CompilationOptions,
    reporter: &dyn Reporter,
) -> Result<()> {
    Compiler::new(reporter).compile(options).await
}

/// Pipeline with adjustable network settings
pub struct Compiler<'a> {
    reporter: &'a dyn Reporter,
    client: reqwest::Client,
    dist_url: Option<Url>,
    retries: Option<u32>,
}

impl<'a> Compiler<'a> {
    pub fn new(reporter: &'a dyn Reporter) -> Self {
        Self {
            reporter,
            client: reqwest::Client::new(),
            dist_url: None,
            retries: None,
        }
    }

    /// Mirror to resolve and download releases from
    #[must_use]
    pub fn with_dist_url(mut self, url: Url) -> Self {
        self.dist_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// # Errors
    ///
    /// See [`compile_js_file_as_binary`]
    pub async fn compile(&self, options: &CompilationOptions) -> Result<()> {
        let result = self.run(options).await;
        if let Err(e) = &result {
            self.reporter.step_failed(e);
        }
        result
    }

    async fn run(&self, options: &CompilationOptions) -> Result<()> {
        let options = options.resolved()?;
        options.validate()?;
        let artifact = Artifact::requested(options.use_code_cache, options.use_node_snapshot)?;
        let namespace = options.namespace();
        let cache_dir = options.cache_dir()?;
        let env = BuildEnv::from_override(options.env.as_ref());

        let source_tree = self.acquire_source(&options.node_version, &cache_dir).await?;
        debug!("Using runtime source tree at {source_tree}");

        let mut shim = Shim::new();
        let mut gyp_dependencies = vec![];
        let mut register_functions = vec![];
        let linker = AddonLinker::new(&source_tree, &env, self.reporter);
        for addon in &options.addons {
            for module in linker.link(addon).await? {
                shim.add_mapping(&addon.require_pattern, &addon.require_flags, &module.module_name);
                gyp_dependencies.push(module.target);
                register_functions.push(module.register_function);
            }
        }

        self.reporter.step_starting("Finalizing linked addons processing");
        link_into_runtime(&source_tree, gyp_dependencies).await?;
        self.reporter.step_completed();

        self.reporter
            .step_starting("Inserting custom code into Node.js source");
        let shim_path = source_tree
            .join("lib")
            .join(&namespace)
            .join(format!("{namespace}.js"));
        write_creating_parents(&shim_path, shim.render()?.as_bytes()).await?;
        let main_script = tokio::fs::read_to_string(&options.source_file).await?;
        self.reporter.step_completed();

        let debug_build = debug_build_requested(|var| std::env::var(var).ok());
        let plan = BuildPlan::for_host(
            &[format!("./lib/{namespace}/{namespace}.js")],
            &options.configure_args,
            &options.make_args,
            debug_build,
        );
        let mut driver = NativeDriver {
            source_tree: &source_tree,
            entry_point: EntryPoint::new(&namespace, main_script)
                .with_register_functions(register_functions)
                .with_compressed_blobs(options.compress_blobs),
            plan,
            env: &env,
            pre_build_hook: options.pre_build_hook.as_ref(),
            reporter: self.reporter,
        };
        let binary = build_with_artifact(artifact, &source_tree, &mut driver, self.reporter).await?;

        self.reporter
            .step_starting(&format!("Moving resulting binary to {}", options.target_file));
        if let Some(parent) = options.target_file.parent().filter(|p| !p.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&binary, &options.target_file).await?;
        self.reporter.step_completed();

        if options.clean {
            self.reporter
                .step_starting(&format!("Cleaning temporary directory {cache_dir}"));
            tokio::fs::remove_dir_all(&cache_dir).await?;
            self.reporter.step_completed();
        }

        info!("Compiled {} into {}", options.source_file, options.target_file);
        Ok(())
    }

    async fn acquire_source(
        &self,
        node_version: &str,
        cache_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        self.reporter
            .step_starting(&format!("Looking for Node.js version matching {node_version:?}"));
        let mut resolver = Resolver::new(self.client.clone());
        if let Some(url) = &self.dist_url {
            resolver = resolver.with_dist_url(url.clone());
        }
        let release: ResolvedRelease = resolver.resolve(node_version).await?;
        self.reporter.step_completed();
        info!("Using Node.js {}", release.version);

        let mut acquirer = SourceAcquirer::new(self.client.clone(), self.reporter);
        if let Some(retries) = self.retries {
            acquirer = acquirer.with_retries(retries);
        }
        acquirer.acquire(&release, cache_dir).await
    }
}

/// Adds the linked addon targets to `node.gypi` and the static registration
/// overrides to the public headers
async fn link_into_runtime(source_tree: &Utf8Path, gyp_dependencies: Vec<String>) -> Result<()> {
    if !gyp_dependencies.is_empty() {
        let mut node_gypi = GypFile::load(source_tree.join("node.gypi"))?;
        if node_gypi.append_dependencies(gyp_dependencies)? > 0 {
            node_gypi.store()?;
        }
    }

    for (header, addition) in PATCHES {
        let path = source_tree.join("src").join(header);
        let contents = tokio::fs::read_to_string(&path).await?;
        if let Some(patched) = patch_header(&contents, addition) {
            tokio::fs::write(&path, patched).await?;
        }
    }
    Ok(())
}

async fn write_creating_parents(path: &Utf8Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Builds the patched source tree with the host toolchain
struct NativeDriver<'a> {
    source_tree: &'a Utf8Path,
    entry_point: EntryPoint,
    plan: BuildPlan,
    env: &'a BuildEnv,
    pre_build_hook: Option<&'a PreBuildHook>,
    reporter: &'a dyn Reporter,
}

#[async_trait]
impl BuildDriver for NativeDriver<'_> {
    async fn build(&mut self, stage: &Stage) -> Result<Utf8PathBuf> {
        self.reporter.step_starting("Writing entry point");
        let entry_point = self
            .entry_point
            .clone()
            .with_code_cache(stage.code_cache_mode, stage.code_cache.clone())
            .with_snapshot(stage.snapshot_mode, stage.snapshot.clone());
        write_creating_parents(
            &self.source_tree.join("src").join("node_main.cc"),
            entry_point.render()?.as_bytes(),
        )
        .await?;
        self.reporter.step_completed();

        if let Some(hook) = self.pre_build_hook {
            self.reporter.step_starting("Running pre-build hook");
            hook.call(self.source_tree)
                .map_err(BoxednodeError::PreBuildHook)?;
            self.reporter.step_completed();
        }

        self.plan
            .execute(self.source_tree, self.env, self.reporter)
            .await
    }

    async fn run_generator(&mut self, binary: &Utf8Path, work_dir: &Utf8Path) -> Result<()> {
        let command = BuildCommand::new(binary.as_str(), Vec::<String>::new());
        run_command(&command, work_dir, self.env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_into_runtime_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tree = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(tree.join("src")).unwrap();
        std::fs::write(tree.join("src/node.h"), "// node.h\n").unwrap();
        std::fs::write(tree.join("src/node_api.h"), "// node_api.h\n").unwrap();
        std::fs::write(
            tree.join("node.gypi"),
            "{ 'variables': { 'node_shared': 'false' } }",
        )
        .unwrap();

        let deps = vec!["deps/abc/.boxednode.gyp:weak".to_string()];
        link_into_runtime(tree, deps.clone()).await.unwrap();
        link_into_runtime(tree, deps).await.unwrap();

        let gypi = GypFile::load(tree.join("node.gypi")).unwrap();
        assert_eq!(
            gypi.root()["dependencies"],
            serde_json::json!(["deps/abc/.boxednode.gyp:weak"])
        );
        let header = std::fs::read_to_string(tree.join("src/node.h")).unwrap();
        assert_eq!(header.matches("BOXEDNODE_REGISTER_FUNCTION").count(),
            codegen::headers::NODE_H.matches("BOXEDNODE_REGISTER_FUNCTION").count());
    }

    #[tokio::test]
    async fn test_without_addons_node_gypi_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let tree = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(tree.join("src")).unwrap();
        std::fs::write(tree.join("src/node.h"), "").unwrap();
        std::fs::write(tree.join("src/node_api.h"), "").unwrap();
        let gypi = "{ 'variables': {} } # comment";
        std::fs::write(tree.join("node.gypi"), gypi).unwrap();

        link_into_runtime(tree, vec![]).await.unwrap();
        assert_eq!(std::fs::read_to_string(tree.join("node.gypi")).unwrap(), gypi);
    }
}
