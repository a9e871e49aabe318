//! Turns native addon projects into static libraries linked into the
//! runtime binary.

use std::sync::LazyLock;

use boxednode_config::AddonSpec;
use camino::{Utf8Path, Utf8PathBuf};
use codegen::case::c_identifier;
use gyp::GypFile;
use log::debug;
use regex::Regex;

use crate::{
    build::{BuildCommand, BuildEnv, run_command},
    error::{BoxednodeError, Result},
    reporter::Reporter,
};

pub const LINKED_DESCRIPTOR: &str = ".boxednode.gyp";

static NODE_ADDON_API_DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"require\s*\(.+node-addon-api.+\)\s*\.\s*gyp").expect("valid dependency pattern")
});

const SHARED_RUNTIME_DEFINES: [&str; 3] = [
    "USING_UV_SHARED=1",
    "USING_V8_SHARED=1",
    "BUILDING_NODE_EXTENSION",
];

/// One addon target compiled into the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedModule {
    /// gyp dependency reference relative to the source tree
    pub target: String,
    /// Symbol the entry point calls to collect the module's registration
    pub register_function: String,
    /// Name the bootstrap shim passes to `process._linkedBinding`
    pub module_name: String,
}

pub struct AddonLinker<'a> {
    source_tree: &'a Utf8Path,
    env: &'a BuildEnv,
    reporter: &'a dyn Reporter,
}

impl<'a> AddonLinker<'a> {
    pub fn new(source_tree: &'a Utf8Path, env: &'a BuildEnv, reporter: &'a dyn Reporter) -> Self {
        Self {
            source_tree,
            env,
            reporter,
        }
    }

    /// Copies the addon into `deps/<content id>`, installs its production
    /// dependencies and writes the static library descriptor next to its
    /// `binding.gyp`
    ///
    /// # Errors
    ///
    /// [`BoxednodeError::AddonLink`] if the addon cannot be copied or has no
    /// readable descriptor, [`BoxednodeError::BuildCommandFailed`] if the
    /// dependency install fails
    pub async fn link(&self, addon: &AddonSpec) -> Result<Vec<LinkedModule>> {
        let id = addon.content_id();
        let dest = self.source_tree.join("deps").join(&id);
        let link_error = |reason: String| BoxednodeError::AddonLink {
            path: addon.path.clone(),
            reason,
        };

        self.reporter
            .step_starting(&format!("Copying addon at {}", addon.path));
        copy_dir(addon.path.clone(), dest.clone())
            .await
            .map_err(|e| link_error(format!("cannot copy to {dest}: {e}")))?;
        let mut descriptor =
            GypFile::load(dest.join("binding.gyp")).map_err(|e| link_error(e.to_string()))?;
        self.reporter.step_completed();

        self.reporter
            .step_starting(&format!("Installing dependencies of addon at {}", addon.path));
        let npm = self.npm()?;
        run_command(
            &BuildCommand::new(npm, ["install", "--ignore-scripts", "--production"]),
            &dest,
            self.env,
        )
        .await?;
        self.reporter.step_completed();

        self.reporter
            .step_starting(&format!("Preparing addon at {}", addon.path));
        let modules = into_static_library(&mut descriptor, &id)?;
        if modules.is_empty() {
            return Err(link_error("binding.gyp declares no linkable targets".into()));
        }
        prepare_for_runtime(&mut descriptor, self.source_tree)?;
        descriptor.store_as(dest.join(LINKED_DESCRIPTOR))?;
        self.reporter.step_completed();

        debug!(
            "Linked {} as {}",
            addon.path,
            modules
                .iter()
                .map(|m| m.module_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(modules)
    }

    fn npm(&self) -> Result<String> {
        let name = if cfg!(windows) { "npm.cmd" } else { "npm" };
        let cwd = std::env::current_dir()?;
        let found = match self.env.path_var() {
            Some(path) => which::which_in(name, Some(path), cwd),
            None => which::which(name),
        };
        found
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|e| BoxednodeError::InvalidInput(format!("cannot find {name}: {e}")))
    }
}

/// Rewrites every loadable target into a static library registering itself
/// under a name unique to this addon copy
///
/// # Errors
///
/// [`BoxednodeError::Descriptor`] for targets of unexpected shape
pub fn into_static_library(descriptor: &mut GypFile, id: &str) -> Result<Vec<LinkedModule>> {
    let path = descriptor.path().to_owned();
    let mut modules = vec![];
    for mut target in descriptor.targets_mut()? {
        let Some(name) = target.name().map(str::to_string) else {
            continue;
        };
        match target.target_type() {
            None | Some("loadable_module") => target.set_type("static_library"),
            Some("static_library") => {}
            Some(other) => {
                debug!("Leaving {other} target {name} as is");
                continue;
            }
        }

        let register_function = format!("boxednode_{}_register_{id}", c_identifier(&name));
        let module_name = format!("boxednode_{name}_{id}");
        for define in SHARED_RUNTIME_DEFINES {
            target.remove_from_list("defines", define)?;
            target.add_to_list("defines!", define)?;
        }
        for define in [
            "BUILDING_BOXEDNODE_EXTENSION".to_string(),
            format!("BOXEDNODE_REGISTER_FUNCTION={register_function}"),
            format!("BOXEDNODE_MODULE_NAME={module_name}"),
        ] {
            target.remove_from_list("defines!", &define)?;
            target.add_to_list("defines", &define)?;
        }
        target.set("win_delay_load_hook", "false");

        let dir = path
            .parent()
            .and_then(Utf8Path::file_name)
            .unwrap_or(id);
        modules.push(LinkedModule {
            target: format!("deps/{dir}/{LINKED_DESCRIPTOR}:{name}"),
            register_function,
            module_name,
        });
    }
    Ok(modules)
}

/// Points the descriptor at the runtime's own build settings instead of the
/// ones `node-gyp` would inject for a standalone addon
///
/// # Errors
///
/// [`BoxednodeError::Descriptor`] for descriptors of unexpected shape
pub fn prepare_for_runtime(descriptor: &mut GypFile, source_tree: &Utf8Path) -> Result<()> {
    let node_gyp_dir = source_tree.join("deps/npm/node_modules/node-gyp");
    descriptor.add_include(node_gyp_dir.join("addon.gypi").into_string())?;
    // node-addon-api is header-only, its gyp target only exists for node-gyp
    descriptor.retain_dependencies(|dep| !NODE_ADDON_API_DEPENDENCY.is_match(dep))?;
    descriptor.merge_variables([
        ("node_root_dir%", source_tree.as_str()),
        ("standalone_static_library%", "1"),
        ("node_engine%", "v8"),
        ("node_gyp_dir%", node_gyp_dir.as_str()),
        ("library%", "static_library"),
        ("visibility%", "default"),
        ("module_root_dir%", source_tree.as_str()),
        ("node_lib_file%", "kernel32.lib"),
        ("win_delay_load_hook%", "false"),
    ])?;
    Ok(())
}

async fn copy_dir(from: Utf8PathBuf, to: Utf8PathBuf) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || copy_dir_sync(&from, &to))
        .await
        .map_err(std::io::Error::other)?
}

/// Recursive copy that recreates symlinks instead of following them
fn copy_dir_sync(from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in from.read_dir_utf8()? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            copy_dir_sync(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Utf8Path, target: &Utf8Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(link)?, target)
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn copy_symlink(link: &Utf8Path, _target: &Utf8Path) -> std::io::Result<()> {
    debug!("Skipping symlink {link}");
    Ok(())
}
