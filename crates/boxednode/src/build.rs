//! Native build commands for the patched runtime source tree.

use std::{fmt, process::Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use log::debug;

use crate::{
    error::{BoxednodeError, Result},
    reporter::Reporter,
};

const DEBUG_CONFIGURE_ARGS: [&str; 2] = ["--v8-with-dchecks", "--v8-enable-object-print"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BuildCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Environment for child processes
#[derive(Debug, Clone, Default)]
pub enum BuildEnv {
    #[default]
    Inherit,
    /// Replaces the environment entirely
    Exactly(IndexMap<String, String>),
}

impl BuildEnv {
    pub fn from_override(env: Option<&IndexMap<String, String>>) -> Self {
        env.map_or(Self::Inherit, |vars| Self::Exactly(vars.clone()))
    }

    /// Variables handed to every child
    pub fn vars(&self) -> IndexMap<String, String> {
        let vars = match self {
            Self::Inherit => std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
            Self::Exactly(vars) => vars.clone(),
        };
        if cfg!(windows) {
            collapse_path_vars(vars)
        } else {
            vars
        }
    }

    /// `PATH` as children will see it
    pub fn path_var(&self) -> Option<String> {
        self.vars()
            .into_iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case("path").then_some(v))
    }
}

/// Folds `PATH`, `Path` and `path` into a single `PATH` entry, a child on
/// Windows sees an arbitrary one of them otherwise
pub fn collapse_path_vars(vars: IndexMap<String, String>) -> IndexMap<String, String> {
    let mut collapsed = IndexMap::with_capacity(vars.len());
    let mut path: Option<String> = None;
    for (key, value) in vars {
        if key.eq_ignore_ascii_case("path") {
            path = Some(match path {
                Some(existing) if !existing.is_empty() => format!("{existing};{value}"),
                _ => value,
            });
        } else {
            collapsed.insert(key, value);
        }
    }
    if let Some(path) = path {
        collapsed.insert("PATH".into(), path);
    }
    collapsed
}

/// Runs a command with inherited stdio and fails on a non-zero exit
///
/// # Errors
///
/// [`BoxednodeError::BuildCommandFailed`] on a non-zero exit,
/// [`BoxednodeError::Io`] if it cannot be spawned
pub async fn run_command(command: &BuildCommand, cwd: &Utf8Path, env: &BuildEnv) -> Result<()> {
    debug!("Running `{command}` in {cwd}");
    let mut child = tokio::process::Command::new(&command.program);
    if matches!(env, BuildEnv::Exactly(_)) || cfg!(windows) {
        child.env_clear().envs(env.vars());
    }
    let status = child
        .args(&command.args)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| {
            BoxednodeError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot run `{command}`: {e}"),
            ))
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(BoxednodeError::BuildCommandFailed {
            command: command.to_string(),
            code: status.code(),
        })
    }
}

/// Commands compiling the runtime and where the binary ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub commands: Vec<BuildCommand>,
    /// Relative to the source tree
    pub binary: Utf8PathBuf,
    /// Removed before the commands run, relative to the source tree
    pub stale_outputs: Vec<Utf8PathBuf>,
}

impl BuildPlan {
    /// Plan for the platform this runs on
    pub fn for_host(
        link_modules: &[String],
        configure_args: &[String],
        make_args: &[String],
        debug_build: bool,
    ) -> Self {
        if cfg!(windows) {
            Self::windows(link_modules, configure_args, make_args)
        } else {
            let cpus = std::thread::available_parallelism().map_or(1, usize::from);
            Self::posix(link_modules, configure_args, make_args, cpus, debug_build)
        }
    }

    pub fn posix(
        link_modules: &[String],
        configure_args: &[String],
        make_args: &[String],
        cpus: usize,
        debug_build: bool,
    ) -> Self {
        let mut configure: Vec<String> = vec![];
        if debug_build {
            configure.extend(DEBUG_CONFIGURE_ARGS.map(String::from));
        }
        configure.extend(configure_args.iter().cloned());
        configure.extend(link_modules.iter().map(|m| format!("--link-module={m}")));

        let mut make = make_args.to_vec();
        if !make.iter().any(|a| a.starts_with("-j")) {
            make.push(format!("-j{cpus}"));
        }
        // make's V= default prints every compiler invocation
        if !make.iter().any(|a| a.starts_with("V=")) {
            make.push("V=".into());
        }

        Self {
            commands: vec![
                BuildCommand::new("./configure", configure),
                BuildCommand::new("make", make),
            ],
            binary: Utf8PathBuf::from("out/Release/node"),
            stale_outputs: vec![],
        }
    }

    pub fn windows(
        link_modules: &[String],
        configure_args: &[String],
        make_args: &[String],
    ) -> Self {
        let mut args: Vec<String> = configure_args.iter().chain(make_args).cloned().collect();
        if !args.iter().any(|a| a == "debug" || a == "release") {
            args.push("release".into());
        }
        if !args.iter().any(|a| a.starts_with("vs")) {
            args.push("vs2019".into());
        }
        for module in link_modules {
            args.push("link-module".into());
            args.push(module.clone());
        }

        Self {
            commands: vec![BuildCommand::new(r".\vcbuild.bat", args)],
            binary: Utf8PathBuf::from("out/Release/node.exe"),
            stale_outputs: vec![Utf8PathBuf::from("out/Release")],
        }
    }

    /// Runs the plan in `source_tree` and returns the built binary
    ///
    /// # Errors
    ///
    /// The first failing command's error
    pub async fn execute(
        &self,
        source_tree: &Utf8Path,
        env: &BuildEnv,
        reporter: &dyn Reporter,
    ) -> Result<Utf8PathBuf> {
        for stale in &self.stale_outputs {
            let stale = source_tree.join(stale);
            match tokio::fs::remove_dir_all(&stale).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        for command in &self.commands {
            reporter.step_starting(&format!("Running {command}"));
            run_command(command, source_tree, env).await?;
            reporter.step_completed();
        }
        Ok(source_tree.join(&self.binary))
    }
}
