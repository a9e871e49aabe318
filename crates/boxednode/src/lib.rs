pub mod addons;
pub mod blobs;
pub mod build;
pub mod commands;
pub mod compile;
pub mod error;
pub mod release;
pub mod reporter;
pub mod source;
pub mod utils;

use clap::Parser;

use crate::commands::compile::CompileCmd;

pub use boxednode_config::{AddonSpec, CompilationOptions, PreBuildHook};
pub use compile::{Compiler, compile_js_file_as_binary};
pub use error::{BoxednodeError, Result};
pub use reporter::{LogReporter, Reporter, SilentReporter};

#[derive(Parser)]
#[command(name = "boxednode")]
#[command(version)]
#[command(about = "Create a standalone Node.js executable from a JavaScript file")]
#[command(
    long_about = "boxednode downloads the Node.js source for the requested version, links the given \
native addons statically, embeds the script and builds a single executable that runs it."
)]
#[command(after_help = "EXAMPLES:\n  \
    boxednode -s myProject.js -t myProject -n ^18.0.0\n  \
    boxednode -s app.js -t dist/app --addon ./node_modules/weak-napi='weak-napi'\n  \
    boxednode -s app.js -t app -H -Z --clean\n\
")]
#[command(styles=utils::styles::get_styles())]
pub struct Cli {
    #[command(flatten)]
    pub compile: CompileCmd,

    /// No logging except for errors
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Verbose logging (-v) or trace logging (-vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    #[allow(clippy::missing_errors_doc)]
    pub async fn handle(&self) -> anyhow::Result<()> {
        self.compile.handle().await
    }
}
