use std::io::Write;

use log::{Level, LevelFilter};

/// Level for this crate's own log lines
fn crate_level(quiet: bool, verbose: u8) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::Error,
        (false, 0) => Level::Info,
        (false, 1) => Level::Debug,
        _ => Level::Trace,
    }
}

/// `-q` keeps errors only, `-v` adds debug output of the pipeline, `-vv`
/// traces every crate including the HTTP client. Step lines at info level
/// print bare, anything else gets a colored level tag.
pub fn init_logger(quiet: bool, verbose: u8) {
    let level = crate_level(quiet, verbose);
    let mut builder = env_logger::builder();

    if level == Level::Trace {
        builder.filter_level(LevelFilter::Trace);
    } else {
        builder.filter_module("boxednode", level.to_level_filter());
    }
    builder.format(|buf, record| {
        if record.level() == Level::Info {
            writeln!(buf, "{}", record.args())
        } else {
            let style = buf.default_level_style(record.level());
            writeln!(buf, "{style}[{}]{style:#} {}", record.level(), record.args())
        }
    });

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_level() {
        assert_eq!(crate_level(false, 0), Level::Info);
        assert_eq!(crate_level(false, 1), Level::Debug);
        assert_eq!(crate_level(false, 5), Level::Trace);
        assert_eq!(crate_level(true, 2), Level::Error);
    }
}
