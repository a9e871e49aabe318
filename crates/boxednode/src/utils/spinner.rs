use spinoff::{Color, spinners};

use crate::utils::{
    CHECK, MARK,
    styles::{fmt_cyan, fmt_error, fmt_green, fmt_red, fmt_success},
};

/// Spinner on stderr while a step runs. Without a terminal the step is
/// logged as plain lines instead.
pub(crate) struct Spinner {
    inner: Option<spinoff::Spinner>,
}

impl Spinner {
    pub(crate) fn new(msg: &str) -> Self {
        let interactive = std::io::IsTerminal::is_terminal(&std::io::stderr())
            && log::log_enabled!(log::Level::Info);
        let inner = if interactive {
            Some(spinoff::Spinner::new_with_stream(
                spinners::Dots,
                msg.to_string(),
                Color::Cyan,
                spinoff::Streams::Stderr,
            ))
        } else {
            log::info!("{} {msg}", fmt_cyan("→"));
            None
        };
        Self { inner }
    }

    pub(crate) fn update_text(&mut self, msg: &str) {
        if let Some(spinner) = &mut self.inner {
            spinner.update_text(msg.to_string());
        }
    }

    pub(crate) fn stop_success(mut self, msg: &str) {
        match self.inner.take() {
            Some(mut spinner) => spinner.stop_and_persist(&fmt_green(CHECK), msg),
            None => log::info!("{}", fmt_success(msg)),
        }
    }

    pub(crate) fn stop_error(mut self, msg: &str) {
        match self.inner.take() {
            Some(mut spinner) => spinner.stop_and_persist(&fmt_red(MARK), msg),
            None => log::error!("{}", fmt_error(msg)),
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(mut spinner) = self.inner.take() {
            spinner.clear();
        }
    }
}
