//! Progress reporting for the compile pipeline.
//!
//! The pipeline announces each step with [`Reporter::step_starting`]; the
//! step stays open until it is completed, fails, or the next one starts.

use std::sync::Mutex;

use log::{debug, error, info};

use crate::utils::{
    spinner::Spinner,
    styles::{fmt_dimmed, fmt_error, fmt_success},
};

pub trait Reporter: Send + Sync {
    fn step_starting(&self, info: &str);
    fn step_completed(&self);
    fn step_failed(&self, err: &dyn std::error::Error);

    /// Announces a byte count for the running step, called at most once per
    /// download
    fn start_progress(&self, _total: u64) {}
    fn do_progress(&self, _current: u64) {}
}

#[derive(Default)]
struct OpenStep {
    name: Option<String>,
    spinner: Option<Spinner>,
    total: u64,
}

/// Reporter printing steps through `log`, with a spinner while a step is
/// running
#[derive(Default)]
pub struct LogReporter {
    current: Mutex<OpenStep>,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_step<R>(&self, f: impl FnOnce(&mut OpenStep) -> R) -> R {
        let mut step = match self.current.lock() {
            Ok(step) => step,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut step)
    }
}

impl Reporter for LogReporter {
    fn step_starting(&self, info: &str) {
        self.with_step(|step| {
            if let Some(name) = step.name.take() {
                finish(step, &name);
            }
            debug!("step: {info}");
            step.name = Some(info.to_string());
            step.spinner = Some(Spinner::new(info));
            step.total = 0;
        });
    }

    fn step_completed(&self) {
        self.with_step(|step| {
            if let Some(name) = step.name.take() {
                finish(step, &name);
            }
        });
    }

    fn step_failed(&self, err: &dyn std::error::Error) {
        self.with_step(|step| {
            let msg = match step.name.take() {
                Some(name) => format!("Failed: {name}: {err}"),
                None => format!("Failed: {err}"),
            };
            match step.spinner.take() {
                Some(spinner) => spinner.stop_error(&msg),
                None => error!("{}", fmt_error(&msg)),
            }
        });
    }

    fn start_progress(&self, total: u64) {
        self.with_step(|step| step.total = total);
    }

    fn do_progress(&self, current: u64) {
        self.with_step(|step| {
            let (Some(name), Some(spinner)) = (&step.name, &mut step.spinner) else {
                return;
            };
            if step.total > 0 {
                let percent = current.saturating_mul(100) / step.total;
                spinner.update_text(&format!(
                    "{name} {}",
                    fmt_dimmed(&format!("{percent}% ({} MB)", current / 1_000_000))
                ));
            }
        });
    }
}

fn finish(step: &mut OpenStep, name: &str) {
    let msg = format!("Completed: {name}");
    match step.spinner.take() {
        Some(spinner) => spinner.stop_success(&msg),
        None => info!("{}", fmt_success(&msg)),
    }
}

/// Discards everything, for library callers that do their own reporting
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn step_starting(&self, _info: &str) {}
    fn step_completed(&self) {}
    fn step_failed(&self, _err: &dyn std::error::Error) {}
}
