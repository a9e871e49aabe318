use anstyle::{AnsiColor, Color, Style};
use clap::builder::Styles;

use crate::utils::{CHECK, MARK};

const HEADING: Style = ansi(AnsiColor::Blue).bold().underline();
const FAILURE: Style = ansi(AnsiColor::Red).bold();

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(HEADING)
        .header(HEADING)
        .literal(ansi(AnsiColor::Green))
        .invalid(FAILURE)
        .error(FAILURE)
        .placeholder(ansi(AnsiColor::White))
}

const fn ansi(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

fn paint(msg: &str, style: Style) -> String {
    format!("{style}{msg}{style:#}")
}

pub(crate) fn fmt_green(msg: &str) -> String {
    paint(msg, ansi(AnsiColor::Green))
}

pub(crate) fn fmt_cyan(msg: &str) -> String {
    paint(msg, ansi(AnsiColor::BrightCyan))
}

pub(crate) fn fmt_red(msg: &str) -> String {
    paint(msg, ansi(AnsiColor::Red))
}

pub(crate) fn fmt_dimmed(msg: &str) -> String {
    paint(msg, Style::new().dimmed())
}

pub(crate) fn fmt_success(msg: &str) -> String {
    format!("{} {msg}", fmt_green(CHECK))
}

pub(crate) fn fmt_error(msg: &str) -> String {
    format!("{} {msg}", fmt_red(MARK))
}
