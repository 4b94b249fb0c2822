//! Terminal output helpers
//!
//! `--quiet` (or `CONVSLICE_QUIET=1`) silences result listings on stdout and
//! spinners. Spinners are also skipped when stderr is not a TTY.

use std::io::IsTerminal;
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

static QUIET_MODE: OnceLock<bool> = OnceLock::new();

pub fn init_quiet_mode(quiet_flag: bool) {
    let is_quiet = quiet_flag
        || std::env::var("CONVSLICE_QUIET")
            .map(|v| v == "1")
            .unwrap_or(false);
    QUIET_MODE.set(is_quiet).ok();
}

pub fn is_quiet() -> bool {
    *QUIET_MODE.get().unwrap_or(&false)
}

/// Print a result line to stdout unless quiet.
pub fn say(line: impl AsRef<str>) {
    if !is_quiet() {
        println!("{}", line.as_ref());
    }
}

/// Spinner on stderr, or `None` when quiet or not attached to a terminal.
pub fn spinner(msg: impl Into<String>) -> Option<ProgressBar> {
    if is_quiet() || !std::io::stderr().is_terminal() {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

fn finish(pb: Option<ProgressBar>, msg: String) {
    if let Some(pb) = pb {
        if let Ok(style) = ProgressStyle::default_spinner().template("{msg}") {
            pb.set_style(style);
        }
        pb.finish_with_message(msg);
    }
}

pub fn finish_success(pb: Option<ProgressBar>, msg: impl Into<String>) {
    finish(pb, format!("✓ {}", msg.into()));
}

pub fn finish_error(pb: Option<ProgressBar>, msg: impl Into<String>) {
    finish(pb, format!("✗ {}", msg.into()));
}

/// Run `f` under a spinner that resolves to a check or a cross.
pub fn with_spinner<T, E: std::fmt::Display>(
    msg: impl Into<String>,
    success_msg: impl FnOnce(&T) -> String,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let pb = spinner(msg);
    match f() {
        Ok(value) => {
            finish_success(pb, success_msg(&value));
            Ok(value)
        }
        Err(err) => {
            finish_error(pb, err.to_string());
            Err(err)
        }
    }
}
