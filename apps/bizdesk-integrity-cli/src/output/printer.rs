//! Status-aware terminal lines for scan and repair output
//!
//! Every line carries a [`Tone`] derived from what it reports: a scan
//! status, a repair outcome, or a plain notice. Color is only emitted to a
//! terminal and never when `NO_COLOR` is set.

use bizdesk_integrity::{ActionOutcome, ScanStatus};

/// How a line should read to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Good,
    Caution,
    Bad,
    Notice,
}

impl Tone {
    fn ansi(self) -> &'static str {
        match self {
            Tone::Good => "32",
            Tone::Caution => "33",
            Tone::Bad => "31",
            Tone::Notice => "34",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Tone::Good => "ok",
            Tone::Caution => "warn",
            Tone::Bad => "error",
            Tone::Notice => "info",
        }
    }
}

impl From<ScanStatus> for Tone {
    fn from(status: ScanStatus) -> Self {
        match status {
            ScanStatus::Completed => Tone::Good,
            ScanStatus::Partial => Tone::Caution,
            ScanStatus::TimedOut => Tone::Bad,
        }
    }
}

impl From<ActionOutcome> for Tone {
    fn from(outcome: ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Succeeded => Tone::Good,
            ActionOutcome::AlreadyAbsent => Tone::Notice,
            ActionOutcome::Failed => Tone::Bad,
        }
    }
}

fn color_enabled(stream: atty::Stream) -> bool {
    std::env::var_os("NO_COLOR").is_none() && atty::is(stream)
}

/// Wrap `text` in the tone's color.
pub fn paint(text: &str, tone: Tone, color: bool) -> String {
    if color {
        format!("\x1b[{}m{text}\x1b[0m", tone.ansi())
    } else {
        text.to_string()
    }
}

/// Upper-case label in brackets, e.g. `[TIMED OUT]`.
fn badge(label: &str, tone: Tone, color: bool) -> String {
    let label = label.replace('_', " ").to_uppercase();
    paint(&format!("[{label}]"), tone, color)
}

/// Badge for a scan status.
pub fn status_badge(status: ScanStatus, color: bool) -> String {
    badge(&status.to_string(), status.into(), color)
}

/// Upper-case tag for a repair outcome, e.g. `FAILED`.
pub fn outcome_tag(outcome: ActionOutcome, color: bool) -> String {
    let label = outcome.to_string().replace('_', " ").to_uppercase();
    paint(&label, outcome.into(), color)
}

/// `{marker} {message}`, the marker padded so messages line up.
fn line(tone: Tone, message: &str, color: bool) -> String {
    let marker = format!("{:<5}", tone.marker());
    format!("{} {message}", paint(&marker, tone, color))
}

pub fn print_success(message: &str) {
    println!("{}", line(Tone::Good, message, color_enabled(atty::Stream::Stdout)));
}

/// Warnings go to stderr so JSON on stdout stays clean.
pub fn print_warning(message: &str) {
    eprintln!("{}", line(Tone::Caution, message, color_enabled(atty::Stream::Stderr)));
}

pub fn print_info(message: &str) {
    println!("{}", line(Tone::Notice, message, color_enabled(atty::Stream::Stdout)));
}

/// Title with an underline of the same width.
pub fn print_section(title: &str) {
    println!();
    println!("{title}");
    println!("{}", "-".repeat(title.chars().count()));
}

/// Indented `key: value` with keys aligned.
pub fn print_field(key: &str, value: &str) {
    println!("  {:<16}{value}", format!("{key}:"));
}

/// Status field rendered as a badge.
pub fn print_status(status: ScanStatus) {
    print_field(
        "Status",
        &status_badge(status, color_enabled(atty::Stream::Stdout)),
    );
}
