//! Output formatters for lint results

mod compact;
mod json;
mod text;

pub use compact::CompactFormatter;
pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::config::OutputFormat;
use crate::diagnostic::Diagnostic;
use crate::engine::LintResult;

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format the entire lint result
    fn format(&self, result: &LintResult) -> String;

    /// Format a single diagnostic
    fn format_diagnostic(&self, diagnostic: &Diagnostic) -> String;
}

/// Formatter for `format`. `colored` only affects text output; `verbose`
/// adds help and notes to text output and pretty-prints JSON.
pub fn formatter_for(format: OutputFormat, colored: bool, verbose: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => {
            let mut formatter = TextFormatter::new().with_help(verbose).with_timing(verbose);
            if !colored {
                formatter = formatter.without_color();
            }
            Box::new(formatter)
        }
        OutputFormat::Json => {
            if verbose {
                Box::new(JsonFormatter::new().pretty())
            } else {
                Box::new(JsonFormatter::new())
            }
        }
        OutputFormat::Compact => Box::new(CompactFormatter::new()),
    }
}
