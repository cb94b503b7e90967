//! Human-readable text output formatter

use super::OutputFormatter;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Severity};
use crate::engine::LintResult;
use colored::*;

/// Text formatter with optional color support
#[derive(Debug, Clone)]
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show the offending source line
    pub show_source: bool,

    /// Show help text and notes
    pub show_help: bool,

    /// Show statistics
    pub show_stats: bool,

    /// Show elapsed time after the statistics
    pub show_timing: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_source: true,
            show_help: false,
            show_stats: true,
            show_timing: false,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn with_help(mut self, show: bool) -> Self {
        self.show_help = show;
        self
    }

    pub fn with_timing(mut self, show: bool) -> Self {
        self.show_timing = show;
        self
    }

    fn paint(&self, text: &str, style: fn(ColoredString) -> ColoredString) -> String {
        if self.colored {
            style(text.normal()).to_string()
        } else {
            text.to_string()
        }
    }

    fn severity_str(&self, severity: Severity) -> String {
        let s = severity.to_string();
        match severity {
            Severity::Error => self.paint(&s, |c| c.red().bold()),
            Severity::Warning => self.paint(&s, |c| c.yellow().bold()),
            Severity::Info => self.paint(&s, |c| c.blue()),
        }
    }

    fn gutter(&self, mark: &str) -> String {
        self.paint(mark, |c| c.blue())
    }

    fn count(&self, n: usize, singular: &str, plural: &str) -> String {
        format!("{} {}", n, if n == 1 { singular } else { plural })
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, result: &LintResult) -> String {
        let mut output = String::new();

        // Diagnostics arrive file by file; start a group whenever the file changes
        let mut current = None;
        for diag in &result.diagnostics {
            if current != Some(&diag.location.file) {
                if current.is_some() {
                    output.push('\n');
                }
                let file = diag.location.file.display().to_string();
                output.push_str(&self.paint(&file, |c| c.underline()));
                output.push('\n');
                current = Some(&diag.location.file);
            }
            output.push_str(&self.format_diagnostic(diag));
        }

        if self.show_stats {
            if !result.diagnostics.is_empty() {
                output.push('\n');
            }
            output.push_str(&format!(
                "{} processed",
                self.count(result.files_processed, "file", "files")
            ));

            let mut counts = Vec::new();
            if result.error_count > 0 {
                let s = self.count(result.error_count, "error", "errors");
                counts.push(self.paint(&s, |c| c.red()));
            }
            if result.warning_count > 0 {
                let s = self.count(result.warning_count, "warning", "warnings");
                counts.push(self.paint(&s, |c| c.yellow()));
            }
            if result.info_count > 0 {
                let s = self.count(result.info_count, "info", "infos");
                counts.push(self.paint(&s, |c| c.blue()));
            }

            if counts.is_empty() {
                output.push_str(": no issues found");
            } else {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');

            if self.show_timing {
                output.push_str(&format!(
                    "Finished in {:.2}s\n",
                    result.duration.as_secs_f64()
                ));
            }
        }

        output
    }

    fn format_diagnostic(&self, diag: &Diagnostic) -> String {
        let mut output = String::new();

        let kind = match diag.kind {
            DiagnosticKind::Violation => String::new(),
            DiagnosticKind::Internal => " (internal)".to_string(),
            DiagnosticKind::Parse => " (unreadable)".to_string(),
        };
        output.push_str(&format!(
            "  {}:{}: {}[{}]{}: {}\n",
            diag.location.line,
            diag.location.column,
            self.severity_str(diag.severity),
            self.paint(&diag.rule_id, |c| c.cyan()),
            kind,
            diag.message
        ));

        if self.show_source {
            if let Some(source) = &diag.source_line {
                let line_num = format!("{:>6}", diag.location.line);
                output.push_str(&format!(
                    "{} {} {}\n",
                    self.paint(&line_num, |c| c.blue()),
                    self.gutter("|"),
                    source
                ));

                if diag.location.column > 0 {
                    let padding = " ".repeat(diag.location.column - 1);
                    output.push_str(&format!(
                        "       {} {}{}\n",
                        self.gutter("|"),
                        padding,
                        self.paint("^", |c| c.red())
                    ));
                }
            }
        }

        if self.show_help {
            if let Some(help) = &diag.help {
                output.push_str(&format!("       {} help: {}\n", self.gutter("="), help));
            }
            for note in &diag.notes {
                output.push_str(&format!("       {} note: {}\n", self.gutter("="), note));
            }
        }

        output
    }
}
