//! Compact output formatter
//!
//! One line per diagnostic, minimal output for scripting.

use super::OutputFormatter;
use crate::diagnostic::Diagnostic;
use crate::engine::LintResult;

/// `file:line:col: severity [rule] message`
#[derive(Debug, Clone, Default)]
pub struct CompactFormatter {
    /// Leave out the rule id
    pub hide_rule: bool,
}

impl CompactFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_rule(mut self) -> Self {
        self.hide_rule = true;
        self
    }
}

impl OutputFormatter for CompactFormatter {
    fn format(&self, result: &LintResult) -> String {
        let mut output = String::new();

        for diag in &result.diagnostics {
            output.push_str(&self.format_diagnostic(diag));
            output.push('\n');
        }

        output
    }

    fn format_diagnostic(&self, diagnostic: &Diagnostic) -> String {
        let location = format!(
            "{}:{}:{}",
            diagnostic.location.file.display(),
            diagnostic.location.line,
            diagnostic.location.column
        );

        if self.hide_rule {
            format!("{}: {} {}", location, diagnostic.severity, diagnostic.message)
        } else {
            format!(
                "{}: {} [{}] {}",
                location, diagnostic.severity, diagnostic.rule_id, diagnostic.message
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Location, Severity};
    use std::path::PathBuf;

    fn diag(rule: &str, severity: Severity, line: usize) -> Diagnostic {
        Diagnostic::new(
            rule,
            severity,
            "Discourage the declaration of multiple proxy endpoints in a same proxy.",
            Location::new(PathBuf::from("apiproxy/myAPI.xml"), line, 5),
        )
    }

    #[test]
    fn test_compact_format() {
        let output = CompactFormatter::new().format_diagnostic(&diag(
            "too-many-proxy-endpoints",
            Severity::Warning,
            3,
        ));
        assert_eq!(
            output,
            "apiproxy/myAPI.xml:3:5: warning [too-many-proxy-endpoints] Discourage the declaration of multiple proxy endpoints in a same proxy."
        );
    }

    #[test]
    fn test_compact_without_rule() {
        let output = CompactFormatter::new()
            .without_rule()
            .format_diagnostic(&diag("r", Severity::Error, 1));
        assert!(output.starts_with("apiproxy/myAPI.xml:1:5: error Discourage"));
    }

    #[test]
    fn test_compact_result() {
        let result = LintResult {
            diagnostics: vec![
                diag("r1", Severity::Error, 1),
                diag("r2", Severity::Warning, 2),
            ],
            files_processed: 1,
            error_count: 1,
            warning_count: 1,
            ..Default::default()
        };

        let output = CompactFormatter::new().format(&result);
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("[r2]"));
    }

    #[test]
    fn test_compact_empty() {
        assert_eq!(CompactFormatter::new().format(&LintResult::default()), "");
    }
}
