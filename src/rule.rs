//! Rule metadata

use crate::diagnostic::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule category for grouping related rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    /// Configuration that is definitely wrong
    Correctness,
    /// Configuration that is likely wrong or fragile
    Suspicious,
    /// Naming and consistency
    #[default]
    Style,
    /// Runtime performance of the deployed proxy
    Perf,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Correctness => write!(f, "correctness"),
            RuleCategory::Suspicious => write!(f, "suspicious"),
            RuleCategory::Style => write!(f, "style"),
            RuleCategory::Perf => write!(f, "perf"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "correctness" => Ok(RuleCategory::Correctness),
            "suspicious" => Ok(RuleCategory::Suspicious),
            "style" => Ok(RuleCategory::Style),
            "perf" | "performance" => Ok(RuleCategory::Perf),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Static description of a lint rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule identifier (e.g., "policy-name-convention")
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Detailed description
    #[serde(default)]
    pub description: Option<String>,

    /// Default severity level
    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub category: RuleCategory,

    /// Root elements of the documents this rule inspects
    #[serde(default)]
    pub targets: Vec<String>,

    /// Whether the rule needs the whole bundle
    #[serde(default)]
    pub cross_file: bool,

    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,

    /// Whether this rule is enabled by default
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rationale explaining why this rule exists
    #[serde(default)]
    pub rationale: Option<String>,

    /// Example of configuration that violates this rule
    #[serde(default)]
    pub example_bad: Option<String>,

    /// Example of correct configuration
    #[serde(default)]
    pub example_good: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Create a new rule with minimal required fields
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
            description: None,
            severity: Severity::Warning,
            category: RuleCategory::default(),
            targets: Vec::new(),
            cross_file: false,
            tags: Vec::new(),
            enabled: true,
            rationale: None,
            example_bad: None,
            example_good: None,
        }
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the rule category
    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the description
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Add a root element this rule applies to
    pub fn with_target(mut self, root: &str) -> Self {
        self.targets.push(root.to_string());
        self
    }

    pub fn cross_file(mut self) -> Self {
        self.cross_file = true;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = Some(rationale.to_string());
        self
    }

    pub fn with_example_bad(mut self, example: &str) -> Self {
        self.example_bad = Some(example.to_string());
        self
    }

    pub fn with_example_good(mut self, example: &str) -> Self {
        self.example_good = Some(example.to_string());
        self
    }

    /// Check if rule matches the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether a document with this root element is in scope
    pub fn applies_to(&self, root: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == root)
    }

    /// Long-form documentation for `--explain`
    pub fn explain(&self) -> String {
        let mut out = self.id.clone();
        if let Some(name) = &self.name {
            out.push_str(&format!(" ({})", name));
        }
        out.push('\n');
        out.push_str(&format!(
            "  severity: {}, category: {}{}\n",
            self.severity,
            self.category,
            if self.cross_file { ", cross-file" } else { "" }
        ));
        if !self.targets.is_empty() {
            out.push_str(&format!("  applies to: {}\n", self.targets.join(", ")));
        }
        if let Some(desc) = &self.description {
            out.push_str(&format!("\n{}\n", desc));
        }
        if let Some(rationale) = &self.rationale {
            out.push_str(&format!("\nWhy: {}\n", rationale));
        }
        if let Some(bad) = &self.example_bad {
            out.push_str(&format!("\nBad:\n{}\n", bad));
        }
        if let Some(good) = &self.example_good {
            out.push_str(&format!("\nGood:\n{}\n", good));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_creation() {
        let rule = Rule::new("test-rule", "Test rule");

        assert_eq!(rule.id, "test-rule");
        assert_eq!(rule.name.as_deref(), Some("Test rule"));
        assert_eq!(rule.severity, Severity::Warning);
        assert!(rule.enabled);
        assert!(!rule.cross_file);
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new("test", "Test")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Correctness)
            .with_target("ExtractVariables")
            .with_tag("payload")
            .cross_file();

        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.category, RuleCategory::Correctness);
        assert!(rule.has_tag("payload"));
        assert!(!rule.has_tag("naming"));
        assert!(rule.cross_file);
    }

    #[test]
    fn test_applies_to() {
        let any = Rule::new("any", "Any");
        assert!(any.applies_to("APIProxy"));

        let scoped = Rule::new("scoped", "Scoped")
            .with_target("TargetEndpoint")
            .with_target("ServiceCallout");
        assert!(scoped.applies_to("ServiceCallout"));
        assert!(!scoped.applies_to("ProxyEndpoint"));
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("perf".parse::<RuleCategory>(), Ok(RuleCategory::Perf));
        assert_eq!("Performance".parse::<RuleCategory>(), Ok(RuleCategory::Perf));
        assert!("nursery".parse::<RuleCategory>().is_err());
    }

    #[test]
    fn test_explain() {
        let rule = Rule::new("use-management-server", "Management server call")
            .with_severity(Severity::Error)
            .with_description("Calls the management API at runtime.")
            .with_target("TargetEndpoint");
        let text = rule.explain();
        assert!(text.starts_with("use-management-server (Management server call)"));
        assert!(text.contains("severity: error"));
        assert!(text.contains("applies to: TargetEndpoint"));
        assert!(text.contains("Calls the management API"));
    }

    #[test]
    fn test_rule_deserialize() {
        let yaml = r#"
id: test-rule
severity: error
category: correctness
tags:
  - payload
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.id, "test-rule");
        assert_eq!(rule.severity, Severity::Error);
        assert!(rule.enabled);
        assert!(rule.targets.is_empty());
    }
}
