//! Runtime calls to the management API

use crate::check::{CheckError, DocumentCheck, DocumentRef, Finding};
use crate::diagnostic::Severity;
use crate::query::Query;
use crate::rule::{Rule, RuleCategory};
use regex::{Regex, RegexBuilder};

pub const RULE_ID: &str = "use-management-server";

/// Management API host or organization paths
pub const MANAGEMENT_URL_PATTERN: &str = r"enterprise\.apigee\.com|/v1/(organizations|o)(/|\?|$)";

const TARGET_URLS: &str = "/*/HTTPTargetConnection/URL";

pub fn rule() -> Rule {
    Rule::new(RULE_ID, "Management server call")
        .with_severity(Severity::Error)
        .with_category(RuleCategory::Perf)
        .with_target("TargetEndpoint")
        .with_target("ServiceCallout")
        .with_tag("runtime")
        .with_description(
            "Targets and service callouts should not call the management server at runtime.",
        )
        .with_rationale(
            "The management API is rate limited and not sized for runtime traffic; use a cache or KVM for configuration data.",
        )
        .with_example_bad("<URL>https://enterprise.apigee.com/v1/organizations/org/kvms</URL>")
}

#[derive(Debug, Clone)]
pub struct ManagementServerCheck {
    compiled: Result<(Regex, Query), CheckError>,
}

impl Default for ManagementServerCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagementServerCheck {
    pub fn new() -> Self {
        Self { compiled: compile() }
    }
}

fn compile() -> Result<(Regex, Query), CheckError> {
    let pattern = RegexBuilder::new(MANAGEMENT_URL_PATTERN)
        .case_insensitive(true)
        .build()?;
    let urls = Query::compile(TARGET_URLS)?;
    Ok((pattern, urls))
}

impl DocumentCheck for ManagementServerCheck {
    fn check(&self, doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
        if !matches!(doc.root_name(), Some("TargetEndpoint" | "ServiceCallout")) {
            return Ok(Vec::new());
        }

        let (pattern, urls) = self.compiled.as_ref().map_err(Clone::clone)?;
        let urls = urls.evaluate_nodes(doc.doc, None)?;

        Ok(urls
            .into_iter()
            .filter(|url| pattern.is_match(url.text_content().trim()))
            .map(|url| {
                Finding::at(
                    doc,
                    url,
                    format!(
                        "{} calls the management server: {}",
                        doc.root_name().unwrap_or_default(),
                        url.text_content().trim()
                    ),
                )
            })
            .collect())
    }
}
