//! Endpoint count limits on the proxy descriptor

use crate::check::{CheckError, DocumentCheck, DocumentRef, Finding};
use crate::diagnostic::Severity;
use crate::query::{Query, QueryError};
use crate::rule::{Rule, RuleCategory};

pub const PROXY_RULE_ID: &str = "too-many-proxy-endpoints";
pub const TARGET_RULE_ID: &str = "too-many-target-endpoints";

pub fn proxy_rule() -> Rule {
    Rule::new(PROXY_RULE_ID, "Too many proxy endpoints")
        .with_severity(Severity::Warning)
        .with_category(RuleCategory::Suspicious)
        .with_target("APIProxy")
        .with_tag("structure")
        .with_description("Discourage the declaration of multiple proxy endpoints in a same proxy.")
}

pub fn target_rule() -> Rule {
    Rule::new(TARGET_RULE_ID, "Too many target endpoints")
        .with_severity(Severity::Warning)
        .with_category(RuleCategory::Suspicious)
        .with_target("APIProxy")
        .with_tag("structure")
        .with_description("Discourage the declaration of many target endpoints in a same proxy.")
}

/// Counts `<container>/<item>` children of an `APIProxy` descriptor
#[derive(Debug, Clone)]
pub struct EndpointCountCheck {
    container: &'static str,
    count: Result<Query, QueryError>,
    limit: usize,
    message: &'static str,
}

impl EndpointCountCheck {
    fn new(
        container: &'static str,
        item: &'static str,
        limit: usize,
        message: &'static str,
    ) -> Self {
        Self {
            container,
            count: Query::compile(&format!("count(/APIProxy/{}/{})", container, item)),
            limit,
            message,
        }
    }

    /// At most `limit` `ProxyEndpoint`s
    pub fn proxy(limit: usize) -> Self {
        Self::new(
            "ProxyEndpoints",
            "ProxyEndpoint",
            limit,
            "Discourage the declaration of multiple proxy endpoints in a same proxy.",
        )
    }

    /// At most `limit` `TargetEndpoint`s
    pub fn target(limit: usize) -> Self {
        Self::new(
            "TargetEndpoints",
            "TargetEndpoint",
            limit,
            "Discourage the declaration of too many target endpoints in a same proxy.",
        )
    }
}

impl DocumentCheck for EndpointCountCheck {
    fn check(&self, doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
        if doc.root_name() != Some("APIProxy") {
            return Ok(Vec::new());
        }

        let query = self.count.as_ref().map_err(Clone::clone)?;
        let count = query.evaluate_number(doc.doc, None)?;
        if count <= self.limit as f64 {
            return Ok(Vec::new());
        }

        let (line, column) = doc
            .doc
            .elements_named(self.container)
            .next()
            .map(|n| (n.line(), n.column()))
            .unwrap_or((1, 1));
        Ok(vec![Finding::new(doc.id, line, column, self.message)])
    }
}
