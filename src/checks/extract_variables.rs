//! Body guard for payload extraction
//!
//! An `ExtractVariables` policy that reads a JSON/XML payload or form
//! parameters fails at runtime on messages without a body. Every step that
//! invokes such a policy must be guarded by a condition that checks for a
//! body (or a verb implying one), either on the step itself or on the
//! enclosing conditional flow.
//!
//! The policy and its steps live in different files, so this check runs on
//! the policy and looks the steps up in the bundle index. Diagnostics are
//! reported on the step, in the document that contains it.

use crate::bundle::Bundle;
use crate::check::{BundleCheck, CheckError, DocumentRef, Finding};
use crate::diagnostic::Severity;
use crate::document::Node;
use crate::index::BundleIndex;
use crate::query::{is_enclosing_flow, nearest_ancestor, Query};
use crate::rule::{Rule, RuleCategory};
use log::debug;
use regex::Regex;

pub const RULE_ID: &str = "extract-variables-body-guard";

pub const MESSAGE: &str =
    "An appropriate check for a message body was not found on the enclosing Step or Flow.";

/// Condition fragments showing that a body is present
pub const BODY_GUARD_PATTERN: &str = r"(response\.content|response\.form|request\.content|request\.form|message\.content|message\.form|message\.verb|request\.verb|request\.header\.Content-Length|response\.header\.Content-Length)";

const POLICY_NAME: &str = "string(/ExtractVariables/@name)";
const EXTRACTS_PAYLOAD: &str = "count(/ExtractVariables/*[name()='JSONPayload' or name()='XMLPayload']/Variable) + count(/ExtractVariables/FormParam) > 0";
const CONDITION: &str = "string(Condition)";

pub fn rule() -> Rule {
    Rule::new(RULE_ID, "Unguarded payload extraction")
        .with_severity(Severity::Error)
        .with_category(RuleCategory::Correctness)
        .with_target("ExtractVariables")
        .with_tag("payload")
        .with_description(
            "Steps running an ExtractVariables policy that reads a JSON/XML payload or form parameters must check for a message body on the step or the enclosing flow.",
        )
        .with_example_bad("<Step>\n    <Name>EV-ParseBody</Name>\n</Step>")
        .with_example_good(
            "<Step>\n    <Name>EV-ParseBody</Name>\n    <Condition>request.verb = \"POST\"</Condition>\n</Step>",
        )
}

/// Queries and guard pattern, compiled once per check
#[derive(Debug, Clone)]
struct Compiled {
    policy_name: Query,
    extracts_payload: Query,
    condition: Query,
    guard: Regex,
}

impl Compiled {
    fn new() -> Result<Self, CheckError> {
        Ok(Self {
            policy_name: Query::compile(POLICY_NAME)?,
            extracts_payload: Query::compile(EXTRACTS_PAYLOAD)?,
            condition: Query::compile(CONDITION)?,
            guard: Regex::new(BODY_GUARD_PATTERN)?,
        })
    }

    /// Whether `node` has a `Condition` child mentioning a body indicator
    fn has_guard(&self, node: Node<'_>) -> Result<bool, CheckError> {
        let text = self
            .condition
            .evaluate_string(node.document(), Some(node.id()))?;
        Ok(self.guard.is_match(&text))
    }
}

#[derive(Debug, Clone)]
pub struct BodyGuardCheck {
    compiled: Result<Compiled, CheckError>,
}

impl Default for BodyGuardCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyGuardCheck {
    pub fn new() -> Self {
        Self {
            compiled: Compiled::new(),
        }
    }
}

impl BundleCheck for BodyGuardCheck {
    fn check(
        &self,
        doc: &DocumentRef<'_>,
        bundle: &Bundle,
        index: &BundleIndex,
    ) -> Result<Vec<Finding>, CheckError> {
        let compiled = self.compiled.as_ref().map_err(Clone::clone)?;

        let name = compiled.policy_name.evaluate_string(doc.doc, None)?;
        let name = name.trim();
        if name.is_empty() {
            return Ok(Vec::new());
        }
        if !compiled.extracts_payload.evaluate_bool(doc.doc, None)? {
            return Ok(Vec::new());
        }

        let sites = index.lookup(name);
        if sites.is_empty() {
            debug!("{}: policy {} is never invoked", doc.path.display(), name);
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        for site in sites {
            let Some(step_doc) = bundle.document(site.document) else {
                continue;
            };
            let step = step_doc.node(site.node);

            if compiled.has_guard(step)? {
                continue;
            }
            if let Some(flow) = nearest_ancestor(step, is_enclosing_flow) {
                if compiled.has_guard(flow)? {
                    continue;
                }
            }

            findings.push(Finding::new(site.document, step.line(), step.column(), MESSAGE));
        }

        Ok(findings)
    }
}
