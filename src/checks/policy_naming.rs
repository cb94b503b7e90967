//! Policy naming convention
//!
//! A policy's `name` must start with a prefix indicating its type, followed
//! by `-` or `_` (e.g. `EV-ParseBody` for an `ExtractVariables` policy).

use crate::check::{CheckError, DocumentCheck, DocumentRef, Finding};
use crate::diagnostic::Severity;
use crate::rule::{Rule, RuleCategory};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

pub const RULE_ID: &str = "policy-name-convention";

/// Accepted prefixes per policy type
pub const POLICY_PREFIXES: &[(&str, &[&str])] = &[
    ("AccessControl", &["accesscontrol", "ac", "accessc"]),
    ("AccessEntity", &["accessentity", "ae", "accesse"]),
    (
        "AssignMessage",
        &["assignmessage", "am", "assign", "build", "set", "response", "send", "add"],
    ),
    ("BasicAuthentication", &["encode", "basicauth", "ba", "auth"]),
    ("InvalidateCache", &["invalidatecache", "invalidate", "ic", "cache"]),
    ("LookupCache", &["lookup", "lu", "lucache", "cache", "lc"]),
    ("PopulateCache", &["populate", "pop", "populatecache", "pc", "cache"]),
    ("ResponseCache", &["responsecache", "rc", "cache"]),
    ("ConcurrentRatelimit", &["concurrentratelimit", "crl", "cr"]),
    ("ConnectorCallout", &["connectorcallout", "cc"]),
    ("ExtractVariables", &["extract", "ev", "vars"]),
    ("FlowCallout", &["flowcallout", "flow", "fc", "sf"]),
    ("JavaCallout", &["javacallout", "java", "javac"]),
    ("Javascript", &["jsc", "js", "javascript"]),
    ("JSONThreatProtection", &["jsonthreat", "threat", "jtp", "tp"]),
    ("JSONToXML", &["jsontoxml", "j2x", "jtox"]),
    ("GenerateJWS", &["jws", "gjws", "gj"]),
    ("VerifyJWS", &["jws", "vjws", "vj"]),
    ("DecodeJWS", &["jws", "djws", "dj"]),
    ("GenerateJWT", &["jwt", "gjwt", "gj"]),
    ("VerifyJWT", &["jwt", "vjwt", "vj"]),
    ("DecodeJWT", &["jwt", "djwt", "dj"]),
    ("KeyValueMapOperations", &["keyvaluemapoperations", "kvm", "kvmops", "kv"]),
    ("Ldap", &["ldap"]),
    ("MessageLogging", &["messagelogging", "logging", "ml"]),
    ("OAuthV2", &["oauthv2", "oauth", "oa", "accesstoken", "verify"]),
    (
        "GetOAuthV2Info",
        &["oauthv2info", "oauthinfo", "oai", "accesstoken", "getoauth", "getoa", "go"],
    ),
    (
        "SetOAuthV2Info",
        &["oauthv2info", "oauthinfo", "oai", "accesstoken", "setoauth", "setoa", "so"],
    ),
    (
        "DeleteOAuthV2Info",
        &["oauthv2info", "oauthinfo", "oai", "accesstoken", "deloauth", "deloa", "do"],
    ),
    ("OAuthV1", &["oauthv1", "oauth", "oa", "accesstoken", "verify"]),
    ("GetOAuthV1Info", &["oauthv1", "getoauth", "getoa", "go"]),
    ("DeleteOAuthV1Info", &["oauthv1", "deloauth", "deloa", "do"]),
    ("Script", &["script", "scr", "py"]),
    ("Quota", &["quota", "q", "qu"]),
    ("RaiseFault", &["raisefault", "rf", "fault"]),
    ("RegularExpressionProtection", &["regex", "re", "tp"]),
    ("ResetQuota", &["quota", "resetq", "rq"]),
    ("GenerateSAMLAssertion", &["saml", "sa", "gsaml", "gs"]),
    ("ValidateSAMLAssertion", &["saml", "sa", "vsaml", "vs"]),
    ("ServiceCallout", &["callout", "sc"]),
    ("MessageValidation", &["messagevalidation", "mv", "messval"]),
    ("SpikeArrest", &["spikearrest", "spike", "sa"]),
    ("SharedFlow", &["sf"]),
    ("StatisticsCollector", &["stats", "statcoll", "sc", "___collect"]),
    ("VerifyAPIKey", &["verifyapikey", "apikey", "va", "verify"]),
    ("XMLThreatProtection", &["xmltp", "tp"]),
    ("XMLToJSON", &["xmltojson", "x2j", "xtoj"]),
    ("XSL", &["xsl"]),
];

pub fn rule() -> Rule {
    Rule::new(RULE_ID, "Policy name prefix")
        .with_severity(Severity::Warning)
        .with_category(RuleCategory::Style)
        .with_tag("naming")
        .with_description(
            "Policy names should start with a prefix indicating the policy type, followed by '-' or '_'.",
        )
        .with_rationale(
            "Flows reference policies by name only; a typed prefix tells the reader what a step does without opening the policy.",
        )
        .with_example_bad(r#"<ExtractVariables name="ParseBody">"#)
        .with_example_good(r#"<ExtractVariables name="EV-ParseBody">"#)
}

/// Accepted prefixes of one policy type and the pattern built from them
#[derive(Debug, Clone)]
struct PolicyPrefixes {
    prefixes: Vec<String>,
    pattern: Result<Regex, regex::Error>,
}

impl PolicyPrefixes {
    fn new(prefixes: Vec<String>) -> Self {
        let pattern = prefix_pattern(&prefixes);
        Self { prefixes, pattern }
    }
}

/// `^(?:p1|p2|...)[-_].*$`, case-insensitive
fn prefix_pattern(prefixes: &[String]) -> Result<Regex, regex::Error> {
    let alternatives: Vec<String> = prefixes.iter().map(|p| regex::escape(p)).collect();
    let pattern = format!("^(?:{})[-_].*$", alternatives.join("|"));
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

/// Checks the `name` attribute of policy documents against the prefix table
#[derive(Debug, Clone)]
pub struct PolicyNamingCheck {
    policies: HashMap<String, PolicyPrefixes>,
}

impl Default for PolicyNamingCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyNamingCheck {
    pub fn new() -> Self {
        let policies = POLICY_PREFIXES
            .iter()
            .map(|(policy, prefixes)| {
                let prefixes = prefixes.iter().map(|p| p.to_string()).collect();
                (policy.to_string(), PolicyPrefixes::new(prefixes))
            })
            .collect();
        Self { policies }
    }

    /// Accept additional prefixes. Unknown policy types are added to the table.
    pub fn with_extra_prefixes(mut self, extra: &HashMap<String, Vec<String>>) -> Self {
        for (policy, prefixes) in extra {
            let mut accepted = self
                .policies
                .remove(policy)
                .map(|p| p.prefixes)
                .unwrap_or_default();
            for prefix in prefixes {
                let prefix = prefix.to_lowercase();
                if !accepted.contains(&prefix) {
                    accepted.push(prefix);
                }
            }
            self.policies
                .insert(policy.clone(), PolicyPrefixes::new(accepted));
        }
        self
    }

    /// Accepted prefixes for a policy type
    pub fn prefixes(&self, policy_type: &str) -> Option<&[String]> {
        self.policies
            .get(policy_type)
            .map(|p| p.prefixes.as_slice())
    }

    /// Whether `name` carries an accepted prefix. `None` for unknown policy
    /// types.
    pub fn is_compliant(&self, policy_type: &str, name: &str) -> Result<Option<bool>, regex::Error> {
        let Some(policy) = self.policies.get(policy_type) else {
            return Ok(None);
        };
        if policy.prefixes.is_empty() {
            return Ok(Some(true));
        }

        let re = policy.pattern.as_ref().map_err(Clone::clone)?;
        Ok(Some(re.is_match(name)))
    }
}

impl DocumentCheck for PolicyNamingCheck {
    fn check(&self, doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
        let Some(root) = doc.root() else {
            return Ok(Vec::new());
        };
        let policy_type = root.name();
        let Some(name) = root.attribute("name") else {
            return Ok(Vec::new());
        };

        match self.is_compliant(policy_type, name)? {
            Some(false) => {
                let prefixes = self.prefixes(policy_type).unwrap_or_default();
                let message = format!(
                    "Policy {} should have an indicative prefix. Typical prefixes include: [{}]",
                    policy_type,
                    prefixes.join(", ")
                );
                Ok(vec![Finding::at(doc, root, message)])
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::DocumentId;
    use crate::document::Document;
    use std::path::Path;

    fn run(check: &PolicyNamingCheck, xml: &str) -> Vec<Finding> {
        let doc = Document::parse(xml).unwrap();
        let doc_ref = DocumentRef::new(DocumentId(0), Path::new("policy.xml"), &doc);
        check.check(&doc_ref).unwrap()
    }

    #[test]
    fn test_every_prefix_with_separator_is_accepted() {
        let check = PolicyNamingCheck::new();
        for (policy, prefixes) in POLICY_PREFIXES {
            for prefix in *prefixes {
                for name in [
                    format!("{}-Something", prefix),
                    format!("{}_something", prefix.to_uppercase()),
                ] {
                    let xml = format!("<{} name=\"{}\"/>", policy, name);
                    assert!(run(&check, &xml).is_empty(), "{} should accept {}", policy, name);
                }
            }
        }
    }

    #[test]
    fn test_every_prefix_without_separator_is_rejected() {
        let check = PolicyNamingCheck::new();
        for (policy, prefixes) in POLICY_PREFIXES {
            for prefix in *prefixes {
                // "zz" follows no prefix in the table, so no other prefix can match
                let name = format!("{}zz", prefix);
                let xml = format!("<{} name=\"{}\"/>", policy, name);
                assert_eq!(run(&check, &xml).len(), 1, "{} should reject {}", policy, name);
            }
        }
    }

    #[test]
    fn test_bare_prefix_is_rejected() {
        let check = PolicyNamingCheck::new();
        assert_eq!(run(&check, r#"<AccessControl name="ac"/>"#).len(), 1);
        assert_eq!(run(&check, r#"<AccessControl name="ac-"/>"#).len(), 0);
    }

    #[test]
    fn test_case_insensitive() {
        let check = PolicyNamingCheck::new();
        assert!(run(&check, r#"<ExtractVariables name="Ev-Body"/>"#).is_empty());
        assert!(run(&check, r#"<ExtractVariables name="EXTRACT_body"/>"#).is_empty());
    }

    #[test]
    fn test_diagnostic_message_and_location() {
        let check = PolicyNamingCheck::new();
        let findings = run(
            &check,
            "<?xml version=\"1.0\"?>\n<ExtractVariables name=\"ParseBody\">\n</ExtractVariables>",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 2);
        assert_eq!(
            findings[0].message,
            "Policy ExtractVariables should have an indicative prefix. Typical prefixes include: [extract, ev, vars]"
        );
    }

    #[test]
    fn test_missing_name_or_unknown_type_is_skipped() {
        let check = PolicyNamingCheck::new();
        assert!(run(&check, "<AssignMessage/>").is_empty());
        assert!(run(&check, r#"<ProxyEndpoint name="default"/>"#).is_empty());
        assert!(run(&check, r#"<CustomThing name="x"/>"#).is_empty());
    }

    #[test]
    fn test_extra_prefixes() {
        let mut extra = HashMap::new();
        extra.insert("AssignMessage".to_string(), vec!["MSG".to_string()]);
        extra.insert("CustomThing".to_string(), vec!["ct".to_string()]);
        let check = PolicyNamingCheck::new().with_extra_prefixes(&extra);

        assert!(run(&check, r#"<AssignMessage name="msg-Set"/>"#).is_empty());
        assert!(run(&check, r#"<AssignMessage name="AM-Set"/>"#).is_empty());
        assert_eq!(run(&check, r#"<CustomThing name="x"/>"#).len(), 1);
        assert_eq!(check.is_compliant("CustomThing", "ct_x").unwrap(), Some(true));
    }

    #[test]
    fn test_regex_metacharacters_in_prefix() {
        let check = PolicyNamingCheck::new();
        assert_eq!(
            check.is_compliant("StatisticsCollector", "___collect-x").unwrap(),
            Some(true)
        );
        assert_eq!(check.is_compliant("Unknown", "x").unwrap(), None);
    }

    #[test]
    fn test_patterns_built_with_the_table() {
        let mut extra = HashMap::new();
        extra.insert("Quota".to_string(), vec!["orders".to_string()]);
        let check = PolicyNamingCheck::new().with_extra_prefixes(&extra);

        assert_eq!(check.policies.len(), POLICY_PREFIXES.len());
        assert!(check.policies.values().all(|p| p.pattern.is_ok()));

        let quota = check.policies["Quota"].pattern.as_ref().unwrap();
        assert!(quota.is_match("Orders-Quota"));
        assert!(quota.is_match("q_limit"));
        assert!(!quota.is_match("OrdersQuota"));
    }
}
