//! Group-name transformation rules.
//!
//! Configuration carries an ordered list of `(input regex, output
//! template)` pairs per backend type, plus a `default` list used for
//! types without their own rules. The first matching rule wins and its
//! output template may reference capture groups (`$1`, `${name}`).
//!
//! Two call sites want different failure behavior: reconciliation treats
//! a miss as fatal (the group is non-configurable for that backend),
//! finalizer cleanup falls back to the original name so best-effort
//! deletion still proceeds.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;

/// One transformation rule as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternRule {
    pub input: String,
    pub output: String,
}

/// Error from rule compilation or application.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("no pattern matches group '{group_name}' for backend type '{backend_type}'")]
    NoMatch {
        backend_type: String,
        group_name: String,
    },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug)]
struct CompiledRule {
    regex: Regex,
    output: String,
}

/// Compiled rulesets per backend type.
#[derive(Debug, Default)]
pub struct TransformRules {
    rules: HashMap<String, Vec<CompiledRule>>,
    default_rules: Vec<CompiledRule>,
}

impl TransformRules {
    /// Compile the configured rules. An invalid regex fails startup.
    pub fn from_config(
        config: &HashMap<String, Vec<PatternRule>>,
    ) -> Result<Self, TransformError> {
        let mut rules = HashMap::new();
        let mut default_rules = Vec::new();

        for (backend_type, patterns) in config {
            let compiled = compile(patterns)?;
            if backend_type == "default" {
                default_rules = compiled;
            } else {
                rules.insert(backend_type.clone(), compiled);
            }
        }

        Ok(Self {
            rules,
            default_rules,
        })
    }

    /// Map a logical group name to the backend team name. First matching
    /// rule wins; no match is an error.
    pub fn transform(&self, backend_type: &str, group_name: &str) -> Result<String, TransformError> {
        let ruleset = self
            .rules
            .get(backend_type)
            .filter(|rules| !rules.is_empty())
            .map_or(self.default_rules.as_slice(), Vec::as_slice);

        for rule in ruleset {
            if rule.regex.is_match(group_name) {
                return Ok(rule
                    .regex
                    .replace(group_name, rule.output.as_str())
                    .into_owned());
            }
        }

        Err(TransformError::NoMatch {
            backend_type: backend_type.to_string(),
            group_name: group_name.to_string(),
        })
    }

    /// Like [`transform`], falling back to the original name on a miss.
    /// Used by finalizer cleanup.
    #[must_use]
    pub fn transform_or_fallback(&self, backend_type: &str, group_name: &str) -> String {
        self.transform(backend_type, group_name)
            .unwrap_or_else(|_| group_name.to_string())
    }
}

fn compile(patterns: &[PatternRule]) -> Result<Vec<CompiledRule>, TransformError> {
    patterns
        .iter()
        .map(|rule| {
            Regex::new(&rule.input)
                .map(|regex| CompiledRule {
                    regex,
                    output: rule.output.clone(),
                })
                .map_err(|source| TransformError::InvalidPattern {
                    pattern: rule.input.clone(),
                    source,
                })
        })
        .collect()
}
