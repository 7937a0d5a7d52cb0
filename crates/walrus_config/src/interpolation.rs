//! Attribute interpolation.
//!
//! Attribute strings may reference environment variables as `${var.name}` and
//! upstream resource outputs as `${res.resource.output}`. Both are rewritten to
//! references of generated root variables. Any other `${...}` sequence is
//! escaped to `$${...}` so it reaches the engine as literal text.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Captures, Regex};

use crate::error::{ConfigError, ConfigResult};
use crate::options::{Output, OutputValue};

const VARIABLE_PATTERN: &str = r"\$\{var\.([a-zA-Z0-9_-]+)\}";
const RESOURCE_PATTERN: &str = r"\$\{res\.([^.}]+)\.([^.}]+)\}";
const INTERPOLATION_PATTERN: &str = r"\$\{((var\.|res\.)?([^.}]+)(?:\.([^.}]+))?)[^}]*\}";

/// A reference to an upstream resource output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutputRef {
    pub resource: String,
    pub output: String,
}

impl OutputRef {
    /// Key used for dependency outputs, `<resource>_<output>`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.resource, self.output)
    }
}

/// Attributes after interpolation with the references they contain.
#[derive(Debug, Clone, Default)]
pub struct Interpolated {
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub variables: BTreeSet<String>,
    pub outputs: BTreeSet<OutputRef>,
}

impl Interpolated {
    /// Ensure every referenced output is available.
    pub fn check_outputs(&self, available: &BTreeMap<String, OutputValue>) -> ConfigResult<()> {
        for r in &self.outputs {
            if !available.contains_key(&r.key()) {
                return Err(ConfigError::MissingDependencyOutput {
                    resource: r.resource.clone(),
                    output: r.output.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Rewrites attribute strings.
pub struct Interpolator {
    variable: Regex,
    resource: Regex,
    interpolation: Regex,
    variable_prefix: String,
    resource_prefix: String,
}

impl Interpolator {
    pub fn new(variable_prefix: &str, resource_prefix: &str) -> ConfigResult<Self> {
        Ok(Self {
            variable: Regex::new(VARIABLE_PATTERN)?,
            resource: Regex::new(RESOURCE_PATTERN)?,
            interpolation: Regex::new(INTERPOLATION_PATTERN)?,
            variable_prefix: variable_prefix.to_string(),
            resource_prefix: resource_prefix.to_string(),
        })
    }

    /// Interpolate every string inside the attributes.
    pub fn interpolate(
        &self,
        attributes: &BTreeMap<String, serde_json::Value>,
    ) -> Interpolated {
        let mut result = Interpolated::default();
        for (name, value) in attributes {
            let value = self.walk(value, &mut result);
            result.attributes.insert(name.clone(), value);
        }
        result
    }

    fn walk(&self, value: &serde_json::Value, result: &mut Interpolated) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) => serde_json::Value::String(self.rewrite(s, result)),
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| self.walk(v, result)).collect())
            }
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.walk(v, result)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn rewrite(&self, s: &str, result: &mut Interpolated) -> String {
        let escaped = self.interpolation.replace_all(s, |caps: &Captures| {
            let whole = &caps[0];
            match caps.get(2).map(|m| m.as_str()) {
                Some("var.") | Some("res.") => whole.to_string(),
                _ => format!("${}", whole),
            }
        });

        let with_vars = self.variable.replace_all(&escaped, |caps: &Captures| {
            result.variables.insert(caps[1].to_string());
            format!("${{var.{}{}}}", self.variable_prefix, &caps[1])
        });

        self.resource
            .replace_all(&with_vars, |caps: &Captures| {
                let r = OutputRef {
                    resource: caps[1].to_string(),
                    output: caps[2].to_string(),
                };
                let key = r.key();
                result.outputs.insert(r);
                format!("${{var.{}{}}}", self.resource_prefix, key)
            })
            .into_owned()
    }
}

/// Mark outputs sensitive when they expose a sensitive module variable.
pub fn mark_sensitive_outputs(
    outputs: &mut [Output],
    sensitive_variables: &BTreeSet<String>,
) -> ConfigResult<()> {
    if sensitive_variables.is_empty() {
        return Ok(());
    }

    let alternatives: Vec<String> = sensitive_variables.iter().map(|v| regex::escape(v)).collect();
    let pattern = Regex::new(&format!(r"var\.({})\b", alternatives.join("|")))?;

    for output in outputs.iter_mut().filter(|o| !o.sensitive) {
        if pattern.is_match(&output.value_expression) {
            output.sensitive = true;
        }
    }
    Ok(())
}
