//! Rewrites the definition produced by `terraform show` after an import.
//!
//! The generated definition carries literal values and tool output noise. The
//! transformer turns it back into a parameterized module definition:
//! 1. `clean_tf` strips escape sequences, comments, and read-only attributes
//! 2. `add_parameters_in_tf` injects attributes the service always parameterizes
//! 3. `replace_parameters_in_tf` swaps literal values for `var.<parameter>`
//!    references and returns the literals it replaced
//!
//! Attributes are addressed as `<type>.<name>.<attribute>`, with nested blocks
//! adding one segment each.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Params;
use crate::pattern;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| pattern::fixed(r"\x1b(?:\[[0-9;?]*[A-Za-z])?"));

static COMMENT: LazyLock<Regex> = LazyLock::new(|| pattern::fixed(r"^\s*#"));

/// `resource "<type>" "<name>" {` or `data "<type>" "<name>" {`
static BLOCK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| pattern::fixed(r#"^\s*(resource|data)\s+"([^"]+)"\s+"([^"]+)"\s*\{\s*$"#));

static BLOCK_CLOSE: LazyLock<Regex> = LazyLock::new(|| pattern::fixed(r"^\s*\}"));

/// `versioning {` or `tags = {`
static NESTED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| pattern::fixed(r#"^\s*"?([^"\s=]+)"?\s*=?\s*\{\s*$"#));

/// `<key> = <value>`, key optionally quoted
static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| pattern::fixed(r#"^\s*"?([^"\s=]+)"?\s*=\s*(.*?)\s*$"#));

/// Maps an attribute address to a service parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterMapping {
    /// Attribute address, e.g. `aws_s3_bucket.bucket.bucket`.
    pub tf_variable: String,
    /// Name of the module variable holding the value.
    pub parameter_name: String,
}

/// Transformation pipeline applied to imported definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TfTransformer {
    /// Attributes replaced by variable references.
    #[serde(default)]
    pub parameter_mappings: Vec<ParameterMapping>,
    /// Attributes dropped from the definition.
    #[serde(default)]
    pub parameters_to_remove: Vec<String>,
    /// Attributes added as variable references.
    #[serde(default)]
    pub parameters_to_add: Vec<ParameterMapping>,
}

#[derive(Debug)]
enum LineKind {
    BlockOpen { path: String },
    Attribute {
        path: String,
        key: String,
        value: String,
        top_level: bool,
    },
    Comment,
    Other,
}

#[derive(Debug)]
struct TfLine<'a> {
    text: &'a str,
    kind: LineKind,
}

impl TfTransformer {
    /// Runs the three steps in order.
    #[must_use]
    pub fn transform(&self, tf: &str) -> (String, Params) {
        self.replace_parameters_in_tf(&self.add_parameters_in_tf(&self.clean_tf(tf)))
    }

    /// Removes escape sequences, comments, `id` attributes, and the
    /// attributes listed in `parameters_to_remove`.
    #[must_use]
    pub fn clean_tf(&self, tf: &str) -> String {
        let stripped = strip_ansi(tf);
        let kept: Vec<&str> = parse_lines(&stripped)
            .into_iter()
            .filter(|line| match &line.kind {
                LineKind::Comment => false,
                LineKind::Attribute {
                    path,
                    key,
                    top_level,
                    ..
                } => !((*top_level && key == "id") || self.parameters_to_remove.contains(path)),
                LineKind::BlockOpen { .. } | LineKind::Other => true,
            })
            .map(|line| line.text)
            .collect();

        kept.join("\n")
    }

    /// Adds `<attribute> = var.<parameter>` lines for `parameters_to_add`.
    #[must_use]
    pub fn add_parameters_in_tf(&self, tf: &str) -> String {
        let mut out = Vec::new();

        for line in parse_lines(tf) {
            out.push(line.text.to_string());

            if let LineKind::BlockOpen { path } = &line.kind {
                let indent = format!("{}    ", leading_whitespace(line.text));
                for mapping in &self.parameters_to_add {
                    if let Some((parent, attribute)) = mapping.tf_variable.rsplit_once('.')
                        && parent == path
                    {
                        out.push(format!("{indent}{attribute} = var.{}", mapping.parameter_name));
                    }
                }
            }
        }

        out.join("\n")
    }

    /// Replaces mapped literal values with variable references.
    ///
    /// Returns the rewritten definition and the replaced literals keyed by
    /// parameter name.
    #[must_use]
    pub fn replace_parameters_in_tf(&self, tf: &str) -> (String, Params) {
        let mut values = Params::new();
        let mut out = Vec::new();

        for line in parse_lines(tf) {
            let LineKind::Attribute {
                path, key, value, ..
            } = &line.kind
            else {
                out.push(line.text.to_string());
                continue;
            };

            match self.parameter_mappings.iter().find(|m| &m.tf_variable == path) {
                Some(mapping) => {
                    values.insert(mapping.parameter_name.clone(), literal_value(value));
                    out.push(format!(
                        "{}{key} = var.{}",
                        leading_whitespace(line.text),
                        mapping.parameter_name
                    ));
                }
                None => out.push(line.text.to_string()),
            }
        }

        (out.join("\n"), values)
    }
}

fn parse_lines(tf: &str) -> Vec<TfLine<'_>> {
    let mut stack: Vec<String> = Vec::new();
    let mut lines = Vec::new();

    for text in tf.lines() {
        let kind = if COMMENT.is_match(text) {
            LineKind::Comment
        } else if let Some(address) = block_address(text) {
            stack = vec![address.clone()];
            LineKind::BlockOpen { path: address }
        } else if BLOCK_CLOSE.is_match(text) {
            stack.pop();
            LineKind::Other
        } else if let Some(caps) = NESTED_BLOCK.captures(text)
            && !stack.is_empty()
        {
            stack.push(caps[1].to_string());
            LineKind::BlockOpen {
                path: stack.join("."),
            }
        } else if let Some(caps) = ATTRIBUTE.captures(text)
            && !stack.is_empty()
        {
            let key = caps[1].to_string();
            LineKind::Attribute {
                path: format!("{}.{key}", stack.join(".")),
                key,
                value: caps[2].to_string(),
                top_level: stack.len() == 1,
            }
        } else {
            LineKind::Other
        };

        lines.push(TfLine { text, kind });
    }

    lines
}

/// Address of a `resource` or `data` block header; data sources get a
/// `data.` prefix.
fn block_address(line: &str) -> Option<String> {
    let caps = BLOCK_HEADER.captures(line)?;
    let prefix = if &caps[1] == "data" { "data." } else { "" };
    Some(format!("{prefix}{}.{}", &caps[2], &caps[3]))
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn literal_value(raw: &str) -> Value {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Value::String(inner.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}
