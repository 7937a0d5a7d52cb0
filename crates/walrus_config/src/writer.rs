//! HCL rendering.
//!
//! Output follows `terraform fmt` conventions: two-space indentation, `=`
//! aligned across consecutive attributes and a blank line after each
//! top-level block. Attribute keys are always written in ascending order so
//! the same input renders byte-identical output.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::block::Block;
use crate::error::ConfigResult;
use crate::value::{is_identifier, Value};

const INDENT: &str = "  ";

/// An HCL file made of top-level attributes followed by blocks.
#[derive(Debug, Clone, Default)]
pub struct HclFile {
    pub attributes: BTreeMap<String, Value>,
    pub blocks: Vec<Block>,
}

impl HclFile {
    pub fn new(attributes: BTreeMap<String, Value>, blocks: Vec<Block>) -> Self {
        Self { attributes, blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }

    /// Render the file and apply the interpolation post-pass.
    pub fn to_bytes(&self) -> ConfigResult<Vec<u8>> {
        let mut out = String::new();

        write_attributes(&mut out, &self.attributes, 0);
        if !self.attributes.is_empty() && !self.blocks.is_empty() {
            out.push('\n');
        }

        for block in &self.blocks {
            write_block(&mut out, block, 0);
            out.push('\n');
        }

        Ok(format(&out)?.into_bytes())
    }
}

/// Un-escape interpolation placeholders.
///
/// `$${...}` becomes `${...}` and a quoted `"{{expr}}"` becomes the bare
/// expression `expr`. Only a string that is exactly one placeholder is
/// unquoted; an expression never contains quotes or braces, so text like
/// `"{{a}} and {{b}}"` stays a literal string.
pub fn format(rendered: &str) -> ConfigResult<String> {
    let unescaped = rendered.replace("$${", "${");
    Ok(expression_pattern()?
        .replace_all(&unescaped, "$1")
        .into_owned())
}

fn expression_pattern() -> ConfigResult<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r#""\{\{([^"{}]*)\}\}""#)?;
    Ok(PATTERN.get_or_init(|| pattern))
}

fn pad(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str(INDENT);
    }
}

fn write_attributes(out: &mut String, attributes: &BTreeMap<String, Value>, indent: usize) {
    let mut group: Vec<(String, String)> = Vec::new();

    for (name, value) in attributes {
        let mut rendered = String::new();
        write_value(&mut rendered, value, indent);
        group.push((key(name), rendered));

        // A multi-line value closes the alignment run.
        if value.is_multiline() {
            flush(out, &mut group, indent);
        }
    }
    flush(out, &mut group, indent);
}

fn flush(out: &mut String, group: &mut Vec<(String, String)>, indent: usize) {
    let width = group.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (k, v) in group.drain(..) {
        pad(out, indent);
        out.push_str(&k);
        for _ in k.len()..width {
            out.push(' ');
        }
        out.push_str(" = ");
        out.push_str(&v);
        out.push('\n');
    }
}

fn key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn write_block(out: &mut String, block: &Block, indent: usize) {
    pad(out, indent);
    out.push_str(block.block_type.as_str());
    for label in &block.labels {
        out.push(' ');
        out.push_str(&quote(label));
    }
    out.push_str(" {\n");

    write_attributes(out, &block.attributes, indent + 1);

    for (i, child) in block.blocks.iter().enumerate() {
        if i > 0 || !block.attributes.is_empty() {
            out.push('\n');
        }
        write_block(out, child, indent + 1);
    }

    pad(out, indent);
    out.push_str("}\n");
}

fn write_value(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::String(s) => out.push_str(&quote(s)),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, indent);
            }
            out.push(']');
        }
        Value::Map(entries) | Value::Object(entries) => {
            if entries.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            write_attributes(out, entries, indent + 1);
            pad(out, indent);
            out.push('}');
        }
    }
}

/// Quote a string literal, escaping template sequences.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }

    out.push('"');
    out
}
