//! Regions produced by the template scanner

use crate::error::Span;

/// A scanned template: directives plus the region tree of its body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Base type named by the last `@inherits` line
    pub inherits: Option<String>,
    /// `@using` imports in first-seen order, without duplicates
    pub usings: Vec<String>,
    pub body: Vec<Region>,
    /// Class-level code from `@functions` blocks
    pub functions: Vec<Region>,
}

impl Document {
    pub(crate) fn add_using(&mut self, name: &str) {
        if !self.usings.iter().any(|u| u == name) {
            self.usings.push(name.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// Text written to the output as is
    Literal(String),
    /// Expression whose value is encoded and written
    Expression { code: String, span: Span },
    /// Markup attribute assembled from interpolated fragments
    Attribute(AttributeRegion),
    /// Host statements, re-emitted verbatim
    Code(String),
    /// Control flow or local function: header re-emitted verbatim, body nested
    Block { header: String, body: Vec<Region> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRegion {
    pub name: String,
    /// Written when the attribute begins, e.g. ` class="`
    pub prefix: String,
    /// Written when the attribute ends, e.g. `"`
    pub suffix: String,
    pub values: Vec<AttributeValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeValue {
    /// Whitespace preceding the value inside the attribute
    pub prefix: String,
    pub value: AttributePart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributePart {
    Literal(String),
    Expression { code: String, span: Span },
}

/// Append literal text, merging with a preceding literal
pub(crate) fn push_literal(out: &mut Vec<Region>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Region::Literal(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(Region::Literal(text.to_string()));
    }
}
