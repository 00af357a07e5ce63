//! Template program generator
//!
//! Turns the regions of a directive-injected template into program text: one
//! template type whose `execute` body replays the regions against the base
//! contract (`WriteLiteral`, `Write`, and the attribute operations). Host code
//! from the template is re-emitted verbatim around the nested regions.

use crate::error::Diagnostic;
use crate::options::CompilationOptions;
use crate::template::{self, AttributePart, AttributeRegion, Document, Region};

const INDENT: &str = "    ";

/// Generate program text from directive-injected template text
pub fn generate(template: &str, options: &CompilationOptions) -> Result<String, Diagnostic> {
    let document = template::scan(template)?;
    Ok(emit_document(&document, options))
}

/// Emit the program for an already scanned document
pub fn emit_document(document: &Document, options: &CompilationOptions) -> String {
    let mut w = Writer::default();

    if !options.namespace().is_empty() {
        w.line(&format!("namespace {};", options.namespace()));
        w.blank();
    }

    if !document.usings.is_empty() {
        for using in &document.usings {
            w.line(&format!("using {using};"));
        }
        w.blank();
    }

    let inherits = document.inherits.as_deref().unwrap_or(options.inherits());
    w.line(&format!("class {} : {}", options.type_name(), inherits));
    w.open();

    w.line("execute");
    w.open();
    w.regions(&document.body);
    w.close();

    if !document.functions.is_empty() {
        w.blank();
        w.regions(&document.functions);
    }

    w.close();
    w.out
}

#[derive(Default)]
struct Writer {
    out: String,
    depth: usize,
}

impl Writer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn open(&mut self) {
        self.line("{");
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn regions(&mut self, regions: &[Region]) {
        for region in regions {
            match region {
                Region::Literal(text) => {
                    self.line(&format!("WriteLiteral({});", string_literal(text)));
                }
                Region::Expression { code, .. } => self.line(&format!("Write({code});")),
                Region::Attribute(attr) => self.attribute(attr),
                Region::Code(code) => self.line(code),
                Region::Block { header, body } => {
                    self.line(header);
                    self.open();
                    self.regions(body);
                    self.close();
                }
            }
        }
    }

    fn attribute(&mut self, attr: &AttributeRegion) {
        self.line(&format!(
            "BeginWriteAttribute({}, {}, {}, {});",
            string_literal(&attr.name),
            string_literal(&attr.prefix),
            string_literal(&attr.suffix),
            attr.values.len()
        ));
        for value in &attr.values {
            let rendered = match &value.value {
                AttributePart::Literal(text) => string_literal(text),
                AttributePart::Expression { code, .. } => code.clone(),
            };
            self.line(&format!(
                "WriteAttributeValue({}, {});",
                string_literal(&value.prefix),
                rendered
            ));
        }
        self.line("EndWriteAttribute();");
    }
}

/// Quote `text` as a program string literal
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
