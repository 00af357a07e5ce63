//! Template scanner: splits template text into regions
//!
//! The scanner alternates between two modes. Markup mode copies text through
//! and looks for `@` transitions; code mode reads host statements and control
//! flow until the brace that closes the block, switching back to markup for
//! elements and `@:` lines.

use super::region::{push_literal, AttributePart, AttributeRegion, AttributeValue, Document, Region};
use crate::error::{Diagnostic, Origin};

type Scan<T> = Result<T, Diagnostic>;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const BLOCK_KEYWORDS: &[&str] = &["if", "else", "foreach", "while", "fn"];

/// Where a markup run ends
enum Stop {
    Eof,
    /// `@:` text lines end after their newline
    LineEnd,
    /// Closing tag of an element opened in code
    Element {
        name: String,
        start: usize,
        emit_close: bool,
    },
}

struct StartTag {
    name: String,
    self_closing: bool,
}

/// Scan template text into a [`Document`]. Scanning stops at the first
/// malformed construct.
pub fn scan(source: &str) -> Result<Document, Diagnostic> {
    let mut scanner = Scanner {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
        expression_end: None,
        doc: Document::default(),
    };
    let mut body = Vec::new();
    scanner.markup(&mut body, &Stop::Eof)?;
    scanner.doc.body = body;
    Ok(scanner.doc)
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Where the most recent `@` expression ended
    expression_end: Option<usize>,
    doc: Document,
}

impl<'a> Scanner<'a> {
    fn peek_at(&self, at: usize) -> Option<u8> {
        self.bytes.get(at).copied()
    }

    fn word_at(&self, at: usize) -> &'a str {
        let src: &'a str = self.src;
        if !self.peek_at(at).is_some_and(is_ident_start) {
            return "";
        }
        &src[at..ident_end(self.bytes, at)]
    }

    /// Leading whitespace of the line containing `at`, if nothing else
    /// precedes `at` on that line
    fn line_indent(&self, at: usize) -> Option<&'a str> {
        let src: &'a str = self.src;
        let line_start = src[..at].rfind('\n').map_or(0, |i| i + 1);
        let indent = &src[line_start..at];
        indent
            .bytes()
            .all(|b| b == b' ' || b == b'\t')
            .then_some(indent)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_at(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consume trailing blanks and one newline, if the rest of the line is empty
    fn swallow_newline(&mut self) {
        let mut i = self.pos;
        while matches!(self.peek_at(i), Some(b' ' | b'\t')) {
            i += 1;
        }
        if self.peek_at(i) == Some(b'\r') && self.peek_at(i + 1) == Some(b'\n') {
            self.pos = i + 2;
        } else if self.peek_at(i) == Some(b'\n') {
            self.pos = i + 1;
        }
    }

    /// Markup mode
    fn markup(&mut self, out: &mut Vec<Region>, stop: &Stop) -> Scan<()> {
        let line_mode = matches!(stop, Stop::LineEnd);
        let mut depth = 0usize;

        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\n' if line_mode => {
                    push_literal(out, "\n");
                    self.pos += 1;
                    return Ok(());
                }
                b'<' => {
                    if let Stop::Element {
                        name, emit_close, ..
                    } = stop
                    {
                        if self.at_close_tag(name) {
                            let end = self.tag_end(self.pos);
                            if depth == 0 {
                                if *emit_close {
                                    push_literal(out, &self.src[self.pos..end]);
                                }
                                self.pos = end;
                                return Ok(());
                            }
                            depth -= 1;
                            push_literal(out, &self.src[self.pos..end]);
                            self.pos = end;
                            continue;
                        }
                    }

                    if self.peek_at(self.pos + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
                        let tag = self.start_tag(out)?;
                        if let Stop::Element { name, .. } = stop {
                            if tag.name == *name && !tag.self_closing && !is_void(&tag.name) {
                                depth += 1;
                            }
                        }
                    } else {
                        push_literal(out, "<");
                        self.pos += 1;
                    }
                }
                b'@' => self.markup_transition(out)?,
                _ => {
                    let next = self.bytes[self.pos + 1..]
                        .iter()
                        .position(|&c| c == b'<' || c == b'@' || (line_mode && c == b'\n'))
                        .map_or(self.bytes.len(), |p| self.pos + 1 + p);
                    push_literal(out, &self.src[self.pos..next]);
                    self.pos = next;
                }
            }
        }

        match stop {
            Stop::Element { name, start, .. } => Err(Diagnostic::error(
                Origin::Template,
                *start..start + 1 + name.len(),
                format!("element <{name}> was not closed"),
            )),
            _ => Ok(()),
        }
    }

    fn markup_transition(&mut self, out: &mut Vec<Region>) -> Scan<()> {
        let at = self.pos;
        let next = self.peek_at(at + 1);

        if next == Some(b'@') {
            push_literal(out, "@");
            self.pos = at + 2;
            return Ok(());
        }
        if next == Some(b'*') {
            return self.comment();
        }
        // e-mail style, unless the previous expression ends right here
        if at > 0 && self.bytes[at - 1].is_ascii_alphanumeric() && self.expression_end != Some(at)
        {
            push_literal(out, "@");
            self.pos = at + 1;
            return Ok(());
        }

        match next {
            Some(b'(') => {
                let region = self.explicit_expression()?;
                out.push(region);
            }
            Some(b'{') => {
                let indent = self.line_indent(at);
                trim_indent(out, indent);
                self.pos = at + 2;
                self.code(out, at + 1)?;
                if indent.is_some() {
                    self.swallow_newline();
                }
            }
            Some(b) if is_ident_start(b) => {
                let word = self.word_at(at + 1);
                let word_end = at + 1 + word.len();
                match word {
                    "inherits" | "using" if matches!(self.peek_at(word_end), Some(b' ' | b'\t')) => {
                        trim_indent(out, self.line_indent(at));
                        self.directive(word, word_end)?;
                    }
                    "if" | "foreach" | "while" => {
                        let indent = self.line_indent(at);
                        trim_indent(out, indent);
                        self.pos = at + 1;
                        self.block(out)?;
                        if word == "if" {
                            self.else_chain(out)?;
                        }
                        if indent.is_some() {
                            self.swallow_newline();
                        }
                    }
                    "functions" => {
                        let indent = self.line_indent(at);
                        trim_indent(out, indent);
                        self.functions(word_end)?;
                        if indent.is_some() {
                            self.swallow_newline();
                        }
                    }
                    _ => {
                        let region = self.implicit_expression();
                        out.push(region);
                    }
                }
            }
            _ => {
                push_literal(out, "@");
                self.pos = at + 1;
            }
        }
        Ok(())
    }

    /// `@inherits Name` or `@using Name`, consumed with its newline
    fn directive(&mut self, word: &str, word_end: usize) -> Scan<()> {
        let line_end = self.src[word_end..]
            .find('\n')
            .map_or(self.bytes.len(), |i| word_end + i);
        let value = self.src[word_end..line_end].trim();
        if value.is_empty() {
            return Err(Diagnostic::error(
                Origin::Template,
                self.pos..line_end,
                format!("expected a type name after @{word}"),
            ));
        }
        match word {
            "inherits" => self.doc.inherits = Some(value.to_string()),
            _ => self.doc.add_using(value),
        }
        self.pos = (line_end + 1).min(self.bytes.len());
        Ok(())
    }

    /// `@functions { ... }`; the code lands at class level
    fn functions(&mut self, word_end: usize) -> Scan<()> {
        self.pos = word_end;
        self.skip_whitespace();
        if self.peek_at(self.pos) != Some(b'{') {
            return Err(Diagnostic::error(
                Origin::Template,
                word_end..self.pos,
                "expected '{' after @functions",
            ));
        }
        let open = self.pos;
        self.pos += 1;
        let mut functions = Vec::new();
        self.code(&mut functions, open)?;
        self.doc.functions.extend(functions);
        Ok(())
    }

    /// `else` branches following an `@if` block in markup
    fn else_chain(&mut self, out: &mut Vec<Region>) -> Scan<()> {
        loop {
            let mut i = self.pos;
            while self.peek_at(i).is_some_and(|b| b.is_ascii_whitespace()) {
                i += 1;
            }
            if self.word_at(i) != "else" {
                return Ok(());
            }
            self.pos = i;
            self.block(out)?;
        }
    }

    fn comment(&mut self) -> Scan<()> {
        let start = self.pos;
        match self.src[start + 2..].find("*@") {
            Some(i) => {
                self.pos = start + 2 + i + 2;
                Ok(())
            }
            None => Err(Diagnostic::error(
                Origin::Template,
                start..start + 2,
                "unterminated comment '@*'",
            )),
        }
    }

    /// `@( ... )`
    fn explicit_expression(&mut self) -> Scan<Region> {
        let at = self.pos;
        let end = balanced_end(self.src, at + 1).ok_or_else(|| {
            Diagnostic::error(Origin::Template, at..at + 2, "unterminated expression '@('")
        })?;
        let code = self.src[at + 2..end - 1].trim();
        if code.is_empty() {
            return Err(Diagnostic::error(Origin::Template, at..end, "empty expression"));
        }
        self.pos = end;
        self.expression_end = Some(end);
        Ok(Region::Expression {
            code: code.to_string(),
            span: at + 2..end - 1,
        })
    }

    /// `@a.b[c](d)`; the identifier starts right after the `@`
    fn implicit_expression(&mut self) -> Region {
        let start = self.pos + 1;
        let end = implicit_end(self.src, start);
        self.pos = end;
        self.expression_end = Some(end);
        Region::Expression {
            code: self.src[start..end].to_string(),
            span: start..end,
        }
    }

    /// Code mode: read until the brace matching the one at `open`
    fn code(&mut self, out: &mut Vec<Region>, open: usize) -> Scan<()> {
        loop {
            self.skip_whitespace();
            let Some(b) = self.peek_at(self.pos) else {
                return Err(Diagnostic::error(
                    Origin::Template,
                    open..open + 1,
                    "code block is missing a closing '}'",
                ));
            };
            let next = self.peek_at(self.pos + 1);
            match b {
                b'}' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'/' if next == Some(b'/') => {
                    self.pos = self.src[self.pos..]
                        .find('\n')
                        .map_or(self.bytes.len(), |i| self.pos + i);
                }
                b'/' if next == Some(b'*') => match self.src[self.pos + 2..].find("*/") {
                    Some(i) => self.pos += 2 + i + 2,
                    None => {
                        return Err(Diagnostic::error(
                            Origin::Template,
                            self.pos..self.pos + 2,
                            "unterminated comment '/*'",
                        ))
                    }
                },
                b'@' => self.code_transition(out)?,
                b'<' if next.is_some_and(|c| c.is_ascii_alphabetic()) => self.markup_element(out)?,
                _ if BLOCK_KEYWORDS.contains(&self.word_at(self.pos)) => self.block(out)?,
                _ => self.statement(out)?,
            }
        }
    }

    fn code_transition(&mut self, out: &mut Vec<Region>) -> Scan<()> {
        let at = self.pos;
        match self.peek_at(at + 1) {
            Some(b'*') => self.comment(),
            Some(b':') => {
                self.pos = at + 2;
                self.markup(out, &Stop::LineEnd)
            }
            Some(b'{') => {
                self.pos = at + 2;
                self.code(out, at + 1)
            }
            Some(b'<') => {
                self.pos = at + 1;
                self.markup_element(out)
            }
            Some(b'(') => {
                let region = self.explicit_expression()?;
                out.push(region);
                Ok(())
            }
            Some(b) if is_ident_start(b) => {
                if matches!(self.word_at(at + 1), "if" | "foreach" | "while") {
                    self.pos = at + 1;
                    return self.block(out);
                }
                let region = self.implicit_expression();
                out.push(region);
                Ok(())
            }
            _ => Err(Diagnostic::error(
                Origin::Template,
                at..at + 1,
                "unexpected '@' in code",
            )),
        }
    }

    /// `keyword header { body }`, starting at the keyword
    fn block(&mut self, out: &mut Vec<Region>) -> Scan<()> {
        let start = self.pos;
        let mut i = start;
        let brace = loop {
            match self.peek_at(i) {
                Some(b'{') => break i,
                Some(b'(' | b'[') => {
                    i = balanced_end(self.src, i).ok_or_else(|| {
                        Diagnostic::error(Origin::Template, i..i + 1, "unbalanced brackets")
                    })?;
                }
                Some(b'"') => {
                    i = string_end(self.bytes, i).ok_or_else(|| {
                        Diagnostic::error(Origin::Template, i..i + 1, "unterminated string")
                    })?;
                }
                Some(b';' | b'}') | None => {
                    return Err(Diagnostic::error(
                        Origin::Template,
                        start..i.max(start + 1),
                        "expected '{' to open the block",
                    ));
                }
                Some(_) => i += 1,
            }
        };

        let header = collapse_whitespace(&self.src[start..brace]);
        self.pos = brace + 1;
        let mut body = Vec::new();
        self.code(&mut body, brace)?;
        out.push(Region::Block { header, body });
        Ok(())
    }

    /// A host statement up to its `;`
    fn statement(&mut self, out: &mut Vec<Region>) -> Scan<()> {
        let start = self.pos;
        let mut i = start;
        while let Some(b) = self.peek_at(i) {
            match b {
                b';' => {
                    out.push(Region::Code(self.src[start..=i].trim().to_string()));
                    self.pos = i + 1;
                    return Ok(());
                }
                b'(' | b'[' | b'{' => match balanced_end(self.src, i) {
                    Some(end) => i = end,
                    None => break,
                },
                b'"' => match string_end(self.bytes, i) {
                    Some(end) => i = end,
                    None => break,
                },
                b'}' => break,
                _ => i += 1,
            }
        }
        Err(Diagnostic::error(
            Origin::Template,
            start..i.max(start + 1),
            "expected ';' after statement",
        ))
    }

    /// An element inside code, kept with its line's indentation and newline
    fn markup_element(&mut self, out: &mut Vec<Region>) -> Scan<()> {
        let start = self.pos;
        if let Some(indent) = self.line_indent(start) {
            push_literal(out, indent);
        }

        if self.word_at(start + 1) == "text"
            && matches!(self.peek_at(start + 5), Some(b'>'))
        {
            self.pos = start + 6;
            self.markup(
                out,
                &Stop::Element {
                    name: "text".to_string(),
                    start,
                    emit_close: false,
                },
            )?;
        } else {
            let tag = self.start_tag(out)?;
            if !tag.self_closing && !is_void(&tag.name) {
                self.markup(
                    out,
                    &Stop::Element {
                        name: tag.name,
                        start,
                        emit_close: true,
                    },
                )?;
            }
        }

        let mut i = self.pos;
        while matches!(self.peek_at(i), Some(b' ' | b'\t' | b'\r')) {
            i += 1;
        }
        if self.peek_at(i) == Some(b'\n') {
            push_literal(out, &self.src[self.pos..=i]);
            self.pos = i + 1;
        }
        Ok(())
    }

    fn at_close_tag(&self, name: &str) -> bool {
        let rest = &self.src[self.pos..];
        rest.starts_with("</")
            && rest[2..].starts_with(name)
            && matches!(
                self.peek_at(self.pos + 2 + name.len()),
                Some(b'>' | b' ' | b'\t' | b'\r' | b'\n')
            )
    }

    fn tag_end(&self, from: usize) -> usize {
        self.src[from..]
            .find('>')
            .map_or(self.bytes.len(), |i| from + i + 1)
    }

    /// A start tag; attributes whose values contain expressions become
    /// attribute regions
    fn start_tag(&mut self, out: &mut Vec<Region>) -> Scan<StartTag> {
        let start = self.pos;
        let mut name_end = start + 1;
        while self
            .peek_at(name_end)
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'_'))
        {
            name_end += 1;
        }
        let name = self.src[start + 1..name_end].to_string();
        push_literal(out, &self.src[start..name_end]);
        self.pos = name_end;

        loop {
            let mut i = self.pos;
            while self.peek_at(i).is_some_and(|b| b.is_ascii_whitespace()) {
                i += 1;
            }
            match self.peek_at(i) {
                None => {
                    return Err(Diagnostic::error(
                        Origin::Template,
                        start..name_end,
                        format!("start tag <{name}> is not closed"),
                    ))
                }
                Some(b'>') => {
                    push_literal(out, &self.src[self.pos..=i]);
                    self.pos = i + 1;
                    return Ok(StartTag {
                        name,
                        self_closing: false,
                    });
                }
                Some(b'/') if self.peek_at(i + 1) == Some(b'>') => {
                    push_literal(out, &self.src[self.pos..i + 2]);
                    self.pos = i + 2;
                    return Ok(StartTag {
                        name,
                        self_closing: true,
                    });
                }
                Some(_) => self.attribute(out, i, start, &name)?,
            }
        }
    }

    /// One attribute whose name starts at `name_start`
    fn attribute(
        &mut self,
        out: &mut Vec<Region>,
        name_start: usize,
        tag_start: usize,
        tag: &str,
    ) -> Scan<()> {
        let mut name_end = name_start;
        while self
            .peek_at(name_end)
            .is_some_and(|b| !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/'))
        {
            name_end += 1;
        }
        if name_end == name_start {
            // stray '/'
            push_literal(out, &self.src[self.pos..name_start + 1]);
            self.pos = name_start + 1;
            return Ok(());
        }

        let quote = match (self.peek_at(name_end), self.peek_at(name_end + 1)) {
            (Some(b'='), Some(q @ (b'"' | b'\''))) => q,
            _ => {
                push_literal(out, &self.src[self.pos..name_end]);
                self.pos = name_end;
                return Ok(());
            }
        };

        let value_start = name_end + 2;
        let value_end = attribute_value_end(self.src, value_start, quote).ok_or_else(|| {
            Diagnostic::error(
                Origin::Template,
                tag_start..name_end,
                format!("attribute value of <{tag}> is not closed"),
            )
        })?;

        let values = split_attribute_value(&self.src[value_start..value_end], value_start)?;
        let prefix = &self.src[self.pos..value_start];
        let suffix = &self.src[value_end..value_end + 1];

        let interpolated = values
            .iter()
            .any(|v| matches!(v.value, AttributePart::Expression { .. }));
        if interpolated {
            out.push(Region::Attribute(AttributeRegion {
                name: self.src[name_start..name_end].to_string(),
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
                values,
            }));
        } else {
            push_literal(out, prefix);
            for value in &values {
                push_literal(out, &value.prefix);
                if let AttributePart::Literal(text) = &value.value {
                    push_literal(out, text);
                }
            }
            push_literal(out, suffix);
        }
        self.pos = value_end + 1;
        Ok(())
    }
}

/// Split an attribute value into whitespace-separated chunks; the first piece
/// of each chunk carries the whitespace before it as its prefix
fn split_attribute_value(value: &str, base: usize) -> Scan<Vec<AttributeValue>> {
    let bytes = value.as_bytes();
    let mut values = Vec::new();
    let mut prefix = String::new();
    let mut literal = String::new();
    let mut expression_end = None;
    let mut i = 0;

    fn flush(values: &mut Vec<AttributeValue>, prefix: &mut String, literal: &mut String) {
        if !literal.is_empty() {
            values.push(AttributeValue {
                prefix: std::mem::take(prefix),
                value: AttributePart::Literal(std::mem::take(literal)),
            });
        }
    }

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            flush(&mut values, &mut prefix, &mut literal);
            let end = bytes[i..]
                .iter()
                .position(|c| !c.is_ascii_whitespace())
                .map_or(bytes.len(), |p| i + p);
            prefix.push_str(&value[i..end]);
            i = end;
            continue;
        }

        if b == b'@' {
            let email =
                i > 0 && bytes[i - 1].is_ascii_alphanumeric() && expression_end != Some(i);
            match bytes.get(i + 1).copied() {
                Some(b'@') => {
                    literal.push('@');
                    i += 2;
                    continue;
                }
                Some(b'(') if !email => {
                    let end = balanced_end(value, i + 1).ok_or_else(|| {
                        Diagnostic::error(
                            Origin::Template,
                            base + i..base + i + 2,
                            "unterminated expression '@('",
                        )
                    })?;
                    flush(&mut values, &mut prefix, &mut literal);
                    values.push(AttributeValue {
                        prefix: std::mem::take(&mut prefix),
                        value: AttributePart::Expression {
                            code: value[i + 2..end - 1].trim().to_string(),
                            span: base + i + 2..base + end - 1,
                        },
                    });
                    expression_end = Some(end);
                    i = end;
                    continue;
                }
                Some(c) if !email && is_ident_start(c) => {
                    let end = implicit_end(value, i + 1);
                    flush(&mut values, &mut prefix, &mut literal);
                    values.push(AttributeValue {
                        prefix: std::mem::take(&mut prefix),
                        value: AttributePart::Expression {
                            code: value[i + 1..end].to_string(),
                            span: base + i + 1..base + end,
                        },
                    });
                    expression_end = Some(end);
                    i = end;
                    continue;
                }
                _ => {}
            }
        }

        let ch = value[i..].chars().next().unwrap_or('\u{FFFD}');
        literal.push(ch);
        i += ch.len_utf8();
    }

    flush(&mut values, &mut prefix, &mut literal);
    if !prefix.is_empty() {
        values.push(AttributeValue {
            prefix,
            value: AttributePart::Literal(String::new()),
        });
    }
    Ok(values)
}

/// Position of the quote closing an attribute value that starts at `start`.
/// Quotes inside `@` expressions do not close the value.
fn attribute_value_end(src: &str, start: usize, quote: u8) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut expression_end = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if b == quote {
            return Some(i);
        }
        if b == b'@' {
            let email =
                i > start && bytes[i - 1].is_ascii_alphanumeric() && expression_end != Some(i);
            let end = match bytes.get(i + 1).copied() {
                Some(b'@') => Some(i + 2),
                // an unbalanced '@(' is reported when the value is split
                Some(b'(') if !email => balanced_end(src, i + 1),
                Some(c) if !email && is_ident_start(c) => Some(implicit_end(src, i + 1)),
                _ => None,
            };
            if let Some(end) = end {
                if bytes[i + 1] != b'@' {
                    expression_end = Some(end);
                }
                i = end;
                continue;
            }
        }
        i += 1;
    }
    None
}

/// Drop whitespace-only indentation preceding a line-level construct
fn trim_indent(out: &mut Vec<Region>, indent: Option<&str>) {
    let Some(indent) = indent.filter(|i| !i.is_empty()) else {
        return;
    };
    if let Some(Region::Literal(last)) = out.last_mut() {
        if last.ends_with(indent) {
            last.truncate(last.len() - indent.len());
            if last.is_empty() {
                out.pop();
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str())
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && is_ident_char(bytes[i]) {
        i += 1;
    }
    i
}

/// End (exclusive) of the string literal opening at `start`
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// End (exclusive) of the bracket group opening at `open`, skipping strings
fn balanced_end(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut stack = Vec::new();
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => stack.push(b')'),
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            c @ (b')' | b']' | b'}') => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + 1);
                }
            }
            b'"' => {
                i = string_end(bytes, i)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// End of an implicit expression whose identifier starts at `start`.
/// A `.` only continues the expression when an identifier follows it.
fn implicit_end(src: &str, start: usize) -> usize {
    let bytes = src.as_bytes();
    let mut i = ident_end(bytes, start);
    loop {
        match bytes.get(i).copied() {
            Some(b'.') if bytes.get(i + 1).is_some_and(|&b| is_ident_start(b)) => {
                i = ident_end(bytes, i + 1);
            }
            Some(b'[' | b'(') => match balanced_end(src, i) {
                Some(end) => i = end,
                None => break,
            },
            _ => break,
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lit(s: &str) -> Region {
        Region::Literal(s.to_string())
    }

    fn expr(code: &str) -> Region {
        Region::Expression {
            code: code.to_string(),
            span: 0..0,
        }
    }

    /// Body with spans zeroed for comparison
    fn body(source: &str) -> Vec<Region> {
        fn strip(regions: Vec<Region>) -> Vec<Region> {
            regions
                .into_iter()
                .map(|r| match r {
                    Region::Expression { code, .. } => Region::Expression { code, span: 0..0 },
                    Region::Block { header, body } => Region::Block {
                        header,
                        body: strip(body),
                    },
                    Region::Attribute(mut attr) => {
                        for v in &mut attr.values {
                            if let AttributePart::Expression { span, .. } = &mut v.value {
                                *span = 0..0;
                            }
                        }
                        Region::Attribute(attr)
                    }
                    other => other,
                })
                .collect()
        }
        strip(scan(source).expect("should scan").body)
    }

    #[test]
    fn test_implicit_expression() {
        assert_eq!(
            body("Hello @Model.Name."),
            vec![lit("Hello "), expr("Model.Name"), lit(".")]
        );
    }

    #[test]
    fn test_implicit_expression_with_index_and_call() {
        assert_eq!(
            body(r#"<div>@Model.Dictionary["K1"].x</div> @Decorator("777")"#),
            vec![
                lit("<div>"),
                expr(r#"Model.Dictionary["K1"].x"#),
                lit("</div> "),
                expr(r#"Decorator("777")"#),
            ]
        );
    }

    #[test]
    fn test_explicit_expression() {
        assert_eq!(
            body("@(A + B)!"),
            vec![expr("A + B"), lit("!")]
        );
    }

    #[test]
    fn test_escapes_email_and_comments() {
        assert_eq!(
            body("@@home mail me@example.com @* hidden *@done"),
            vec![lit("@home mail me@example.com done")]
        );
    }

    #[test]
    fn test_directives_are_consumed() {
        let doc = scan("@inherits Site.Page\n@using A\n  @using B\n@using A\nbody").expect("scan");
        assert_eq!(doc.inherits.as_deref(), Some("Site.Page"));
        assert_eq!(doc.usings, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(doc.body, vec![lit("body")]);
    }

    #[test]
    fn test_last_inherits_wins() {
        let doc = scan("@inherits A\n@inherits B\n").expect("scan");
        assert_eq!(doc.inherits.as_deref(), Some("B"));
    }

    #[test]
    fn test_foreach_block_with_markup_lines() {
        assert_eq!(
            body("\n@foreach (var item in Model.Items)\n{\n    <div>@item.Key</div>\n}\nafter"),
            vec![
                lit("\n"),
                Region::Block {
                    header: "foreach (var item in Model.Items)".into(),
                    body: vec![lit("    <div>"), expr("item.Key"), lit("</div>\n")],
                },
                lit("after"),
            ]
        );
    }

    #[test]
    fn test_if_else_chain() {
        assert_eq!(
            body("@if (a) { <b>x</b> } else if (b) { <i>y</i> } else { @:z\n}"),
            vec![
                Region::Block {
                    header: "if (a)".into(),
                    body: vec![lit("<b>x</b>")],
                },
                Region::Block {
                    header: "else if (b)".into(),
                    body: vec![lit("<i>y</i>")],
                },
                Region::Block {
                    header: "else".into(),
                    body: vec![lit("z\n")],
                },
            ]
        );
    }

    #[test]
    fn test_code_block_statements_and_local_fn() {
        assert_eq!(
            body("<area>\n    @{ Recurse(3); }\n</area>\n@{\nfn Recurse(level) {\n  if (level <= 0) { return; }\n  <div>@level</div>\n  @{ Recurse(level - 1); }\n}\n}"),
            vec![
                lit("<area>\n"),
                Region::Code("Recurse(3);".into()),
                lit("</area>\n"),
                Region::Block {
                    header: "fn Recurse(level)".into(),
                    body: vec![
                        Region::Block {
                            header: "if (level <= 0)".into(),
                            body: vec![Region::Code("return;".into())],
                        },
                        lit("  <div>"),
                        expr("level"),
                        lit("</div>\n"),
                        Region::Code("Recurse(level - 1);".into()),
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_text_element_and_nested_same_name() {
        assert_eq!(
            body("@{ <text>plain</text> <div><div>in</div></div> <br> }"),
            vec![lit("plain<div><div>in</div></div><br>")]
        );
    }

    #[test]
    fn test_attribute_region() {
        let regions = body(
            r#"<div class="circle" style="background-color: hsla(@Model.Colour, 70%,   80%,1);">"#,
        );
        assert_eq!(regions[0], lit(r#"<div class="circle""#));
        let Region::Attribute(attr) = &regions[1] else {
            panic!("expected attribute, got {:?}", regions[1]);
        };
        assert_eq!(attr.name, "style");
        assert_eq!(attr.prefix, r#" style=""#);
        assert_eq!(attr.suffix, "\"");
        let pieces: Vec<(String, String)> = attr
            .values
            .iter()
            .map(|v| {
                let text = match &v.value {
                    AttributePart::Literal(t) => t.clone(),
                    AttributePart::Expression { code, .. } => format!("@{code}"),
                };
                (v.prefix.clone(), text)
            })
            .collect();
        assert_eq!(
            pieces,
            vec![
                ("".to_string(), "background-color:".to_string()),
                (" ".to_string(), "hsla(".to_string()),
                ("".to_string(), "@Model.Colour".to_string()),
                ("".to_string(), ",".to_string()),
                (" ".to_string(), "70%,".to_string()),
                ("   ".to_string(), "80%,1);".to_string()),
            ]
        );
        assert_eq!(regions[2], lit(">"));
    }

    #[test]
    fn test_single_quoted_attribute() {
        let regions = body(r#"<img src='@("test")'>"#);
        let Region::Attribute(attr) = &regions[1] else {
            panic!("expected attribute");
        };
        assert_eq!(attr.prefix, " src='");
        assert_eq!(attr.suffix, "'");
        assert_eq!(attr.values.len(), 1);
    }

    #[test]
    fn test_quotes_inside_attribute_expressions() {
        let regions = body(r#"<a href="@Model.D["k"]" class="@(A + " " + B) x">"#);
        let codes: Vec<Vec<String>> = regions
            .iter()
            .filter_map(|r| match r {
                Region::Attribute(attr) => Some(
                    attr.values
                        .iter()
                        .map(|v| match &v.value {
                            AttributePart::Literal(t) => format!("{}{t}", v.prefix),
                            AttributePart::Expression { code, .. } => format!("{}@{code}", v.prefix),
                        })
                        .collect(),
                ),
                _ => None,
            })
            .collect();
        assert_eq!(
            codes,
            vec![
                vec![r#"@Model.D["k"]"#.to_string()],
                vec![r#"@A + " " + B"#.to_string(), " x".to_string()],
            ]
        );
        assert_eq!(regions.last(), Some(&lit(">")));
    }

    #[test]
    fn test_adjacent_expressions() {
        assert_eq!(
            body("<p>@Model.A@Model.B</p>"),
            vec![lit("<p>"), expr("Model.A"), expr("Model.B"), lit("</p>")]
        );

        let regions = body(r#"<p title="@A@(B)">"#);
        let Region::Attribute(attr) = &regions[1] else {
            panic!("expected attribute, got {:?}", regions[1]);
        };
        assert_eq!(attr.values.len(), 2);
        assert!(attr
            .values
            .iter()
            .all(|v| matches!(v.value, AttributePart::Expression { .. })));
    }

    #[test]
    fn test_static_attributes_stay_literal() {
        assert_eq!(
            body(r#"<a href="mailto:me@example.com" data-x='@@' hidden>"#),
            vec![lit(r#"<a href="mailto:me@example.com" data-x='@' hidden>"#)]
        );
    }

    #[test]
    fn test_functions_block() {
        let doc = scan("@functions {\n  fn Twice(x) { return x * 2; }\n}\n@Twice(2)").expect("scan");
        assert_eq!(doc.functions.len(), 1);
        assert!(matches!(&doc.functions[0], Region::Block { header, .. } if header == "fn Twice(x)"));
        assert_eq!(doc.body.len(), 1);
    }

    #[test]
    fn test_unterminated_constructs() {
        let err = scan("Hello @(Model.Name").expect_err("should fail");
        assert_eq!(err.origin, Origin::Template);
        assert_eq!(err.span, 6..8);

        assert!(scan("@{ let x = 1;").is_err());
        assert!(scan("@* never closed").is_err());
        assert!(scan("@{ let x = 1 }").expect_err("missing ;").message.contains("';'"));
        assert!(scan("@if (x) Write(1);").expect_err("missing {").message.contains("'{'"));
        assert!(scan("@{ <div> }").is_err());
    }
}
