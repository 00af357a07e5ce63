//! Output buffer and the attribute sub-protocol state machine

use crate::error::RenderError;
use crate::value::Value;

use super::html_encode;

#[derive(Debug, Default)]
enum AttributeState {
    #[default]
    Idle,
    InAttribute {
        name: String,
        suffix: String,
        expected: usize,
        written: usize,
    },
}

/// Text written by one template instance
#[derive(Debug, Default)]
pub(crate) struct Output {
    buffer: String,
    state: AttributeState,
}

impl Output {
    /// Encoded write; raw markup passes through, null writes nothing
    pub fn write(&mut self, value: &Value) {
        match value {
            Value::Null => {}
            Value::Raw(markup) => self.buffer.push_str(markup),
            other => self.buffer.push_str(&html_encode(&other.to_display())),
        }
    }

    pub fn write_literal(&mut self, value: &Value) {
        self.buffer.push_str(&value.to_display());
    }

    pub fn begin_attribute(
        &mut self,
        name: &str,
        prefix: &str,
        suffix: &str,
        expected: usize,
    ) -> Result<(), RenderError> {
        if let AttributeState::InAttribute { .. } = self.state {
            return Err(RenderError::contract(
                "BeginWriteAttribute",
                "an attribute is already open",
            ));
        }
        self.buffer.push_str(prefix);
        self.state = AttributeState::InAttribute {
            name: name.to_string(),
            suffix: suffix.to_string(),
            expected,
            written: 0,
        };
        Ok(())
    }

    pub fn attribute_value(&mut self, prefix: &str, value: &Value) -> Result<(), RenderError> {
        let AttributeState::InAttribute { written, .. } = &mut self.state else {
            return Err(RenderError::contract("WriteAttributeValue", "no attribute is open"));
        };
        *written += 1;
        self.buffer.push_str(prefix);
        self.buffer.push_str(&value.to_display());
        Ok(())
    }

    pub fn end_attribute(&mut self) -> Result<(), RenderError> {
        match std::mem::take(&mut self.state) {
            AttributeState::Idle => Err(RenderError::contract(
                "EndWriteAttribute",
                "no attribute is open",
            )),
            AttributeState::InAttribute {
                name,
                suffix,
                expected,
                written,
            } => {
                if written != expected {
                    tracing::trace!(attribute = %name, expected, written, "attribute value count differs");
                }
                self.buffer.push_str(&suffix);
                Ok(())
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, AttributeState::Idle)
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_protocol() {
        let mut out = Output::default();
        out.begin_attribute("style", "x=\"", "\"", 1).expect("begin");
        out.attribute_value("", &Value::from("value")).expect("value");
        out.end_attribute().expect("end");
        assert_eq!(out.as_str(), "x=\"value\"");
        assert!(out.is_idle());
    }

    #[test]
    fn test_out_of_order_calls_are_violations() {
        let mut out = Output::default();
        let err = out
            .attribute_value("", &Value::from("v"))
            .expect_err("value before begin");
        assert!(err.is_contract_violation());
        assert!(out.end_attribute().expect_err("end before begin").is_contract_violation());

        out.begin_attribute("a", " a=\"", "\"", 0).expect("begin");
        assert!(out
            .begin_attribute("b", " b=\"", "\"", 0)
            .expect_err("nested begin")
            .is_contract_violation());
    }

    #[test]
    fn test_write_encodes_and_skips_null() {
        let mut out = Output::default();
        out.write(&Value::Null);
        out.write(&Value::from("<a href='x'>"));
        out.write(&Value::Raw("<br>".to_string()));
        out.write_literal(&Value::from("<p>"));
        assert_eq!(out.as_str(), "&lt;a href=&#39;x&#39;&gt;<br><p>");
    }

    #[test]
    fn test_attribute_values_are_verbatim() {
        let mut out = Output::default();
        out.begin_attribute("title", " title=\"", "\"", 2).expect("begin");
        out.attribute_value("", &Value::from("a&b")).expect("value");
        out.attribute_value(" ", &Value::Int(3)).expect("value");
        out.end_attribute().expect("end");
        assert_eq!(out.into_string(), " title=\"a&b 3\"");
    }
}
