// src/relay/event.rs
//! Typed stream events carried by the worker wire format
//!
//! Each SSE frame holds one JSON object discriminated by `"kind"`. A run
//! emits zero or more output events followed by exactly one terminal
//! `end` event carrying the aggregate result.

use serde::{Deserialize, Serialize};

/// One event of a worker's run stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StreamEvent {
    /// A chunk of captured standard output
    Stdout {
        #[serde(rename = "stdOutput")]
        std_output: String,
    },

    /// A chunk of captured standard error
    Stderr {
        #[serde(rename = "stdError")]
        std_error: String,
    },

    /// The snippet failed to compile
    CompilerError {
        #[serde(rename = "compilationError")]
        compilation_error: String,
    },

    /// The snippet threw during execution
    Error { error: String },

    /// Terminal event, emitted exactly once per run
    End(EndEvent),
}

impl StreamEvent {
    /// Whether this is the terminal event of a run
    pub fn is_end(&self) -> bool {
        matches!(self, StreamEvent::End(_))
    }
}

/// Aggregate payload of the terminal `end` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndEvent {
    /// Full captured stdout, if any
    #[serde(rename = "stdOutput", default, skip_serializing_if = "Option::is_none")]
    pub std_output: Option<String>,

    /// Full captured stderr, if any
    #[serde(rename = "stdError", default, skip_serializing_if = "Option::is_none")]
    pub std_error: Option<String>,

    /// Evaluated result value, if the snippet produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Compilation failure text, if compilation failed
    #[serde(rename = "compilerError", default, skip_serializing_if = "Option::is_none")]
    pub compiler_error: Option<String>,

    /// Runtime failure text, if execution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock run duration in milliseconds
    pub elapsed: u64,
}

impl EndEvent {
    /// Render the aggregate outcome as a single human-readable string
    ///
    /// Failures win over output: a runtime error is reported verbatim,
    /// then a compiler error, otherwise captured output plus the result
    /// value.
    pub fn final_text(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        if let Some(compiler_error) = &self.compiler_error {
            return compiler_error.clone();
        }

        let mut text = String::new();
        if let Some(std_output) = &self.std_output {
            text.push_str(std_output);
            text.push('\n');
        } else if let Some(std_error) = &self.std_error {
            text.push_str("stderr: ");
            text.push_str(std_error);
            text.push('\n');
        }

        if let Some(result) = &self.result {
            match result.as_str() {
                Some(s) => text.push_str(s),
                None => text.push_str(&result.to_string()),
            }
        }

        text.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_events_round_wire_names() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"kind":"stdout","stdOutput":"hello"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Stdout {
                std_output: "hello".into()
            }
        );

        let json = serde_json::to_value(&StreamEvent::Stderr {
            std_error: "oops".into(),
        })
        .unwrap();
        assert_eq!(json, json!({"kind": "stderr", "stdError": "oops"}));
    }

    #[test]
    fn test_compiler_error_discriminator() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"kind":"compilerError","compilationError":"CS0103"}"#)
                .unwrap();
        assert!(matches!(event, StreamEvent::CompilerError { .. }));
    }

    #[test]
    fn test_end_event_omits_absent_fields() {
        let end = StreamEvent::End(EndEvent {
            std_output: Some("7".into()),
            elapsed: 12,
            ..Default::default()
        });
        let json = serde_json::to_value(&end).unwrap();
        assert_eq!(json, json!({"kind": "end", "stdOutput": "7", "elapsed": 12}));
    }

    #[test]
    fn test_final_text_prefers_errors() {
        let end = EndEvent {
            std_output: Some("partial".into()),
            error: Some("NullReferenceException".into()),
            elapsed: 3,
            ..Default::default()
        };
        assert_eq!(end.final_text(), "NullReferenceException");

        let end = EndEvent {
            compiler_error: Some("syntax error".into()),
            elapsed: 3,
            ..Default::default()
        };
        assert_eq!(end.final_text(), "syntax error");
    }

    #[test]
    fn test_final_text_combines_output_and_result() {
        let end = EndEvent {
            std_output: Some("computing".into()),
            result: Some(json!(42)),
            elapsed: 3,
            ..Default::default()
        };
        assert_eq!(end.final_text(), "computing\n42");

        let end = EndEvent {
            std_error: Some("warning".into()),
            elapsed: 3,
            ..Default::default()
        };
        assert_eq!(end.final_text(), "stderr: warning");
    }
}
