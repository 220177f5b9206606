//! Envelope wire format.
//!
//! Clients send either plain text (an implicit broadcast) or a JSON object:
//!
//! ```json
//! {"source": "alice", "targets": ["bob", "carol"], "dataBody": {"any": "json"}}
//! ```
//!
//! Only `targets` affects routing. `source` is whatever the client wrote; the
//! router resolves the real sender from the connection id and forwards the
//! raw text untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source name used on envelopes the relay itself originates.
pub const SERVER_SOURCE: &str = "Server";

/// Body of the reply sent to a connection that has not joined yet.
pub const NOT_JOINED_BODY: &str = "Channel Not Join";

/// Structured message exchanged between clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Sender as written by the client. Any JSON type; never used for routing
    #[serde(default)]
    pub source: Option<serde_json::Value>,
    /// Destination usernames. Empty or absent means broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
    /// Opaque payload
    #[serde(default)]
    pub data_body: serde_json::Value,
}

impl Envelope {
    /// Envelope originated by the relay, addressed to nobody in particular.
    pub fn from_server(body: impl Into<serde_json::Value>) -> Self {
        Self { source: Some(SERVER_SOURCE.into()), targets: None, data_body: body.into() }
    }

    /// Reply for a frame that arrived on a connection with no username.
    pub fn not_joined() -> Self {
        Self::from_server(NOT_JOINED_BODY)
    }

    /// Explicit recipients, if the envelope names any.
    ///
    /// `None` for an absent or empty list: both mean broadcast.
    pub fn explicit_targets(&self) -> Option<&[String]> {
        self.targets.as_deref().filter(|targets| !targets.is_empty())
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }
}

/// Envelope encode/decode failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Text looked like a JSON object but did not decode as an envelope.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// Envelope could not be serialized.
    #[error("envelope encode failed: {0}")]
    Encode(String),
}

/// Shape of an inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `{...}`-delimited text that decoded as an envelope.
    Structured(Envelope),
    /// Anything else. Broadcast as-is.
    Plain,
}

impl Payload {
    /// Classify and, where structured, decode an inbound text frame.
    ///
    /// Text counts as structured when it starts with `{` and ends with `}`.
    /// Plain text that happens to use those delimiters is therefore parsed
    /// and, if it is not valid JSON, rejected rather than broadcast.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        if !looks_structured(text) {
            return Ok(Self::Plain);
        }

        serde_json::from_str(text)
            .map(Self::Structured)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Explicit recipients carried by the payload, if any.
    pub fn explicit_targets(&self) -> Option<&[String]> {
        match self {
            Self::Structured(envelope) => envelope.explicit_targets(),
            Self::Plain => None,
        }
    }
}

fn looks_structured(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}')
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_text_is_plain() {
        assert_eq!(Payload::parse("hello everyone").unwrap(), Payload::Plain);
        assert_eq!(Payload::parse("").unwrap(), Payload::Plain);
        assert_eq!(Payload::parse("{not closed").unwrap(), Payload::Plain);
        assert_eq!(Payload::parse(" {\"targets\":[]}").unwrap(), Payload::Plain);
    }

    #[test]
    fn structured_envelope_decodes_all_fields() {
        let payload =
            Payload::parse(r#"{"source":"alice","targets":["bob"],"dataBody":{"n":1}}"#).unwrap();

        let Payload::Structured(envelope) = payload else {
            panic!("expected structured payload");
        };
        assert_eq!(envelope.source, Some(json!("alice")));
        assert_eq!(envelope.targets, Some(vec!["bob".to_string()]));
        assert_eq!(envelope.data_body, json!({"n": 1}));
    }

    #[test]
    fn missing_fields_default() {
        let Payload::Structured(envelope) = Payload::parse("{}").unwrap() else {
            panic!("expected structured payload");
        };
        assert_eq!(envelope, Envelope::default());
        assert!(envelope.explicit_targets().is_none());
    }

    #[test]
    fn empty_and_null_targets_mean_broadcast() {
        for text in [r#"{"targets":[]}"#, r#"{"targets":null}"#, r#"{"dataBody":"x"}"#] {
            let payload = Payload::parse(text).unwrap();
            assert!(payload.explicit_targets().is_none(), "{text}");
        }
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let payload = Payload::parse(r#"{"targets":["bob"],"priority":9}"#).unwrap();
        assert_eq!(payload.explicit_targets(), Some(&["bob".to_string()][..]));
    }

    #[test]
    fn source_of_any_type_is_accepted() {
        for text in [
            r#"{"source":42,"dataBody":"hi"}"#,
            r#"{"source":{"name":"alice"},"targets":["bob"]}"#,
            r#"{"source":["x"],"targets":[]}"#,
            r#"{"source":null}"#,
        ] {
            assert!(matches!(Payload::parse(text), Ok(Payload::Structured(_))), "{text}");
        }
    }

    #[test]
    fn braced_garbage_is_malformed() {
        assert!(matches!(Payload::parse("{oops}"), Err(EnvelopeError::Malformed(_))));
        assert!(matches!(
            Payload::parse(r#"{"targets":"bob"}"#),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(Payload::parse(r#"{"targets":[1,2]}"#), Err(EnvelopeError::Malformed(_))));
    }

    #[test]
    fn not_joined_reply_wire_format() {
        assert_eq!(
            Envelope::not_joined().to_json().unwrap(),
            r#"{"source":"Server","dataBody":"Channel Not Join"}"#
        );
    }

    #[test]
    fn targets_are_serialized_when_present() {
        let envelope = Envelope {
            source: Some(json!("alice")),
            targets: Some(vec!["bob".to_string()]),
            data_body: json!("hi"),
        };
        assert_eq!(
            envelope.to_json().unwrap(),
            r#"{"source":"alice","targets":["bob"],"dataBody":"hi"}"#
        );
    }
}
