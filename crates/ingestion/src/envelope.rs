//! Stream entry envelope normalisation.

use std::collections::HashMap;

use contracts::Frame;
use serde_json::Value;

/// How a frame was extracted from a stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// Parsed from the JSON payload field
    Payload,
    /// Payload field present but not a JSON object; raw fields used instead
    RawFallback,
    /// No payload field; raw fields used as the frame
    Raw,
}

/// Turn raw stream fields into a frame
///
/// If `payload_field` is present and holds a JSON object, that object is the
/// frame. Otherwise the raw fields (all strings) are the frame, unchanged,
/// payload field included.
pub fn normalize(fields: &HashMap<String, String>, payload_field: &str) -> (Frame, Envelope) {
    let Some(payload) = fields.get(payload_field) else {
        return (Frame::from_fields(fields), Envelope::Raw);
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => (Frame::from(map), Envelope::Payload),
        _ => (Frame::from_fields(fields), Envelope::RawFallback),
    }
}
