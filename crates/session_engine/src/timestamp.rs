//! Frame timestamp resolution.

use contracts::{Frame, GENERIC_TIMESTAMP_FIELD};

/// Where a frame's timestamp came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// The configured timestamp field
    Configured,
    /// The generic `ts_ms` field
    Generic,
    /// Local receipt time; the frame carried no usable timestamp
    ReceiptTime,
}

/// Resolve a frame's timestamp in milliseconds
///
/// Tries the configured field, then the generic field, then falls back to
/// `receipt_ms`. Unless the configured field already held a usable value,
/// the resolved timestamp is written back under the configured field so
/// forwarded frames always carry it.
pub fn resolve_timestamp(
    frame: &mut Frame,
    timestamp_field: &str,
    receipt_ms: i64,
) -> (i64, TimestampSource) {
    if let Some(ts) = frame.timestamp_ms(timestamp_field) {
        return (ts, TimestampSource::Configured);
    }

    let (ts, source) = match frame.timestamp_ms(GENERIC_TIMESTAMP_FIELD) {
        Some(ts) => (ts, TimestampSource::Generic),
        None => (receipt_ms, TimestampSource::ReceiptTime),
    };
    frame.insert(timestamp_field, ts);
    (ts, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_configured_field_wins() {
        let mut frame = Frame::new().with("t", "1234").with("ts_ms", 99);
        assert_eq!(
            resolve_timestamp(&mut frame, "t", 5),
            (1234, TimestampSource::Configured)
        );
        // left as the producer wrote it
        assert_eq!(frame.get("t"), Some(&json!("1234")));
    }

    #[test]
    fn test_generic_fallback_is_written_back() {
        let mut frame = Frame::new().with("ts_ms", 4200);
        assert_eq!(
            resolve_timestamp(&mut frame, "t", 5),
            (4200, TimestampSource::Generic)
        );
        assert_eq!(frame.get("t"), Some(&json!(4200)));
    }

    #[test]
    fn test_receipt_time_fallback() {
        let mut frame = Frame::new().with("ts_ms", "later");
        assert_eq!(
            resolve_timestamp(&mut frame, "ts_ms", 1_700_000_000_000),
            (1_700_000_000_000, TimestampSource::ReceiptTime)
        );
        assert_eq!(frame.get("ts_ms"), Some(&json!(1_700_000_000_000_i64)));
    }
}
