//! Inbound message from the LINE webhook: the record persisted for every text event.

use chrono::{DateTime, FixedOffset, Utc};

/// One text message as received from the platform. Built once per event and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
    pub timestamp_utc: DateTime<Utc>,
    /// Group or room id; empty for a one-to-one chat.
    pub conversation_id: String,
}

impl InboundMessage {
    /// Timestamp rendered as `%Y-%m-%d %H:%M:%S` in the given offset (the stored `date` column).
    pub fn formatted_date(&self, offset: FixedOffset) -> String {
        self.timestamp_utc
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_at(ms: i64) -> InboundMessage {
        InboundMessage {
            sender_id: "U1".to_string(),
            text: "hi".to_string(),
            timestamp_utc: DateTime::<Utc>::from_timestamp_millis(ms).unwrap(),
            conversation_id: String::new(),
        }
    }

    #[test]
    fn formats_in_utc() {
        let msg = message_at(1_685_555_331_000);
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(msg.formatted_date(utc), "2023-05-31 17:48:51");
    }

    #[test]
    fn formats_with_offset() {
        let msg = message_at(1_685_555_331_000);
        let taipei = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(msg.formatted_date(taipei), "2023-06-01 01:48:51");
    }
}
