use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Value object: Event ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An external fact published for the execution engine to correlate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier, assigned by the persistence provider on creation
    pub id: Option<EventId>,

    /// Event name
    pub event_name: String,

    /// Correlation key the engine matches waiting steps against
    pub event_key: String,

    /// Opaque payload
    pub event_data: Option<Value>,

    /// When the event takes effect
    pub event_time: DateTime<Utc>,

    /// Set by the engine once consumed
    pub is_processed: bool,
}

impl Event {
    /// Create an unprocessed event, effective now unless a time is supplied
    pub fn new<Tz: TimeZone>(
        event_name: impl Into<String>,
        event_key: impl Into<String>,
        event_data: Option<Value>,
        effective_date: Option<DateTime<Tz>>,
    ) -> Self {
        Self {
            id: None,
            event_name: event_name.into(),
            event_key: event_key.into(),
            event_data,
            event_time: effective_date
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            is_processed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use serde_json::json;

    #[test]
    fn test_effective_date_converted_to_utc() {
        let offset = FixedOffset::east_opt(5 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let event = Event::new("paid", "order-1", Some(json!(10)), Some(local));

        assert_eq!(
            event.event_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
        );
        assert!(!event.is_processed);
        assert!(event.id.is_none());
    }

    #[test]
    fn test_missing_effective_date_defaults_to_now() {
        let before = Utc::now();
        let event = Event::new::<Utc>("paid", "order-1", None, None);
        let after = Utc::now();

        assert!(event.event_time >= before && event.event_time <= after);
        assert_eq!(event.event_data, None);
    }
}
