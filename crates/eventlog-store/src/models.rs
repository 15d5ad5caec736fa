//! Event, trait and type-record models.
//!
//! A [`Trait`] carries its value as the [`TraitValue`] sum type; only at
//! the storage boundary does it become a [`TraitRow`] with four nullable
//! typed columns, exactly one of which is set.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Data types and trait values
// ═══════════════════════════════════════════════════════════════════════

/// The value kind of a trait, stored as an integer in `trait_type.data_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Integer,
    Float,
    Datetime,
}

impl DataType {
    /// Stable integer code persisted in the database.
    pub fn code(self) -> i64 {
        match self {
            Self::String => 1,
            Self::Integer => 2,
            Self::Float => 3,
            Self::Datetime => 4,
        }
    }

    /// Inverse of [`DataType::code`].
    pub fn from_code(code: i64) -> StoreResult<Self> {
        match code {
            1 => Ok(Self::String),
            2 => Ok(Self::Integer),
            3 => Ok(Self::Float),
            4 => Ok(Self::Datetime),
            other => Err(StoreError::Corrupt(format!("unknown trait data type code {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Datetime => "datetime",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed trait value. Exactly one payload, selected by the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TraitValue {
    String(String),
    Integer(i64),
    Float(f64),
    Datetime(DateTime<Utc>),
}

impl TraitValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Integer(_) => DataType::Integer,
            Self::Float(_) => DataType::Float,
            Self::Datetime(_) => DataType::Datetime,
        }
    }
}

/// A named, typed attribute attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    pub name: String,
    pub value: TraitValue,
}

impl Trait {
    pub fn new(name: impl Into<String>, value: TraitValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

/// A single recorded notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Producer-assigned identifier; unique across the store.
    pub message_id: String,
    pub event_type: String,
    pub generated: DateTime<Utc>,
    #[serde(default)]
    pub traits: Vec<Trait>,
}

impl Event {
    pub fn new(
        message_id: impl Into<String>,
        event_type: impl Into<String>,
        generated: DateTime<Utc>,
        traits: Vec<Trait>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            event_type: event_type.into(),
            generated,
            traits,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Datetime encoding
// ═══════════════════════════════════════════════════════════════════════

/// Encode `dt` as integer microseconds since the epoch.
///
/// This is decimal seconds with six fractional digits held as a scaled
/// integer, so every representable instant round-trips exactly.
/// Sub-microsecond precision is truncated.
pub fn dt_to_micros(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

/// Decode a value produced by [`dt_to_micros`].
pub fn micros_to_dt(micros: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {micros}")))
}

// ═══════════════════════════════════════════════════════════════════════
//  Storage row
// ═══════════════════════════════════════════════════════════════════════

/// A trait as laid out in the `trait` table.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitRow {
    pub trait_type_id: i64,
    pub t_string: Option<String>,
    pub t_int: Option<i64>,
    pub t_float: Option<f64>,
    pub t_datetime: Option<i64>,
}

impl TraitRow {
    /// Spread `value` into the column matching its data type.
    pub fn new(trait_type_id: i64, value: &TraitValue) -> Self {
        let mut row = Self {
            trait_type_id,
            t_string: None,
            t_int: None,
            t_float: None,
            t_datetime: None,
        };
        match value {
            TraitValue::String(s) => row.t_string = Some(s.clone()),
            TraitValue::Integer(i) => row.t_int = Some(*i),
            TraitValue::Float(f) => row.t_float = Some(*f),
            TraitValue::Datetime(dt) => row.t_datetime = Some(dt_to_micros(*dt)),
        }
        row
    }

    /// Rebuild the value, reading only the column `data_type` selects.
    pub fn value(&self, data_type: DataType) -> StoreResult<TraitValue> {
        let missing = || {
            StoreError::Corrupt(format!(
                "trait row for type {} has no {data_type} value",
                self.trait_type_id
            ))
        };
        Ok(match data_type {
            DataType::String => TraitValue::String(self.t_string.clone().ok_or_else(missing)?),
            DataType::Integer => TraitValue::Integer(self.t_int.ok_or_else(missing)?),
            DataType::Float => TraitValue::Float(self.t_float.ok_or_else(missing)?),
            DataType::Datetime => {
                TraitValue::Datetime(micros_to_dt(self.t_datetime.ok_or_else(missing)?)?)
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Type records
// ═══════════════════════════════════════════════════════════════════════

/// Durable identity of a `(name, data_type)` trait kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitTypeRecord {
    pub id: i64,
    pub desc: String,
    pub data_type: DataType,
}

/// Durable identity of an event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeRecord {
    pub id: i64,
    pub desc: String,
}

/// Either kind of type record, as held in the registry cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRecord {
    Trait(TraitTypeRecord),
    Event(EventTypeRecord),
}

impl TypeRecord {
    pub fn id(&self) -> i64 {
        match self {
            Self::Trait(r) => r.id,
            Self::Event(r) => r.id,
        }
    }

    pub fn desc(&self) -> &str {
        match self {
            Self::Trait(r) => &r.desc,
            Self::Event(r) => &r.desc,
        }
    }
}

/// Logical key a type record is looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Trait { name: String, data_type: DataType },
    Event { name: String },
}

impl TypeKey {
    pub fn trait_type(name: impl Into<String>, data_type: DataType) -> Self {
        Self::Trait {
            name: name.into(),
            data_type,
        }
    }

    pub fn event_type(name: impl Into<String>) -> Self {
        Self::Event { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Trait { name, .. } | Self::Event { name } => name,
        }
    }

    /// Key used in the registry's recency cache.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Trait { name, data_type } => format!("trait_type:{name}:{}", data_type.code()),
            Self::Event { name } => format!("event_type:{name}"),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trait { name, data_type } => write!(f, "trait type {name} ({data_type})"),
            Self::Event { name } => write!(f, "event type {name}"),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap() + Duration::microseconds(123_456)
    }

    fn populated(row: &TraitRow) -> usize {
        [
            row.t_string.is_some(),
            row.t_int.is_some(),
            row.t_float.is_some(),
            row.t_datetime.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    #[test]
    fn string_trait_row() {
        let t = Trait::new("Foo", TraitValue::String("my_text".into()));
        let row = TraitRow::new(7, &t.value);
        assert_eq!(row.trait_type_id, 7);
        assert_eq!(row.t_string.as_deref(), Some("my_text"));
        assert_eq!(populated(&row), 1);
        assert_eq!(row.value(t.data_type()).unwrap(), t.value);
    }

    #[test]
    fn int_trait_row() {
        let t = Trait::new("Foo", TraitValue::Integer(100));
        let row = TraitRow::new(1, &t.value);
        assert_eq!(row.t_int, Some(100));
        assert_eq!(populated(&row), 1);
        assert_eq!(row.value(DataType::Integer).unwrap(), t.value);
    }

    #[test]
    fn float_trait_row() {
        let t = Trait::new("Foo", TraitValue::Float(123.456));
        let row = TraitRow::new(1, &t.value);
        assert_eq!(row.t_float, Some(123.456));
        assert_eq!(populated(&row), 1);
        assert_eq!(row.value(DataType::Float).unwrap(), t.value);
    }

    #[test]
    fn datetime_trait_row() {
        let now = sample_time();
        let t = Trait::new("Foo", TraitValue::Datetime(now));
        let row = TraitRow::new(1, &t.value);
        assert_eq!(row.t_datetime, Some(dt_to_micros(now)));
        assert_eq!(populated(&row), 1);
        assert_eq!(row.value(DataType::Datetime).unwrap(), t.value);
    }

    #[test]
    fn reading_the_wrong_column_is_corrupt() {
        let row = TraitRow::new(1, &TraitValue::Integer(5));
        assert!(matches!(row.value(DataType::String), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn data_type_codes_round_trip() {
        for dt in [DataType::String, DataType::Integer, DataType::Float, DataType::Datetime] {
            assert_eq!(DataType::from_code(dt.code()).unwrap(), dt);
        }
        assert!(DataType::from_code(0).is_err());
    }

    #[test]
    fn micros_encoding_keeps_microseconds() {
        let t = sample_time();
        assert_eq!(micros_to_dt(dt_to_micros(t)).unwrap(), t);
        assert!(micros_to_dt(i64::MAX).is_err());
    }

    #[test]
    fn far_future_datetimes_keep_microseconds() {
        let t = Utc.with_ymd_and_hms(2500, 1, 1, 0, 0, 0).unwrap() + Duration::microseconds(123_457);
        assert_eq!(micros_to_dt(dt_to_micros(t)).unwrap(), t);

        let row = TraitRow::new(1, &TraitValue::Datetime(t));
        assert_eq!(row.value(DataType::Datetime).unwrap(), TraitValue::Datetime(t));
    }

    #[test]
    fn cache_keys_separate_kinds() {
        let a = TypeKey::trait_type("foo", DataType::String);
        let b = TypeKey::trait_type("foo", DataType::Integer);
        let c = TypeKey::event_type("foo");
        assert_eq!(a.cache_key(), "trait_type:foo:1");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(c.cache_key(), "event_type:foo");
    }

    #[test]
    fn event_json_shape() {
        let json = r#"{
            "message_id": "m-1",
            "event_type": "compute.instance.create.end",
            "generated": "2024-05-01T12:30:45Z",
            "traits": [
                {"name": "host", "value": {"type": "string", "value": "node-1"}},
                {"name": "memory_mb", "value": {"type": "integer", "value": 2048}}
            ]
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.traits.len(), 2);
        assert_eq!(event.traits[1].value, TraitValue::Integer(2048));
        assert_eq!(event.traits[0].data_type(), DataType::String);
    }
}
