//! Read-side queries over stored events.
//!
//! The functions here are synchronous and take a `&Connection`; the
//! [`EventStore`](crate::store::EventStore) facade runs them on the
//! blocking pool through `Database::execute`.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::Connection;

use crate::error::StoreResult;
use crate::models::{dt_to_micros, micros_to_dt, DataType, Event, Trait, TraitRow, TraitValue};

/// Match events carrying a trait with this name and exact value.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitFilter {
    pub name: String,
    pub value: TraitValue,
}

impl TraitFilter {
    pub fn new(name: impl Into<String>, value: TraitValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Criteria for [`select_events`]. Every field left empty matches all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Inclusive lower bound on `generated`.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `generated`.
    pub end: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub traits: Vec<TraitFilter>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_trait(mut self, filter: TraitFilter) -> Self {
        self.traits.push(filter);
        self
    }
}

/// Column of the `trait` table holding values of `data_type`.
fn value_column(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String => "t_string",
        DataType::Integer => "t_int",
        DataType::Float => "t_float",
        DataType::Datetime => "t_datetime",
    }
}

fn sql_value(value: &TraitValue) -> Value {
    match value {
        TraitValue::String(s) => Value::Text(s.clone()),
        TraitValue::Integer(i) => Value::Integer(*i),
        TraitValue::Float(f) => Value::Real(*f),
        TraitValue::Datetime(dt) => Value::Integer(dt_to_micros(*dt)),
    }
}

/// Events matching `filter`, ordered by `generated` then insertion.
pub fn select_events(conn: &Connection, filter: &EventFilter) -> StoreResult<Vec<Event>> {
    let mut sql = String::from(
        "SELECT e.id, e.message_id, e.generated, et.\"desc\" \
         FROM event e JOIN event_type et ON et.id = e.event_type_id WHERE 1 = 1",
    );
    let mut params: Vec<Value> = Vec::new();

    if let Some(start) = filter.start {
        params.push(Value::Integer(dt_to_micros(start)));
        sql.push_str(&format!(" AND e.generated >= ?{}", params.len()));
    }
    if let Some(end) = filter.end {
        params.push(Value::Integer(dt_to_micros(end)));
        sql.push_str(&format!(" AND e.generated < ?{}", params.len()));
    }
    if let Some(event_type) = &filter.event_type {
        params.push(Value::Text(event_type.clone()));
        sql.push_str(&format!(" AND et.\"desc\" = ?{}", params.len()));
    }
    for tf in &filter.traits {
        let data_type = tf.value.data_type();
        params.push(Value::Text(tf.name.clone()));
        let name_idx = params.len();
        params.push(Value::Integer(data_type.code()));
        let type_idx = params.len();
        params.push(sql_value(&tf.value));
        let value_idx = params.len();
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM trait t JOIN trait_type tt ON tt.id = t.trait_type_id \
             WHERE t.event_id = e.id AND tt.\"desc\" = ?{name_idx} AND tt.data_type = ?{type_idx} \
             AND t.{} = ?{value_idx})",
            value_column(data_type)
        ));
    }
    sql.push_str(" ORDER BY e.generated, e.id");

    let mut stmt = conn.prepare(&sql)?;
    let headers = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut events = Vec::with_capacity(headers.len());
    for (id, message_id, generated, event_type) in headers {
        events.push(Event {
            message_id,
            event_type,
            generated: micros_to_dt(generated)?,
            traits: select_event_traits(conn, id)?,
        });
    }
    Ok(events)
}

/// Distinct event type names, sorted.
pub fn select_event_types(conn: &Connection) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT \"desc\" FROM event_type ORDER BY \"desc\"")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

/// Distinct `(trait name, data type)` pairs seen on events of `event_type`.
pub fn select_trait_types(conn: &Connection, event_type: &str) -> StoreResult<Vec<(String, DataType)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT tt.\"desc\", tt.data_type \
         FROM trait_type tt \
         JOIN trait t ON t.trait_type_id = tt.id \
         JOIN event e ON e.id = t.event_id \
         JOIN event_type et ON et.id = e.event_type_id \
         WHERE et.\"desc\" = ?1 \
         ORDER BY tt.\"desc\", tt.data_type",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![event_type], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(name, code)| Ok((name, DataType::from_code(code)?)))
        .collect()
}

/// Every trait on events of `event_type`, optionally only those named
/// `trait_name`.
pub fn select_traits(
    conn: &Connection,
    event_type: &str,
    trait_name: Option<&str>,
) -> StoreResult<Vec<Trait>> {
    let mut stmt = conn.prepare(
        "SELECT tt.\"desc\", tt.data_type, t.trait_type_id, t.t_string, t.t_int, t.t_float, t.t_datetime \
         FROM trait t \
         JOIN trait_type tt ON tt.id = t.trait_type_id \
         JOIN event e ON e.id = t.event_id \
         JOIN event_type et ON et.id = e.event_type_id \
         WHERE et.\"desc\" = ?1 AND (?2 IS NULL OR tt.\"desc\" = ?2) \
         ORDER BY e.generated, e.id, t.rowid",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![event_type, trait_name], stored_trait)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(StoredTrait::into_trait).collect()
}

fn select_event_traits(conn: &Connection, event_id: i64) -> StoreResult<Vec<Trait>> {
    let mut stmt = conn.prepare_cached(
        "SELECT tt.\"desc\", tt.data_type, t.trait_type_id, t.t_string, t.t_int, t.t_float, t.t_datetime \
         FROM trait t JOIN trait_type tt ON tt.id = t.trait_type_id \
         WHERE t.event_id = ?1 ORDER BY t.rowid",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![event_id], stored_trait)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(StoredTrait::into_trait).collect()
}

// ── row mapping ──────────────────────────────────────────────────────

struct StoredTrait {
    name: String,
    data_type: i64,
    row: TraitRow,
}

impl StoredTrait {
    fn into_trait(self) -> StoreResult<Trait> {
        let data_type = DataType::from_code(self.data_type)?;
        Ok(Trait {
            name: self.name,
            value: self.row.value(data_type)?,
        })
    }
}

fn stored_trait(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTrait> {
    Ok(StoredTrait {
        name: row.get(0)?,
        data_type: row.get(1)?,
        row: TraitRow {
            trait_type_id: row.get(2)?,
            t_string: row.get(3)?,
            t_int: row.get(4)?,
            t_float: row.get(5)?,
            t_datetime: row.get(6)?,
        },
    })
}

// ── tests ────────────────────────────────────────────────────────────
