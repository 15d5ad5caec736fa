//! SQLite implementation of [`EventBackend`].

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::backend::{CreateOutcome, EventBackend, ResolvedTypes};
use crate::db::Database;
use crate::error::{is_unique_violation, StoreError, StoreResult};
use crate::models::{
    dt_to_micros, DataType, Event, EventTypeRecord, TraitRow, TraitTypeRecord, TypeKey,
    TypeRecord,
};

/// [`EventBackend`] over the `event_type`, `trait_type`, `event` and
/// `trait` tables.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl EventBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn find_type(&self, key: &TypeKey) -> StoreResult<Option<TypeRecord>> {
        let key = key.clone();
        self.db.execute(move |conn| select_type(conn, &key)).await
    }

    #[instrument(skip(self))]
    async fn create_type(&self, key: &TypeKey) -> StoreResult<CreateOutcome> {
        let key = key.clone();
        self.db
            .execute(move |conn| {
                let inserted = match &key {
                    TypeKey::Trait { name, data_type } => conn.execute(
                        "INSERT INTO trait_type (\"desc\", data_type) VALUES (?1, ?2)",
                        rusqlite::params![name, data_type.code()],
                    ),
                    TypeKey::Event { name } => conn.execute(
                        "INSERT INTO event_type (\"desc\") VALUES (?1)",
                        rusqlite::params![name],
                    ),
                };
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(CreateOutcome::AlreadyExists),
                    Err(e) => return Err(StoreError::Sqlite(e)),
                }

                let id = conn.last_insert_rowid();
                debug!(%key, id, "type record created");
                let record = match key {
                    TypeKey::Trait { name, data_type } => TypeRecord::Trait(TraitTypeRecord {
                        id,
                        desc: name,
                        data_type,
                    }),
                    TypeKey::Event { name } => {
                        TypeRecord::Event(EventTypeRecord { id, desc: name })
                    }
                };
                Ok(CreateOutcome::Created(record))
            })
            .await
    }

    #[instrument(skip(self, event, types), fields(message_id = %event.message_id))]
    async fn persist_event(&self, event: &Event, types: &ResolvedTypes) -> StoreResult<i64> {
        if event.traits.len() != types.trait_types.len() {
            return Err(StoreError::InvalidArgument(format!(
                "event {} has {} traits but {} resolved trait types",
                event.message_id,
                event.traits.len(),
                types.trait_types.len()
            )));
        }

        let mut rows = Vec::with_capacity(event.traits.len());
        for (t, tt) in event.traits.iter().zip(&types.trait_types) {
            if tt.desc != t.name || tt.data_type != t.data_type() {
                return Err(StoreError::InvalidArgument(format!(
                    "trait {} ({}) resolved to mismatched type {} ({})",
                    t.name,
                    t.data_type(),
                    tt.desc,
                    tt.data_type
                )));
            }
            rows.push(TraitRow::new(tt.id, &t.value));
        }

        let message_id = event.message_id.clone();
        let generated = dt_to_micros(event.generated);
        let event_type_id = types.event_type.id;

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let inserted = tx.execute(
                    "INSERT INTO event (message_id, generated, event_type_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![message_id, generated, event_type_id],
                );
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {
                        return Err(StoreError::Duplicate {
                            entity: "event",
                            key: message_id,
                        });
                    }
                    Err(e) => return Err(StoreError::Sqlite(e)),
                }
                let event_id = tx.last_insert_rowid();

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO trait (event_id, trait_type_id, t_string, t_int, t_float, t_datetime) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for row in &rows {
                        stmt.execute(rusqlite::params![
                            event_id,
                            row.trait_type_id,
                            row.t_string,
                            row.t_int,
                            row.t_float,
                            row.t_datetime,
                        ])?;
                    }
                }

                tx.commit()?;
                debug!(message_id = %message_id, event_id, traits = rows.len(), "event persisted");
                Ok(event_id)
            })
            .await
    }
}

fn select_type(conn: &Connection, key: &TypeKey) -> StoreResult<Option<TypeRecord>> {
    let result = match key {
        TypeKey::Trait { name, data_type } => conn.query_row(
            "SELECT id, \"desc\", data_type FROM trait_type WHERE \"desc\" = ?1 AND data_type = ?2",
            rusqlite::params![name, data_type.code()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    Some(row.get::<_, i64>(2)?),
                ))
            },
        ),
        TypeKey::Event { name } => conn.query_row(
            "SELECT id, \"desc\" FROM event_type WHERE \"desc\" = ?1",
            rusqlite::params![name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, None)),
        ),
    };

    match result {
        Ok((id, desc, Some(code))) => Ok(Some(TypeRecord::Trait(TraitTypeRecord {
            id,
            desc,
            data_type: DataType::from_code(code)?,
        }))),
        Ok((id, desc, None)) => Ok(Some(TypeRecord::Event(EventTypeRecord { id, desc }))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Sqlite(e)),
    }
}

// ── tests ────────────────────────────────────────────────────────────
