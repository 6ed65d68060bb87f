//! SQLite schema migrations for the tracker database.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[(1, schema::MIGRATION_V1_SQL), (2, schema::MIGRATION_V2_SQL)];

/// The schema version recorded in `PRAGMA user_version`.
///
/// # Errors
///
/// Fails when the pragma cannot be read or holds a negative value.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)))
}

/// Bring the database up to [`LATEST_SCHEMA_VERSION`] and return the
/// version it ends at.
///
/// Each pending step commits on its own together with the bumped
/// `user_version` and `snag_meta.schema_version`. Already-applied steps are
/// skipped.
///
/// # Errors
///
/// Returns the first SQLite error; earlier steps stay committed.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    let pending = MIGRATIONS.iter().filter(|(version, _)| *version > start);

    let mut reached = start;
    for &(version, ddl) in pending {
        let tx = conn.transaction()?;
        tx.execute_batch(ddl)?;
        tx.pragma_update(None, "user_version", i64::from(version))?;
        tx.execute(
            "UPDATE snag_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(version)],
        )?;
        tx.commit()?;
        tracing::debug!(from = reached, to = version, "migrated tracker schema");
        reached = version;
    }

    Ok(reached)
}
