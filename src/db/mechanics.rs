//! Mechanic registry and point/period bookkeeping.

use super::{Database, now, optional, required_text};
use crate::accounting::PointDelta;
use crate::error::ServiceError;
use crate::types::Mechanic;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::{debug, info, warn};

pub fn parse_mechanic_row(row: &Row) -> rusqlite::Result<Mechanic> {
    Ok(Mechanic {
        name: row.get("name")?,
        total_points: row.get("total_points")?,
        total_tasks: row.get("total_tasks")?,
        last_reset_date: row.get("last_reset_date")?,
        created_at: row.get("created_at")?,
    })
}

/// Internal helper to get a mechanic using an existing connection.
pub(crate) fn get_mechanic_internal(conn: &Connection, name: &str) -> Result<Option<Mechanic>> {
    optional(conn.query_row(
        "SELECT * FROM mechanics WHERE name = ?1",
        params![name],
        parse_mechanic_row,
    ))
}

/// Apply a point delta to one mechanic.
///
/// Unknown names are tolerated: nothing is updated and `None` is returned.
pub(crate) fn apply_point_delta(conn: &Connection, delta: &PointDelta) -> Result<Option<Mechanic>> {
    let changed = conn.execute(
        "UPDATE mechanics
         SET total_points = total_points + ?1,
             total_tasks = total_tasks + ?2
         WHERE name = ?3",
        params![delta.points, delta.tasks, delta.mechanic_name],
    )?;

    if changed == 0 {
        warn!(
            mechanic = %delta.mechanic_name,
            points = delta.points,
            "Point delta for unknown mechanic ignored"
        );
        return Ok(None);
    }

    debug!(
        mechanic = %delta.mechanic_name,
        points = delta.points,
        tasks = delta.tasks,
        "Applied point delta"
    );
    get_mechanic_internal(conn, &delta.mechanic_name)
}

impl Database {
    /// Register a mechanic with zeroed totals.
    pub fn create_mechanic(&self, name: Option<String>) -> Result<Mechanic> {
        let name = required_text(name, "name")?;
        let created_at = now();

        self.with_tx(|tx| {
            if get_mechanic_internal(tx, &name)?.is_some() {
                return Err(ServiceError::already_exists("Mechanic", &name)
                    .with_field("name")
                    .into());
            }
            tx.execute(
                "INSERT INTO mechanics (name, created_at) VALUES (?1, ?2)",
                params![name, created_at],
            )?;
            Ok(Mechanic {
                name,
                total_points: 0.0,
                total_tasks: 0,
                last_reset_date: None,
                created_at,
            })
        })
    }

    pub fn get_mechanic(&self, name: &str) -> Result<Option<Mechanic>> {
        self.with_conn(|conn| get_mechanic_internal(conn, name))
    }

    /// List mechanics, highest points first.
    pub fn list_mechanics(&self) -> Result<Vec<Mechanic>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM mechanics ORDER BY total_points DESC, name ASC")?;
            let mechanics = stmt
                .query_map([], parse_mechanic_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(mechanics)
        })
    }

    /// Mark a mechanic's hours as paid by moving `last_reset_date` to now.
    ///
    /// Session and punch rows are left untouched.
    pub fn reset_hours(&self, name: &str) -> Result<Mechanic> {
        let reset_at = now();
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE mechanics SET last_reset_date = ?1 WHERE name = ?2",
                params![reset_at, name],
            )?;
            if changed == 0 {
                return Err(ServiceError::mechanic_not_found(name).into());
            }
            info!(mechanic = %name, "Hours reset");
            get_mechanic_internal(tx, name)?
                .ok_or_else(|| ServiceError::mechanic_not_found(name).into())
        })
    }

    /// Mark everyone's hours as paid. Returns the number of mechanics touched.
    pub fn reset_all_hours(&self) -> Result<usize> {
        let reset_at = now();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE mechanics SET last_reset_date = ?1",
                params![reset_at],
            )?;
            info!(mechanics = changed, "All hours reset");
            Ok(changed)
        })
    }

    /// Zero every mechanic's points and task count.
    ///
    /// Returns the totals as they were before the reset. Completion credits
    /// recorded on tasks are cleared too, so reopening an old task does not
    /// push anyone negative.
    pub fn reset_points(&self) -> Result<Vec<Mechanic>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("SELECT * FROM mechanics ORDER BY name")?;
            let before = stmt
                .query_map([], parse_mechanic_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);

            tx.execute("UPDATE mechanics SET total_points = 0, total_tasks = 0", [])?;
            tx.execute("DELETE FROM task_credits", [])?;
            info!(mechanics = before.len(), "Mechanic points reset");
            Ok(before)
        })
    }
}
