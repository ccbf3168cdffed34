//! Clock-in/clock-out punches.

use super::{Database, now, optional, required_text};
use crate::accounting::elapsed_hours;
use crate::error::ServiceError;
use crate::types::{DeleteAllOutcome, Punch, PunchFilter, PunchPage, PunchStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row, params, params_from_iter};
use std::str::FromStr;
use tracing::info;

pub fn parse_punch_row(row: &Row) -> rusqlite::Result<Punch> {
    let status: String = row.get("status")?;
    let status = PunchStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(Punch {
        id: row.get("id")?,
        mechanic_name: row.get("mechanic_name")?,
        punch_in: row.get("punch_in")?,
        punch_out: row.get("punch_out")?,
        date: row.get("date")?,
        status,
        total_hours: row.get("total_hours")?,
    })
}

/// Internal helper to get a punch using an existing connection.
pub(crate) fn get_punch_internal(conn: &Connection, punch_id: i64) -> Result<Option<Punch>> {
    optional(conn.query_row(
        "SELECT * FROM punches WHERE id = ?1",
        params![punch_id],
        parse_punch_row,
    ))
}

fn active_punch_internal(conn: &Connection, mechanic_name: &str) -> Result<Option<Punch>> {
    optional(conn.query_row(
        "SELECT * FROM punches
         WHERE mechanic_name = ?1 AND status = 'active'
         ORDER BY punch_in DESC LIMIT 1",
        params![mechanic_name],
        parse_punch_row,
    ))
}

/// Build the WHERE clause shared by the punch listing and its count.
fn punch_conditions(filter: &PunchFilter) -> (String, Vec<SqlValue>) {
    let mut sql = String::from(" WHERE 1=1");
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(date) = filter.date {
        values.push(SqlValue::Text(date.to_string()));
        sql.push_str(&format!(" AND date = ?{}", values.len()));
    }
    if let Some(ref mechanic) = filter.mechanic_name {
        values.push(SqlValue::Text(mechanic.clone()));
        sql.push_str(&format!(" AND mechanic_name = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(SqlValue::Text(status.as_str().to_string()));
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }

    (sql, values)
}

impl Database {
    /// Clock a mechanic in. Fails if they already hold an active punch.
    pub fn punch_in(&self, mechanic_name: Option<String>) -> Result<Punch> {
        let mechanic_name = required_text(mechanic_name, "mechanic_name")?;
        let punch_in = now();
        let date = punch_in.date_naive();

        self.with_tx(|tx| {
            if active_punch_internal(tx, &mechanic_name)?.is_some() {
                return Err(ServiceError::already_active(&mechanic_name).into());
            }

            tx.execute(
                "INSERT INTO punches (mechanic_name, punch_in, date, status)
                 VALUES (?1, ?2, ?3, 'active')",
                params![mechanic_name, punch_in, date],
            )?;
            let id = tx.last_insert_rowid();
            info!(punch_id = id, mechanic = %mechanic_name, "Punched in");

            Ok(Punch {
                id,
                mechanic_name,
                punch_in,
                punch_out: None,
                date,
                status: PunchStatus::Active,
                total_hours: None,
            })
        })
    }

    /// Clock out an active punch, deriving its hours from the elapsed time.
    pub fn punch_out(&self, punch_id: i64) -> Result<Punch> {
        let punch_out = now();

        self.with_tx(|tx| {
            let punch = get_punch_internal(tx, punch_id)?
                .ok_or_else(|| ServiceError::punch_not_found(punch_id))?;
            if punch.status == PunchStatus::Completed {
                return Err(ServiceError::already_closed("Punch", punch_id).into());
            }

            let total_hours = elapsed_hours(punch.punch_in, punch_out);
            tx.execute(
                "UPDATE punches SET punch_out = ?1, total_hours = ?2, status = 'completed'
                 WHERE id = ?3",
                params![punch_out, total_hours, punch_id],
            )?;
            info!(punch_id, mechanic = %punch.mechanic_name, total_hours, "Punched out");

            Ok(Punch {
                punch_out: Some(punch_out),
                status: PunchStatus::Completed,
                total_hours: Some(total_hours),
                ..punch
            })
        })
    }

    pub fn get_punch(&self, punch_id: i64) -> Result<Option<Punch>> {
        self.with_conn(|conn| get_punch_internal(conn, punch_id))
    }

    /// The mechanic's current active punch, if any.
    pub fn active_punch(&self, mechanic_name: &str) -> Result<Option<Punch>> {
        self.with_conn(|conn| active_punch_internal(conn, mechanic_name))
    }

    /// List punches newest first, with optional pagination.
    pub fn list_punches(&self, filter: &PunchFilter) -> Result<PunchPage> {
        let (conditions, values) = punch_conditions(filter);

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM punches{}", conditions),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let mut sql = format!(
                "SELECT * FROM punches{} ORDER BY punch_in DESC, id DESC",
                conditions
            );
            let mut page_values = values.clone();
            match (filter.limit, filter.offset) {
                (Some(limit), offset) => {
                    page_values.push(SqlValue::Integer(limit));
                    sql.push_str(&format!(" LIMIT ?{}", page_values.len()));
                    page_values.push(SqlValue::Integer(offset.unwrap_or(0)));
                    sql.push_str(&format!(" OFFSET ?{}", page_values.len()));
                }
                // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
                (None, Some(offset)) => {
                    page_values.push(SqlValue::Integer(offset));
                    sql.push_str(&format!(" LIMIT -1 OFFSET ?{}", page_values.len()));
                }
                (None, None) => {}
            }

            let mut stmt = conn.prepare(&sql)?;
            let punches = stmt
                .query_map(params_from_iter(page_values), parse_punch_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(PunchPage {
                punches,
                total,
                limit: filter.limit,
                offset: filter.offset.unwrap_or(0),
            })
        })
    }

    /// Overwrite a punch's times (admin).
    ///
    /// With `punch_out` the punch becomes completed with derived hours; it
    /// must be strictly after `punch_in`. Without it the punch reverts to
    /// active and its hours are cleared.
    pub fn edit_punch(
        &self,
        punch_id: i64,
        punch_in: DateTime<Utc>,
        punch_out: Option<DateTime<Utc>>,
    ) -> Result<Punch> {
        if let Some(out) = punch_out
            && out <= punch_in
        {
            return Err(
                ServiceError::invalid_value("punch_out", "punch_out must be after punch_in").into(),
            );
        }

        self.with_tx(|tx| {
            let punch = get_punch_internal(tx, punch_id)?
                .ok_or_else(|| ServiceError::punch_not_found(punch_id))?;

            let (status, total_hours) = match punch_out {
                Some(out) => (PunchStatus::Completed, Some(elapsed_hours(punch_in, out))),
                None => {
                    // Reopening must not produce a second active punch.
                    if let Some(active) = active_punch_internal(tx, &punch.mechanic_name)?
                        && active.id != punch_id
                    {
                        return Err(ServiceError::already_active(&punch.mechanic_name).into());
                    }
                    (PunchStatus::Active, None)
                }
            };

            let date = punch_in.date_naive();
            tx.execute(
                "UPDATE punches SET punch_in = ?1, punch_out = ?2, date = ?3, status = ?4,
                        total_hours = ?5
                 WHERE id = ?6",
                params![punch_in, punch_out, date, status.as_str(), total_hours, punch_id],
            )?;
            info!(
                punch_id,
                mechanic = %punch.mechanic_name,
                status = status.as_str(),
                "Punch edited"
            );

            Ok(Punch {
                punch_in,
                punch_out,
                date,
                status,
                total_hours,
                ..punch
            })
        })
    }

    /// Delete a punch and its car sessions. Returns the deleted punch.
    pub fn delete_punch(&self, punch_id: i64) -> Result<Option<Punch>> {
        self.with_tx(|tx| {
            let Some(punch) = get_punch_internal(tx, punch_id)? else {
                return Ok(None);
            };
            tx.execute(
                "DELETE FROM car_work_sessions WHERE punch_id = ?1",
                params![punch_id],
            )?;
            tx.execute("DELETE FROM punches WHERE id = ?1", params![punch_id])?;
            info!(punch_id, "Punch deleted");
            Ok(Some(punch))
        })
    }

    /// Delete every punch and session and start a fresh unpaid period for
    /// every mechanic, atomically.
    pub fn delete_all_punches(&self) -> Result<DeleteAllOutcome> {
        let reset_at = now();
        self.with_tx(|tx| {
            let deleted_sessions = tx.execute("DELETE FROM car_work_sessions", [])?;
            let deleted_punches = tx.execute("DELETE FROM punches", [])?;
            tx.execute(
                "UPDATE mechanics SET last_reset_date = ?1",
                params![reset_at],
            )?;
            info!(deleted_sessions, deleted_punches, "All punches and sessions deleted");
            Ok(DeleteAllOutcome {
                deleted_sessions,
                deleted_punches,
            })
        })
    }
}
