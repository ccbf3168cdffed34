//! Car work sessions: time a mechanic spends on one car within a punch.

use super::cars::car_exists;
use super::punches::get_punch_internal;
use super::{Database, now, optional, required_text};
use crate::accounting::{elapsed_hours, rescale_ratio};
use crate::error::ServiceError;
use crate::types::{CarWorkSession, NewCarSession, PunchStatus, RescaleOutcome, SessionFilter};
use anyhow::Result;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::{debug, info};

const SESSION_SELECT: &str = "SELECT cws.*, c.brand, c.model, c.year
     FROM car_work_sessions cws
     LEFT JOIN cars c ON cws.car_id = c.id";

pub fn parse_session_row(row: &Row) -> rusqlite::Result<CarWorkSession> {
    Ok(CarWorkSession {
        id: row.get("id")?,
        punch_id: row.get("punch_id")?,
        car_id: row.get("car_id")?,
        mechanic_name: row.get("mechanic_name")?,
        notes: row.get("notes")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        total_hours: row.get("total_hours")?,
        brand: row.get("brand")?,
        model: row.get("model")?,
        year: row.get("year")?,
    })
}

fn get_session_internal(conn: &Connection, session_id: i64) -> Result<Option<CarWorkSession>> {
    optional(conn.query_row(
        &format!("{} WHERE cws.id = ?1", SESSION_SELECT),
        params![session_id],
        parse_session_row,
    ))
}

fn open_session_internal(conn: &Connection, mechanic_name: &str) -> Result<Option<CarWorkSession>> {
    optional(conn.query_row(
        &format!(
            "{} WHERE cws.mechanic_name = ?1 AND cws.end_time IS NULL
             ORDER BY cws.start_time DESC LIMIT 1",
            SESSION_SELECT
        ),
        params![mechanic_name],
        parse_session_row,
    ))
}

fn closed_hours_for_car(conn: &Connection, car_id: i64) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(total_hours), 0) FROM car_work_sessions
         WHERE car_id = ?1 AND end_time IS NOT NULL",
        params![car_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

fn validate_hours(field: &str, hours: f64) -> Result<()> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(
            ServiceError::invalid_value(field, "Hours must be a non-negative number").into(),
        );
    }
    Ok(())
}

impl Database {
    /// Open a work session on a car under an existing punch.
    ///
    /// While the punch is active the mechanic may hold only one open session.
    /// Sessions logged against an already completed punch skip that check.
    pub fn start_session(&self, input: NewCarSession) -> Result<CarWorkSession> {
        let punch_id = input
            .punch_id
            .ok_or_else(|| ServiceError::missing_field("punch_id"))?;
        let car_id = input
            .car_id
            .ok_or_else(|| ServiceError::missing_field("car_id"))?;
        let mechanic_name = required_text(input.mechanic_name, "mechanic_name")?;
        let notes = input.notes.filter(|n| !n.trim().is_empty());
        let start_time = now();

        self.with_tx(|tx| {
            let punch = get_punch_internal(tx, punch_id)?
                .ok_or_else(|| ServiceError::unknown_punch(punch_id))?;
            if !car_exists(tx, car_id)? {
                return Err(ServiceError::unknown_car(car_id).into());
            }

            if punch.status == PunchStatus::Active
                && open_session_internal(tx, &mechanic_name)?.is_some()
            {
                return Err(ServiceError::already_working(&mechanic_name).into());
            }

            tx.execute(
                "INSERT INTO car_work_sessions (punch_id, car_id, mechanic_name, notes, start_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![punch_id, car_id, mechanic_name, notes, start_time],
            )?;
            let id = tx.last_insert_rowid();
            info!(session_id = id, car_id, mechanic = %mechanic_name, "Car session started");

            get_session_internal(tx, id)?.ok_or_else(|| ServiceError::session_not_found(id).into())
        })
    }

    /// Close an open session.
    ///
    /// Non-blank `notes` replace the stored ones. Supplied `total_hours` are
    /// recorded as given; otherwise hours derive from start and end time.
    pub fn end_session(
        &self,
        session_id: i64,
        notes: Option<String>,
        total_hours: Option<f64>,
    ) -> Result<CarWorkSession> {
        if let Some(hours) = total_hours {
            validate_hours("total_hours", hours)?;
        }
        let end_time = now();

        self.with_tx(|tx| {
            let session = get_session_internal(tx, session_id)?
                .ok_or_else(|| ServiceError::session_not_found(session_id))?;
            if session.end_time.is_some() {
                return Err(ServiceError::already_closed("Car work session", session_id).into());
            }

            let hours = total_hours.unwrap_or_else(|| elapsed_hours(session.start_time, end_time));
            let notes = notes.filter(|n| !n.trim().is_empty()).or(session.notes);
            tx.execute(
                "UPDATE car_work_sessions SET end_time = ?1, notes = ?2, total_hours = ?3
                 WHERE id = ?4",
                params![end_time, notes, hours, session_id],
            )?;
            info!(session_id, mechanic = %session.mechanic_name, hours, "Car session ended");

            get_session_internal(tx, session_id)?
                .ok_or_else(|| ServiceError::session_not_found(session_id).into())
        })
    }

    pub fn get_session(&self, session_id: i64) -> Result<Option<CarWorkSession>> {
        self.with_conn(|conn| get_session_internal(conn, session_id))
    }

    /// The mechanic's open session, if any.
    pub fn active_session(&self, mechanic_name: &str) -> Result<Option<CarWorkSession>> {
        self.with_conn(|conn| open_session_internal(conn, mechanic_name))
    }

    /// List sessions newest first with joined car fields.
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<CarWorkSession>> {
        let mut sql = format!("{} WHERE 1=1", SESSION_SELECT);
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(date) = filter.date {
            values.push(SqlValue::Text(date.to_string()));
            sql.push_str(&format!(" AND substr(cws.start_time, 1, 10) = ?{}", values.len()));
        }
        if let Some(ref mechanic) = filter.mechanic_name {
            values.push(SqlValue::Text(mechanic.clone()));
            sql.push_str(&format!(" AND cws.mechanic_name = ?{}", values.len()));
        }
        if let Some(car_id) = filter.car_id {
            values.push(SqlValue::Integer(car_id));
            sql.push_str(&format!(" AND cws.car_id = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY cws.start_time DESC, cws.id DESC");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let sessions = stmt
                .query_map(params_from_iter(values), parse_session_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }

    /// Overwrite one session's hours (admin).
    pub fn edit_session_hours(
        &self,
        session_id: i64,
        total_hours: Option<f64>,
    ) -> Result<CarWorkSession> {
        let hours = total_hours.ok_or_else(|| ServiceError::missing_field("total_hours"))?;
        validate_hours("total_hours", hours)?;

        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE car_work_sessions SET total_hours = ?1 WHERE id = ?2",
                params![hours, session_id],
            )?;
            if changed == 0 {
                return Err(ServiceError::session_not_found(session_id).into());
            }
            info!(session_id, hours, "Car session hours edited");
            get_session_internal(tx, session_id)?
                .ok_or_else(|| ServiceError::session_not_found(session_id).into())
        })
    }

    /// Scale every closed session of a car so their hours sum to `new_total`.
    ///
    /// A car with no recorded hours is left untouched and reports a zero ratio.
    pub fn set_car_total_hours(
        &self,
        car_id: i64,
        new_total: Option<f64>,
    ) -> Result<RescaleOutcome> {
        let new_total = new_total.ok_or_else(|| ServiceError::missing_field("total_hours"))?;
        validate_hours("total_hours", new_total)?;

        self.with_tx(|tx| {
            let old_total = closed_hours_for_car(tx, car_id)?;
            let Some(ratio) = rescale_ratio(old_total, new_total) else {
                debug!(car_id, "No closed sessions to rescale");
                return Ok(RescaleOutcome {
                    car_id,
                    old_total: 0.0,
                    new_total: 0.0,
                    ratio: 0.0,
                    updated_sessions: 0,
                });
            };

            let updated_sessions = tx.execute(
                "UPDATE car_work_sessions SET total_hours = total_hours * ?1
                 WHERE car_id = ?2 AND end_time IS NOT NULL",
                params![ratio, car_id],
            )?;
            info!(car_id, old_total, new_total, ratio, "Car hours rescaled");

            Ok(RescaleOutcome {
                car_id,
                old_total,
                new_total,
                ratio,
                updated_sessions,
            })
        })
    }

    /// Delete every closed session. Open sessions survive.
    pub fn reset_car_hours(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM car_work_sessions WHERE end_time IS NOT NULL",
                [],
            )?;
            info!(deleted_sessions = deleted, "Car hours reset");
            Ok(deleted)
        })
    }
}
