//! Payroll and labor-cost rollups.

use super::Database;
use super::sessions::parse_session_row;
use crate::types::{
    CarCostSummary, CarHours, CarWorkSession, DateRange, MechanicCarHours, PayrollSummary,
};
use anyhow::Result;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};

/// Append inclusive day bounds on `column` (a date or a timestamp whose first
/// ten characters are the UTC day).
fn push_range(sql: &mut String, values: &mut Vec<SqlValue>, column: &str, range: &DateRange) {
    if let Some(start) = range.start_date {
        values.push(SqlValue::Text(start.to_string()));
        sql.push_str(&format!(" AND substr({}, 1, 10) >= ?{}", column, values.len()));
    }
    if let Some(end) = range.end_date {
        values.push(SqlValue::Text(end.to_string()));
        sql.push_str(&format!(" AND substr({}, 1, 10) <= ?{}", column, values.len()));
    }
}

/// Restrict closed sessions of one mechanic to their unpaid period, which
/// starts after their `last_reset_date` (or at the beginning when unset).
fn unpaid_session_conditions(mechanic_name: &str, range: &DateRange) -> (String, Vec<SqlValue>) {
    let mut sql = String::from(
        " WHERE cws.end_time IS NOT NULL AND cws.mechanic_name = ?1
           AND cws.start_time > COALESCE(
               (SELECT last_reset_date FROM mechanics WHERE name = ?1), '')",
    );
    let mut values = vec![SqlValue::Text(mechanic_name.to_string())];
    push_range(&mut sql, &mut values, "cws.start_time", range);
    (sql, values)
}

fn mechanic_car_hours(
    conn: &Connection,
    mechanic_name: &str,
    range: &DateRange,
) -> Result<MechanicCarHours> {
    let (conditions, values) = unpaid_session_conditions(mechanic_name, range);
    let sql = format!(
        "SELECT cws.car_id, c.brand, c.model, c.year,
                COALESCE(SUM(cws.total_hours), 0) AS total_hours
         FROM car_work_sessions cws
         LEFT JOIN cars c ON cws.car_id = c.id
         {}
         GROUP BY cws.car_id, c.brand, c.model, c.year
         ORDER BY total_hours DESC",
        conditions
    );

    let mut stmt = conn.prepare(&sql)?;
    let cars = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(CarHours {
                car_id: row.get("car_id")?,
                brand: row.get("brand")?,
                model: row.get("model")?,
                year: row.get("year")?,
                total_hours: row.get("total_hours")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(MechanicCarHours {
        mechanic_name: mechanic_name.to_string(),
        total_hours: cars.iter().map(|c| c.total_hours).sum(),
        cars,
    })
}

impl Database {
    /// Per-mechanic payroll over completed punches, most hours first.
    pub fn payroll_summary(&self, range: &DateRange) -> Result<Vec<PayrollSummary>> {
        let mut sql = String::from(
            "SELECT mechanic_name,
                    COUNT(*) AS total_days,
                    COALESCE(SUM(total_hours), 0) AS total_hours,
                    COALESCE(AVG(total_hours), 0) AS avg_hours_per_day,
                    MIN(date) AS first_day,
                    MAX(date) AS last_day
             FROM punches
             WHERE status = 'completed'",
        );
        let mut values = Vec::new();
        push_range(&mut sql, &mut values, "date", range);
        sql.push_str(" GROUP BY mechanic_name ORDER BY total_hours DESC, mechanic_name ASC");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(PayrollSummary {
                        mechanic_name: row.get("mechanic_name")?,
                        total_days: row.get("total_days")?,
                        total_hours: row.get("total_hours")?,
                        avg_hours_per_day: row.get("avg_hours_per_day")?,
                        first_day: row.get("first_day")?,
                        last_day: row.get("last_day")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Per-car labor over closed sessions, most hours first.
    pub fn car_costs_summary(&self, range: &DateRange) -> Result<Vec<CarCostSummary>> {
        let mut sql = String::from(
            "SELECT cws.car_id, c.brand, c.model, c.year,
                    COUNT(DISTINCT cws.mechanic_name) AS mechanics_count,
                    COALESCE(SUM(cws.total_hours), 0) AS total_hours,
                    COUNT(*) AS sessions_count
             FROM car_work_sessions cws
             LEFT JOIN cars c ON cws.car_id = c.id
             WHERE cws.end_time IS NOT NULL",
        );
        let mut values = Vec::new();
        push_range(&mut sql, &mut values, "cws.start_time", range);
        sql.push_str(" GROUP BY cws.car_id, c.brand, c.model, c.year ORDER BY total_hours DESC");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(CarCostSummary {
                        car_id: row.get("car_id")?,
                        brand: row.get("brand")?,
                        model: row.get("model")?,
                        year: row.get("year")?,
                        mechanics_count: row.get("mechanics_count")?,
                        total_hours: row.get("total_hours")?,
                        sessions_count: row.get("sessions_count")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Unpaid-period hours per car for every mechanic, highest total first.
    pub fn mechanic_cars_summary(&self, range: &DateRange) -> Result<Vec<MechanicCarHours>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM mechanics ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut summary = names
                .iter()
                .map(|name| mechanic_car_hours(conn, name, range))
                .collect::<Result<Vec<_>>>()?;
            summary.sort_by(|a, b| b.total_hours.total_cmp(&a.total_hours));
            Ok(summary)
        })
    }

    /// Closed sessions of one mechanic in their unpaid period, grouped by car.
    pub fn mechanic_sessions(
        &self,
        mechanic_name: &str,
        range: &DateRange,
    ) -> Result<Vec<CarWorkSession>> {
        self.with_conn(|conn| {
            let (conditions, values) = unpaid_session_conditions(mechanic_name, range);
            let sql = format!(
                "SELECT cws.*, c.brand, c.model, c.year
                 FROM car_work_sessions cws
                 LEFT JOIN cars c ON cws.car_id = c.id
                 {}
                 ORDER BY cws.car_id, cws.start_time DESC",
                conditions
            );
            let mut stmt = conn.prepare(&sql)?;
            let sessions = stmt
                .query_map(params_from_iter(values), parse_session_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }
}
