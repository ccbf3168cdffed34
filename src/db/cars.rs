//! Car registration and lookup.

use super::{Database, now, optional, required_text};
use crate::types::{Car, NewCar};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

pub fn parse_car_row(row: &Row) -> rusqlite::Result<Car> {
    Ok(Car {
        id: row.get("id")?,
        brand: row.get("brand")?,
        model: row.get("model")?,
        year: row.get("year")?,
        license_plate: row.get("license_plate")?,
        created_at: row.get("created_at")?,
    })
}

/// Whether a car exists, using an existing connection.
pub(crate) fn car_exists(conn: &Connection, car_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM cars WHERE id = ?1",
        params![car_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl Database {
    /// Register a car. Brand and model are required.
    pub fn create_car(&self, input: NewCar) -> Result<Car> {
        let brand = required_text(input.brand, "brand")?;
        let model = required_text(input.model, "model")?;
        let created_at = now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cars (brand, model, year, license_plate, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![brand, model, input.year, input.license_plate, created_at],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Car {
                id,
                brand,
                model,
                year: input.year,
                license_plate: input.license_plate,
                created_at,
            })
        })
    }

    pub fn get_car(&self, car_id: i64) -> Result<Option<Car>> {
        self.with_conn(|conn| {
            optional(conn.query_row(
                "SELECT * FROM cars WHERE id = ?1",
                params![car_id],
                parse_car_row,
            ))
        })
    }

    /// List cars, newest first.
    pub fn list_cars(&self) -> Result<Vec<Car>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM cars ORDER BY created_at DESC, id DESC")?;
            let cars = stmt
                .query_map([], parse_car_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cars)
        })
    }
}
