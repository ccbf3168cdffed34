//! Task CRUD and completion accounting.

use super::cars::car_exists;
use super::mechanics::apply_point_delta;
use super::{Database, now, optional, required_text};
use crate::accounting::{self, PointDelta, Transition};
use crate::error::ServiceError;
use crate::types::{
    MechanicAssignment, Mechanic, NewTask, Stats, Task, TaskFilter, TaskStatus, TaskUpdate,
};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row, params, params_from_iter};
use std::str::FromStr;
use tracing::{debug, info};

const TASK_SELECT: &str = "SELECT t.*, c.brand, c.model, c.year
     FROM tasks t
     LEFT JOIN cars c ON t.car_id = c.id";

/// Outcome of a task update: the re-read task plus every mechanic whose
/// totals moved.
#[derive(Debug, Clone)]
pub struct TaskUpdateOutcome {
    pub task: Task,
    pub transition: Transition,
    pub mechanics: Vec<Mechanic>,
}

// =============================================================================
// Junction table helpers for mechanic assignment
// =============================================================================

/// Replace a task's assigned mechanics.
fn sync_task_mechanics(
    conn: &Connection,
    task_id: i64,
    assignment: Option<&MechanicAssignment>,
) -> Result<()> {
    conn.execute("DELETE FROM task_mechanics WHERE task_id = ?1", params![task_id])?;
    if let Some(assignment) = assignment {
        for (position, name) in assignment.names().iter().enumerate() {
            conn.execute(
                "INSERT INTO task_mechanics (task_id, position, mechanic_name) VALUES (?1, ?2, ?3)",
                params![task_id, position as i64, name],
            )?;
        }
    }
    Ok(())
}

fn load_task_mechanics(conn: &Connection, task_id: i64) -> Result<Option<MechanicAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT mechanic_name FROM task_mechanics WHERE task_id = ?1 ORDER BY position",
    )?;
    let names = stmt
        .query_map(params![task_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    MechanicAssignment::from_names(names).map_err(|e| anyhow!(e))
}

// =============================================================================
// Completion credit ledger
// =============================================================================

fn load_credits(conn: &Connection, task_id: i64) -> Result<Vec<PointDelta>> {
    let mut stmt = conn.prepare(
        "SELECT mechanic_name, points, tasks FROM task_credits WHERE task_id = ?1
         ORDER BY rowid",
    )?;
    let credits = stmt
        .query_map(params![task_id], |row| {
            Ok(PointDelta {
                mechanic_name: row.get(0)?,
                points: row.get(1)?,
                tasks: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(credits)
}

fn record_credit(conn: &Connection, task_id: i64, delta: &PointDelta) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO task_credits (task_id, mechanic_name, points, tasks, credited_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![task_id, delta.mechanic_name, delta.points, delta.tasks, now()],
    )?;
    Ok(())
}

/// Credit mechanics for a completion and remember what was credited.
fn credit_completion(
    conn: &Connection,
    task_id: i64,
    assignment: &MechanicAssignment,
    points: i64,
) -> Result<Vec<Mechanic>> {
    let mut touched = Vec::new();
    for credit in accounting::completion_credits(assignment, points) {
        if let Some(mechanic) = apply_point_delta(conn, &credit)? {
            record_credit(conn, task_id, &credit)?;
            touched.push(mechanic);
        }
    }
    Ok(touched)
}

/// Undo the credits of the task's last completion.
fn debit_reopen(conn: &Connection, task_id: i64) -> Result<Vec<Mechanic>> {
    let credited = load_credits(conn, task_id)?;
    let mut touched = Vec::new();
    for debit in accounting::reopen_debits(&credited) {
        if let Some(mechanic) = apply_point_delta(conn, &debit)? {
            touched.push(mechanic);
        }
    }
    conn.execute("DELETE FROM task_credits WHERE task_id = ?1", params![task_id])?;
    Ok(touched)
}

// =============================================================================
// Row parsing
// =============================================================================

struct TaskRow {
    id: i64,
    car_id: i64,
    title: String,
    description: Option<String>,
    points: i64,
    status: String,
    is_priority: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    brand: Option<String>,
    model: Option<String>,
    year: Option<i32>,
}

fn parse_task_row(row: &Row) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get("id")?,
        car_id: row.get("car_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        points: row.get("points")?,
        status: row.get("status")?,
        is_priority: row.get("is_priority")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        brand: row.get("brand")?,
        model: row.get("model")?,
        year: row.get("year")?,
    })
}

fn hydrate(conn: &Connection, row: TaskRow) -> Result<Task> {
    let status = TaskStatus::from_str(&row.status).map_err(|e| anyhow!(e))?;
    Ok(Task {
        assigned_mechanics: load_task_mechanics(conn, row.id)?,
        id: row.id,
        car_id: row.car_id,
        title: row.title,
        description: row.description,
        points: row.points,
        status,
        is_priority: row.is_priority,
        created_at: row.created_at,
        updated_at: row.updated_at,
        brand: row.brand,
        model: row.model,
        year: row.year,
    })
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let sql = format!("{} WHERE t.id = ?1", TASK_SELECT);
    match optional(conn.query_row(&sql, params![task_id], parse_task_row))? {
        Some(row) => Ok(Some(hydrate(conn, row)?)),
        None => Ok(None),
    }
}

fn query_tasks(conn: &Connection, sql: &str, values: Vec<SqlValue>) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(|row| hydrate(conn, row)).collect()
}

fn assignment_from_input(
    input: Option<crate::types::AssignmentInput>,
) -> Result<Option<MechanicAssignment>> {
    match input {
        Some(input) => input
            .into_assignment()
            .map_err(|e| ServiceError::invalid_value("assigned_mechanic", e).into()),
        None => Ok(None),
    }
}

fn validate_points(points: i64) -> Result<()> {
    if points < 0 {
        return Err(ServiceError::invalid_value("points", "points must not be negative").into());
    }
    Ok(())
}

impl Database {
    /// Create a new task. No points are credited on creation.
    pub fn create_task(&self, input: NewTask) -> Result<Task> {
        let car_id = input
            .car_id
            .ok_or_else(|| ServiceError::missing_field("car_id"))?;
        let title = required_text(input.title, "title")?;
        let assignment = assignment_from_input(input.assigned_mechanic)?;
        let points = input.points.unwrap_or(1);
        validate_points(points)?;
        let created_at = now();

        self.with_tx(|tx| {
            if !car_exists(tx, car_id)? {
                return Err(ServiceError::unknown_car(car_id).into());
            }

            tx.execute(
                "INSERT INTO tasks (car_id, title, description, points, status, is_priority,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?6)",
                params![
                    car_id,
                    title,
                    input.description,
                    points,
                    input.is_priority,
                    created_at
                ],
            )?;
            let task_id = tx.last_insert_rowid();
            sync_task_mechanics(tx, task_id, assignment.as_ref())?;

            get_task_internal(tx, task_id)?.ok_or_else(|| anyhow!("Task vanished after insert"))
        })
    }

    pub fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// List tasks, priority first and newest first within that.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut conditions = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(status) = filter.status {
            values.push(SqlValue::Text(status.as_str().to_string()));
            conditions.push(format!("t.status = ?{}", values.len()));
        }
        if let Some(car_id) = filter.car_id {
            values.push(SqlValue::Integer(car_id));
            conditions.push(format!("t.car_id = ?{}", values.len()));
        }

        let mut sql = TASK_SELECT.to_string();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY t.is_priority DESC, t.created_at DESC, t.id DESC");

        self.with_conn(|conn| query_tasks(conn, &sql, values))
    }

    /// Priority tasks that still need work.
    pub fn list_priority_tasks(&self) -> Result<Vec<Task>> {
        let sql = format!(
            "{} WHERE t.is_priority = 1 AND t.status != 'completed'
             ORDER BY t.created_at DESC, t.id DESC",
            TASK_SELECT
        );
        self.with_conn(|conn| query_tasks(conn, &sql, Vec::new()))
    }

    /// Apply a partial update to a task, moving mechanic points on status
    /// transitions.
    ///
    /// The read of the previous task, the point adjustments and the task
    /// write happen in one transaction:
    /// - into `completed`: the effective assignment (the request's if given,
    ///   else the stored one) is credited with the task's stored points,
    ///   split evenly between two mechanics;
    /// - out of `completed`: the credits recorded at completion are debited;
    /// - anything else leaves points alone.
    pub fn update_task(&self, task_id: i64, update: TaskUpdate) -> Result<TaskUpdateOutcome> {
        if update.is_empty() {
            return Err(ServiceError::no_fields().into());
        }
        let requested_assignment = match update.assigned_mechanic {
            Some(input) => Some(assignment_from_input(input)?),
            None => None,
        };
        if let Some(points) = update.points {
            validate_points(points)?;
        }
        let title = match update.title {
            Some(title) => Some(required_text(Some(title), "title")?),
            None => None,
        };
        let updated_at = now();

        self.with_tx(|tx| {
            let previous = get_task_internal(tx, task_id)?
                .ok_or_else(|| ServiceError::task_not_found(task_id))?;

            if let Some(car_id) = update.car_id
                && !car_exists(tx, car_id)?
            {
                return Err(ServiceError::unknown_car(car_id).into());
            }

            let transition = accounting::classify(previous.status, update.status);
            let effective_assignment = match &requested_assignment {
                Some(requested) => requested.clone(),
                None => previous.assigned_mechanics.clone(),
            };

            let mechanics = match transition {
                Transition::Completed => match &effective_assignment {
                    Some(assignment) => {
                        info!(
                            task_id,
                            points = previous.points,
                            mechanics = %assignment,
                            split = assignment.is_split(),
                            "Task completed, crediting points"
                        );
                        credit_completion(tx, task_id, assignment, previous.points)?
                    }
                    None => {
                        debug!(task_id, "Task completed without mechanic, no points moved");
                        Vec::new()
                    }
                },
                Transition::Reopened => {
                    info!(task_id, "Task reopened, reversing completion credits");
                    debit_reopen(tx, task_id)?
                }
                Transition::Unchanged => Vec::new(),
            };

            let description = update.description.clone().unwrap_or(previous.description);
            tx.execute(
                "UPDATE tasks SET
                    car_id = ?1, title = ?2, description = ?3, points = ?4,
                    status = ?5, is_priority = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    update.car_id.unwrap_or(previous.car_id),
                    title.unwrap_or(previous.title),
                    description,
                    update.points.unwrap_or(previous.points),
                    update.status.unwrap_or(previous.status).as_str(),
                    update.is_priority.unwrap_or(previous.is_priority),
                    updated_at,
                    task_id
                ],
            )?;

            if let Some(requested) = &requested_assignment {
                sync_task_mechanics(tx, task_id, requested.as_ref())?;
            }

            let task = get_task_internal(tx, task_id)?
                .ok_or_else(|| ServiceError::task_not_found(task_id))?;

            Ok(TaskUpdateOutcome {
                task,
                transition,
                mechanics,
            })
        })
    }

    /// Delete a task. Returns `false` if it did not exist.
    ///
    /// Points already credited for a completed task stay with the mechanics.
    pub fn delete_task(&self, task_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            Ok(deleted > 0)
        })
    }

    /// Aggregate car and task counts.
    pub fn get_stats(&self) -> Result<Stats> {
        self.with_conn(|conn| {
            let total_cars: i64 =
                conn.query_row("SELECT COUNT(*) FROM cars", [], |row| row.get(0))?;
            let counts: (i64, i64, i64, i64) = conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0)
                 FROM tasks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
            let (total_tasks, completed_tasks, pending_tasks, in_progress_tasks) = counts;
            Ok(Stats {
                total_cars,
                total_tasks,
                completed_tasks,
                pending_tasks,
                in_progress_tasks,
            })
        })
    }
}
