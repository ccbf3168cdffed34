//! Core types for the garage ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Workflow status of a repair task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!(
                "Invalid status '{}'. Valid statuses: pending, in_progress, completed",
                other
            )),
        }
    }
}

/// Clock-in state of a punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchStatus {
    Active,
    Completed,
}

impl PunchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchStatus::Active => "active",
            PunchStatus::Completed => "completed",
        }
    }
}

impl FromStr for PunchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PunchStatus::Active),
            "completed" => Ok(PunchStatus::Completed),
            other => Err(format!(
                "Invalid punch status '{}'. Valid statuses: active, completed",
                other
            )),
        }
    }
}

/// Maximum number of mechanics that can share one task.
pub const MAX_ASSIGNED_MECHANICS: usize = 2;

/// Ordered set of one or two mechanics credited for a task.
///
/// Two names means the task's points are split evenly between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MechanicAssignment(Vec<String>);

impl MechanicAssignment {
    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(vec![first.into(), second.into()])
    }

    /// Build an assignment from raw names, trimming whitespace.
    ///
    /// Returns `Ok(None)` when no names are given.
    pub fn from_names<I, S>(names: I) -> Result<Option<Self>, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .collect();

        if names.is_empty() {
            return Ok(None);
        }
        if names.iter().any(|n| n.is_empty()) {
            return Err("Mechanic names must not be empty".to_string());
        }
        if names.len() > MAX_ASSIGNED_MECHANICS {
            return Err(format!(
                "At most {} mechanics can share a task, got {}",
                MAX_ASSIGNED_MECHANICS,
                names.len()
            ));
        }
        if names.len() == 2 && names[0] == names[1] {
            return Err(format!("Mechanic '{}' is listed twice", names[0]));
        }
        Ok(Some(Self(names)))
    }

    /// Parse the comma-joined form ("Alice" or "Alice,Bob").
    /// A blank string means no assignment.
    pub fn parse(joined: &str) -> Result<Option<Self>, String> {
        if joined.trim().is_empty() {
            return Ok(None);
        }
        Self::from_names(joined.split(','))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Whether the points are split between two mechanics.
    pub fn is_split(&self) -> bool {
        self.0.len() == 2
    }
}

impl fmt::Display for MechanicAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

/// Assignment as it arrives over the wire: either the legacy comma-joined
/// string or a list of names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AssignmentInput {
    Joined(String),
    List(Vec<String>),
}

impl AssignmentInput {
    pub fn into_assignment(self) -> Result<Option<MechanicAssignment>, String> {
        match self {
            AssignmentInput::Joined(s) => MechanicAssignment::parse(&s),
            AssignmentInput::List(names) => MechanicAssignment::from_names(names),
        }
    }
}

/// A car in the shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Car {
    pub id: i64,
    pub brand: String,
    pub model: String,
    pub year: Option<i32>,
    pub license_plate: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a car.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCar {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub license_plate: Option<String>,
}

/// A repair task, joined with its car's display fields.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub car_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub assigned_mechanics: Option<MechanicAssignment>,
    pub points: i64,
    pub status: TaskStatus,
    pub is_priority: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub car_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, alias = "assigned_mechanics")]
    pub assigned_mechanic: Option<AssignmentInput>,
    pub points: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_priority: bool,
}

/// Partial task update. Absent fields are left unchanged.
///
/// `description` and `assigned_mechanic` distinguish "absent" (outer `None`)
/// from "cleared" (`Some(None)`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default, alias = "assigned_mechanics", deserialize_with = "deserialize_some")]
    pub assigned_mechanic: Option<Option<AssignmentInput>>,
    pub points: Option<i64>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "deserialize_optional_flag")]
    pub is_priority: Option<bool>,
    pub car_id: Option<i64>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assigned_mechanic.is_none()
            && self.points.is_none()
            && self.status.is_none()
            && self.is_priority.is_none()
            && self.car_id.is_none()
    }
}

/// Maps a present JSON value (including `null`) to `Some`, so that a missing
/// field stays `None` through `#[serde(default)]`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A flag sent either as a JSON boolean or as a 0/1 integer.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl From<Flag> for bool {
    fn from(flag: Flag) -> Self {
        match flag {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

/// Truthy flag; `null` reads as false.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.is_some_and(bool::from))
}

/// Truthy flag for partial updates; `null` leaves the field unchanged.
fn deserialize_optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.map(bool::from))
}

/// Filters for listing tasks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub car_id: Option<i64>,
}

/// A mechanic and their cumulative totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mechanic {
    pub name: String,
    pub total_points: f64,
    pub total_tasks: i64,
    /// Start of the current unpaid period.
    pub last_reset_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A clock-in/clock-out record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Punch {
    pub id: i64,
    pub mechanic_name: String,
    pub punch_in: DateTime<Utc>,
    pub punch_out: Option<DateTime<Utc>>,
    pub date: NaiveDate,
    pub status: PunchStatus,
    pub total_hours: Option<f64>,
}

/// Filters and pagination for listing punches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PunchFilter {
    pub date: Option<NaiveDate>,
    pub mechanic_name: Option<String>,
    pub status: Option<PunchStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One page of punches plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct PunchPage {
    pub punches: Vec<Punch>,
    pub total: i64,
    pub limit: Option<i64>,
    pub offset: i64,
}

/// Time a mechanic spent on one car within a punch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarWorkSession {
    pub id: i64,
    pub punch_id: i64,
    pub car_id: i64,
    pub mechanic_name: String,
    pub notes: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_hours: Option<f64>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
}

/// Input for starting a car work session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCarSession {
    pub punch_id: Option<i64>,
    pub car_id: Option<i64>,
    pub mechanic_name: Option<String>,
    pub notes: Option<String>,
}

/// Filters for listing car work sessions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    pub date: Option<NaiveDate>,
    pub mechanic_name: Option<String>,
    pub car_id: Option<i64>,
}

/// Optional inclusive date bounds used by the summaries.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Result of proportionally rescaling a car's session hours.
#[derive(Debug, Clone, Serialize)]
pub struct RescaleOutcome {
    pub car_id: i64,
    pub old_total: f64,
    pub new_total: f64,
    pub ratio: f64,
    pub updated_sessions: usize,
}

/// Counts removed by a full punch/session wipe.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeleteAllOutcome {
    pub deleted_sessions: usize,
    pub deleted_punches: usize,
}

/// Payroll line for one mechanic over completed punches.
#[derive(Debug, Clone, Serialize)]
pub struct PayrollSummary {
    pub mechanic_name: String,
    pub total_days: i64,
    pub total_hours: f64,
    pub avg_hours_per_day: f64,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
}

/// Labor cost line for one car over closed sessions.
#[derive(Debug, Clone, Serialize)]
pub struct CarCostSummary {
    pub car_id: i64,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub mechanics_count: i64,
    pub total_hours: f64,
    pub sessions_count: i64,
}

/// Hours one mechanic spent on one car.
#[derive(Debug, Clone, Serialize)]
pub struct CarHours {
    pub car_id: i64,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub total_hours: f64,
}

/// Unpaid-period hours of a mechanic broken down by car.
#[derive(Debug, Clone, Serialize)]
pub struct MechanicCarHours {
    pub mechanic_name: String,
    pub total_hours: f64,
    pub cars: Vec<CarHours>,
}

/// Aggregate counts for the overview screen.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Stats {
    pub total_cars: i64,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub pending_tasks: i64,
    pub in_progress_tasks: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_and_pair() {
        let single = MechanicAssignment::parse("Alice").unwrap().unwrap();
        assert_eq!(single.names(), ["Alice"]);
        assert!(!single.is_split());

        let pair = MechanicAssignment::parse(" Alice , Bob ").unwrap().unwrap();
        assert_eq!(pair.names(), ["Alice", "Bob"]);
        assert!(pair.is_split());
        assert_eq!(pair.to_string(), "Alice,Bob");
    }

    #[test]
    fn parse_blank_is_no_assignment() {
        assert!(MechanicAssignment::parse("").unwrap().is_none());
        assert!(MechanicAssignment::parse("   ").unwrap().is_none());
    }

    #[test]
    fn parse_rejects_three_names_and_empty_parts() {
        assert!(MechanicAssignment::parse("A,B,C").is_err());
        assert!(MechanicAssignment::parse("Alice,").is_err());
        assert!(MechanicAssignment::parse("Alice,Alice").is_err());
    }

    #[test]
    fn assignment_input_accepts_string_or_list() {
        let joined: AssignmentInput = serde_json::from_str(r#""Alice,Bob""#).unwrap();
        let list: AssignmentInput = serde_json::from_str(r#"["Alice","Bob"]"#).unwrap();
        assert_eq!(
            joined.into_assignment().unwrap(),
            list.into_assignment().unwrap()
        );
    }

    #[test]
    fn priority_flag_accepts_integers() {
        let flagged: TaskUpdate = serde_json::from_str(r#"{"is_priority":1}"#).unwrap();
        assert_eq!(flagged.is_priority, Some(true));
        let unflagged: TaskUpdate = serde_json::from_str(r#"{"is_priority":0}"#).unwrap();
        assert_eq!(unflagged.is_priority, Some(false));

        let created: NewTask = serde_json::from_str(r#"{"is_priority":1}"#).unwrap();
        assert!(created.is_priority);
        let created: NewTask = serde_json::from_str(r#"{"is_priority":null}"#).unwrap();
        assert!(!created.is_priority);
        assert!(serde_json::from_str::<NewTask>(r#"{"is_priority":"yes"}"#).is_err());
    }

    #[test]
    fn task_update_distinguishes_absent_and_null() {
        let absent: TaskUpdate = serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert!(absent.assigned_mechanic.is_none());
        assert_eq!(absent.status, Some(TaskStatus::Completed));

        let cleared: TaskUpdate = serde_json::from_str(r#"{"assigned_mechanic":null}"#).unwrap();
        assert!(matches!(cleared.assigned_mechanic, Some(None)));
        assert!(!cleared.is_empty());

        let empty: TaskUpdate = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn task_status_round_trips_through_str() {
        for status in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }
}
