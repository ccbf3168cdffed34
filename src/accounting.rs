//! Point-accrual and work-hour accounting rules.
//!
//! Everything here is pure: the store layer reads the current rows, asks
//! these functions what should change, and applies the answer inside one
//! transaction.

use crate::types::{MechanicAssignment, TaskStatus};
use chrono::{DateTime, Utc};

/// Change to apply to one mechanic's cumulative totals.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDelta {
    pub mechanic_name: String,
    pub points: f64,
    pub tasks: i64,
}

impl PointDelta {
    /// The delta that undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            mechanic_name: self.mechanic_name.clone(),
            points: -self.points,
            tasks: -self.tasks,
        }
    }
}

/// Status change of a task, as far as points are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// pending/in_progress -> completed
    Completed,
    /// completed -> pending/in_progress
    Reopened,
    /// Anything else, including updates that leave the status alone.
    Unchanged,
}

/// Classify a status update against the stored status.
pub fn classify(old: TaskStatus, requested: Option<TaskStatus>) -> Transition {
    match requested {
        Some(new) if new.is_completed() && !old.is_completed() => Transition::Completed,
        Some(new) if !new.is_completed() && old.is_completed() => Transition::Reopened,
        _ => Transition::Unchanged,
    }
}

/// Credits earned when a task worth `points` is completed by `assignment`.
///
/// Two mechanics split the points evenly (real division, so odd points give
/// fractional credits); a single mechanic takes them all. Every mechanic
/// gets one task.
pub fn completion_credits(assignment: &MechanicAssignment, points: i64) -> Vec<PointDelta> {
    let share = if assignment.is_split() {
        points as f64 / 2.0
    } else {
        points as f64
    };

    assignment
        .names()
        .iter()
        .map(|name| PointDelta {
            mechanic_name: name.clone(),
            points: share,
            tasks: 1,
        })
        .collect()
}

/// Debits that undo a previous completion.
pub fn reopen_debits(credited: &[PointDelta]) -> Vec<PointDelta> {
    credited.iter().map(PointDelta::reversed).collect()
}

/// Wall-clock hours between two instants. Negative spans count as zero.
pub fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let ms = (end - start).num_milliseconds().max(0);
    ms as f64 / 3_600_000.0
}

/// Scale factor that turns `current_total` hours into `new_total`.
///
/// Returns `None` when there is nothing to scale.
pub fn rescale_ratio(current_total: f64, new_total: f64) -> Option<f64> {
    if current_total == 0.0 {
        None
    } else {
        Some(new_total / current_total)
    }
}
