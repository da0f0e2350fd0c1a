//! Entity and view types shared by both stores and the aggregator.
//!
//! The ownership hierarchy is Teacher → Class → Student → AttendanceRecord.
//! Every entity carries its parent's id and nothing else from the parent;
//! joins (for example attendance by class) are computed through `Student`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub school_name: String,
    pub class_name: String,
    /// Free-form label, usually an academic year such as "2024-25".
    pub session: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub class_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One attendance mark. `(student_id, date)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    /// `true` when present.
    pub status: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTeacher {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewClass {
    pub teacher_id: Uuid,
    pub school_name: String,
    pub class_name: String,
    pub session: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewStudent {
    pub class_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAttendance {
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: bool,
}

impl Teacher {
    pub fn from_new(new: &NewTeacher) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: new.email.clone(),
            name: new.name.clone(),
            created_at: Utc::now(),
        }
    }
}

impl Class {
    pub fn from_new(new: &NewClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            teacher_id: new.teacher_id,
            school_name: new.school_name.clone(),
            class_name: new.class_name.clone(),
            session: new.session.clone(),
            created_at: Utc::now(),
        }
    }
}

impl Student {
    pub fn from_new(new: &NewStudent) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id: new.class_id,
            name: new.name.clone(),
            created_at: Utc::now(),
        }
    }
}

impl AttendanceRecord {
    pub fn from_new(new: &NewAttendance) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            date: new.date,
            status: new.status,
            created_at: Utc::now(),
        }
    }
}

/// Attendance state of a roster member on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Present,
    Absent,
    /// No record exists for the day. Never treated as absent in daily views.
    Unmarked,
}

/// A roster member paired with its record for one date, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub student: Student,
    pub attendance: Option<AttendanceRecord>,
}

impl RosterEntry {
    pub fn mark(&self) -> Mark {
        match &self.attendance {
            Some(record) if record.status => Mark::Present,
            Some(_) => Mark::Absent,
            None => Mark::Unmarked,
        }
    }
}

/// Present/absent counts for one calendar day of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub present: usize,
    pub absent: usize,
}

/// A single existing record from a student's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StudentDay {
    pub date: NaiveDate,
    pub status: bool,
}

/// Totals over a span, as shown on report screens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub present: usize,
    pub absent: usize,
    pub total: usize,
    /// Rounded to the nearest whole percent; 0 when `total` is 0.
    pub percentage: u8,
}

impl AttendanceSummary {
    pub fn from_counts(present: usize, absent: usize) -> Self {
        let total = present + absent;
        let percentage = if total == 0 {
            0
        } else {
            ((present as f64 / total as f64) * 100.0).round() as u8
        };
        Self { present, absent, total, percentage }
    }
}
