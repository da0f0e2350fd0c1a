//! Per-day and per-range attendance views for a class.
//!
//! Reads go to whichever store is active when the call starts and never take
//! part in fallback decisions; a failure is returned to the caller as is.
//!
//! The daily view and the range view treat a missing record differently on
//! purpose. [`AttendanceAggregator::by_date`] reports it as [`Mark::Unmarked`]
//! so the teacher can act on it, while [`AttendanceAggregator::by_date_range`]
//! counts it as absent so every day adds up to the roster size.
//!
//! [`Mark::Unmarked`]: crate::libs::models::Mark::Unmarked

use crate::api::rest::RemoteStore;
use crate::libs::error::StoreError;
use crate::libs::models::{AttendanceRecord, AttendanceSummary, DailyCount, RosterEntry, StudentDay};
use crate::libs::store::{DataStore, EntityStore};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub struct AttendanceAggregator<R = RemoteStore> {
    store: Arc<DataStore<R>>,
}

impl<R: EntityStore> AttendanceAggregator<R> {
    pub fn new(store: Arc<DataStore<R>>) -> Self {
        Self { store }
    }

    /// One entry per current roster member, in roster order.
    pub async fn by_date(&self, class_id: Uuid, date: NaiveDate) -> Result<Vec<RosterEntry>, StoreError> {
        let store = self.store.active();
        let roster = store.students_by_class(class_id).await?;
        let ids: Vec<Uuid> = roster.iter().map(|s| s.id).collect();

        let mut marked: HashMap<Uuid, AttendanceRecord> = store
            .attendance_in_range(&ids, date, date)
            .await?
            .into_iter()
            .map(|record| (record.student_id, record))
            .collect();

        Ok(roster
            .into_iter()
            .map(|student| {
                let attendance = marked.remove(&student.id);
                RosterEntry { student, attendance }
            })
            .collect())
    }

    /// Exactly one entry per calendar day in `[start, end]`, with
    /// `present + absent` equal to the current roster size.
    pub async fn by_date_range(&self, class_id: Uuid, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyCount>, StoreError> {
        check_range(start, end)?;
        let store = self.store.active();
        let roster = store.students_by_class(class_id).await?;
        let ids: Vec<Uuid> = roster.iter().map(|s| s.id).collect();
        let records = store.attendance_in_range(&ids, start, end).await?;

        let mut present_by_day: HashMap<NaiveDate, HashSet<Uuid>> = HashMap::new();
        for record in records.iter().filter(|r| r.status) {
            present_by_day.entry(record.date).or_default().insert(record.student_id);
        }

        let roster_size = roster.len();
        Ok(start
            .iter_days()
            .take_while(|day| *day <= end)
            .map(|date| {
                let present = present_by_day.get(&date).map_or(0, HashSet::len);
                DailyCount {
                    date,
                    present,
                    absent: roster_size - present,
                }
            })
            .collect())
    }

    /// Existing records of one student, ordered by date. Days without a record are left out.
    pub async fn student_attendance(&self, student_id: Uuid, start: NaiveDate, end: NaiveDate) -> Result<Vec<StudentDay>, StoreError> {
        check_range(start, end)?;
        let records = self.store.active().attendance_in_range(&[student_id], start, end).await?;
        Ok(records
            .into_iter()
            .map(|r| StudentDay {
                date: r.date,
                status: r.status,
            })
            .collect())
    }

    /// Class totals over a range; unmarked roster members count as absent.
    pub async fn summarize_range(&self, class_id: Uuid, start: NaiveDate, end: NaiveDate) -> Result<AttendanceSummary, StoreError> {
        let days = self.by_date_range(class_id, start, end).await?;
        Ok(summarize_days(&days))
    }

    /// Totals over a student's existing records only.
    pub async fn summarize_student(&self, student_id: Uuid, start: NaiveDate, end: NaiveDate) -> Result<AttendanceSummary, StoreError> {
        let days = self.student_attendance(student_id, start, end).await?;
        let present = days.iter().filter(|d| d.status).count();
        Ok(AttendanceSummary::from_counts(present, days.len() - present))
    }
}

pub fn summarize_days(days: &[DailyCount]) -> AttendanceSummary {
    let (present, absent) = days
        .iter()
        .fold((0, 0), |(present, absent), day| (present + day.present, absent + day.absent));
    AttendanceSummary::from_counts(present, absent)
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), StoreError> {
    if end < start {
        return Err(StoreError::Validation(format!("range end {} is before start {}", end, start)));
    }
    Ok(())
}
