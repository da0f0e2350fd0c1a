//! On-device store used when the remote service cannot be reached.
//!
//! Each entity kind lives in one collection document inside [`Db`]. Every write
//! is read-modify-write of the whole collection while the collection lock is
//! held, so writers inside this process never interleave on a collection.

use super::db::Db;
use crate::libs::error::StoreError;
use crate::libs::messages::Message;
use crate::libs::models::{AttendanceRecord, Class, NewAttendance, NewClass, NewStudent, NewTeacher, Student, Teacher};
use crate::libs::store::EntityStore;
use crate::msg_debug;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub const TEACHERS: &str = "teachers";
pub const CLASSES: &str = "classes";
pub const STUDENTS: &str = "students";
pub const ATTENDANCE: &str = "attendance";

#[derive(Clone)]
pub struct LocalStore {
    db: Db,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    fn all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StoreError> {
        self.db.read_collection(collection)
    }

    /// Applies `change` to a collection and writes it back, atomically with
    /// respect to other writers of this store.
    fn modify<T, O, F>(&self, collection: &str, change: F) -> Result<O, StoreError>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(&mut Vec<T>) -> Result<O, StoreError>,
    {
        let _guard = self.write_lock.lock();
        let mut items: Vec<T> = self.db.read_collection(collection)?;
        let out = change(&mut items)?;
        self.db.write_collection(collection, &items)?;
        Ok(out)
    }

    fn append<T: DeserializeOwned + Serialize + Clone>(&self, collection: &str, item: T) -> Result<T, StoreError> {
        self.modify(collection, |items: &mut Vec<T>| {
            items.push(item.clone());
            Ok(item)
        })
    }
}

impl EntityStore for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn create_teacher(&self, new: &NewTeacher) -> Result<Teacher, StoreError> {
        self.modify(TEACHERS, |teachers: &mut Vec<Teacher>| {
            if teachers.iter().any(|t| t.email == new.email) {
                return Err(StoreError::Service {
                    status: 409,
                    code: Some(crate::libs::error::UNIQUE_VIOLATION.to_string()),
                    message: format!("Teacher with email {} already exists", new.email),
                });
            }
            let teacher = Teacher::from_new(new);
            teachers.push(teacher.clone());
            Ok(teacher)
        })
    }

    async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError> {
        let teachers: Vec<Teacher> = self.all(TEACHERS)?;
        Ok(teachers.into_iter().find(|t| t.email == email))
    }

    async fn update_teacher_name(&self, teacher_id: Uuid, name: &str) -> Result<Teacher, StoreError> {
        self.modify(TEACHERS, |teachers: &mut Vec<Teacher>| {
            let teacher = teachers
                .iter_mut()
                .find(|t| t.id == teacher_id)
                .ok_or_else(|| StoreError::not_found("teacher", teacher_id))?;
            teacher.name = name.to_string();
            Ok(teacher.clone())
        })
    }

    async fn create_class(&self, new: &NewClass) -> Result<Class, StoreError> {
        self.append(CLASSES, Class::from_new(new))
    }

    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError> {
        let classes: Vec<Class> = self.all(CLASSES)?;
        Ok(classes.into_iter().filter(|c| c.teacher_id == teacher_id).collect())
    }

    async fn class_by_id(&self, class_id: Uuid) -> Result<Option<Class>, StoreError> {
        let classes: Vec<Class> = self.all(CLASSES)?;
        Ok(classes.into_iter().find(|c| c.id == class_id))
    }

    async fn create_student(&self, new: &NewStudent) -> Result<Student, StoreError> {
        self.append(STUDENTS, Student::from_new(new))
    }

    async fn students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>, StoreError> {
        let students: Vec<Student> = self.all(STUDENTS)?;
        Ok(students.into_iter().filter(|s| s.class_id == class_id).collect())
    }

    async fn update_student(&self, student_id: Uuid, name: &str) -> Result<Student, StoreError> {
        self.modify(STUDENTS, |students: &mut Vec<Student>| {
            let student = students
                .iter_mut()
                .find(|s| s.id == student_id)
                .ok_or_else(|| StoreError::not_found("student", student_id))?;
            student.name = name.to_string();
            Ok(student.clone())
        })
    }

    async fn delete_student(&self, student_id: Uuid) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut students: Vec<Student> = self.db.read_collection(STUDENTS)?;
        let before = students.len();
        students.retain(|s| s.id != student_id);
        if students.len() == before {
            return Err(StoreError::not_found("student", student_id));
        }

        let mut records: Vec<AttendanceRecord> = self.db.read_collection(ATTENDANCE)?;
        let count = records.len();
        records.retain(|r| r.student_id != student_id);

        // Attendance first: a failed student write must not leave orphaned records.
        self.db.write_collection(ATTENDANCE, &records)?;
        self.db.write_collection(STUDENTS, &students)?;
        msg_debug!(Message::StudentDeleted(student_id.to_string(), count - records.len()));
        Ok(())
    }

    async fn attendance_by_key(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError> {
        let records: Vec<AttendanceRecord> = self.all(ATTENDANCE)?;
        Ok(records.into_iter().find(|r| r.student_id == student_id && r.date == date))
    }

    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, StoreError> {
        self.modify(ATTENDANCE, |records: &mut Vec<AttendanceRecord>| {
            if records.iter().any(|r| r.student_id == new.student_id && r.date == new.date) {
                return Err(StoreError::Service {
                    status: 409,
                    code: Some(crate::libs::error::UNIQUE_VIOLATION.to_string()),
                    message: format!("Attendance for {} on {} already exists", new.student_id, new.date),
                });
            }
            let record = AttendanceRecord::from_new(new);
            records.push(record.clone());
            Ok(record)
        })
    }

    async fn update_attendance_status(&self, record_id: Uuid, status: bool) -> Result<AttendanceRecord, StoreError> {
        self.modify(ATTENDANCE, |records: &mut Vec<AttendanceRecord>| {
            let record = records
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or_else(|| StoreError::not_found("attendance", record_id))?;
            record.status = status;
            Ok(record.clone())
        })
    }

    async fn attendance_in_range(
        &self,
        student_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        if student_ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<&Uuid> = student_ids.iter().collect();
        let records: Vec<AttendanceRecord> = self.all(ATTENDANCE)?;
        let mut found: Vec<AttendanceRecord> = records
            .into_iter()
            .filter(|r| wanted.contains(&r.student_id) && r.date >= start && r.date <= end)
            .collect();
        found.sort_by_key(|r| r.date);
        Ok(found)
    }
}
