//! Table CRUD against the remote service's REST surface.
//!
//! Filters use the `column=op.value` query syntax (`eq`, `gte`, `lte`, `in`).
//! Writes ask for `Prefer: return=representation` so the stored row comes back
//! with its generated id and timestamp. Row-level access policy on the remote
//! side is keyed by the bearer token the shared [`RemoteClient`] carries.

use super::client::RemoteClient;
use crate::libs::error::StoreError;
use crate::libs::models::{AttendanceRecord, Class, NewAttendance, NewClass, NewStudent, NewTeacher, Student, Teacher};
use crate::libs::store::EntityStore;
use chrono::NaiveDate;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

const TEACHERS: &str = "teachers";
const CLASSES: &str = "classes";
const STUDENTS: &str = "students";
const ATTENDANCE: &str = "attendance";

const PREFER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";
const BY_CREATION: (&str, &str) = ("order", "created_at.asc");

pub struct RemoteStore {
    client: RemoteClient,
}

impl RemoteStore {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    fn path(table: &str) -> String {
        format!("rest/v1/{}", table)
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>, StoreError> {
        let request = self
            .client
            .request(Method::GET, &Self::path(table))
            .query(&[("select", "*")])
            .query(query);
        self.client.send_json(request).await
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(&self, table: &'static str, body: &B) -> Result<T, StoreError> {
        let request = self
            .client
            .request(Method::POST, &Self::path(table))
            .header(PREFER, RETURN_REPRESENTATION)
            .json(body);
        let mut rows: Vec<T> = self.client.send_json(request).await?;
        if rows.is_empty() {
            return Err(StoreError::service(200, format!("Insert into {} returned no row", table)));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update_by_id<T: DeserializeOwned>(
        &self,
        table: &'static str,
        entity: &'static str,
        id: Uuid,
        patch: serde_json::Value,
    ) -> Result<T, StoreError> {
        let request = self
            .client
            .request(Method::PATCH, &Self::path(table))
            .query(&[("id", format!("eq.{}", id))])
            .header(PREFER, RETURN_REPRESENTATION)
            .json(&patch);
        let mut rows: Vec<T> = self.client.send_json(request).await?;
        if rows.is_empty() {
            return Err(StoreError::not_found(entity, id));
        }
        Ok(rows.swap_remove(0))
    }
}

impl EntityStore for RemoteStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    async fn create_teacher(&self, new: &NewTeacher) -> Result<Teacher, StoreError> {
        self.insert(TEACHERS, &[new]).await
    }

    async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError> {
        let rows: Vec<Teacher> = self.select(TEACHERS, &[("email", format!("eq.{}", email))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_teacher_name(&self, teacher_id: Uuid, name: &str) -> Result<Teacher, StoreError> {
        self.update_by_id(TEACHERS, "teacher", teacher_id, json!({ "name": name })).await
    }

    async fn create_class(&self, new: &NewClass) -> Result<Class, StoreError> {
        self.insert(CLASSES, &[new]).await
    }

    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError> {
        self.select(
            CLASSES,
            &[("teacher_id", format!("eq.{}", teacher_id)), (BY_CREATION.0, BY_CREATION.1.to_string())],
        )
        .await
    }

    async fn class_by_id(&self, class_id: Uuid) -> Result<Option<Class>, StoreError> {
        let rows: Vec<Class> = self.select(CLASSES, &[("id", format!("eq.{}", class_id))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn create_student(&self, new: &NewStudent) -> Result<Student, StoreError> {
        self.insert(STUDENTS, &[new]).await
    }

    async fn students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>, StoreError> {
        self.select(
            STUDENTS,
            &[("class_id", format!("eq.{}", class_id)), (BY_CREATION.0, BY_CREATION.1.to_string())],
        )
        .await
    }

    async fn update_student(&self, student_id: Uuid, name: &str) -> Result<Student, StoreError> {
        self.update_by_id(STUDENTS, "student", student_id, json!({ "name": name })).await
    }

    async fn delete_student(&self, student_id: Uuid) -> Result<(), StoreError> {
        // Attendance rows go with the student through the foreign key cascade.
        let request = self
            .client
            .request(Method::DELETE, &Self::path(STUDENTS))
            .query(&[("id", format!("eq.{}", student_id))])
            .header(PREFER, RETURN_REPRESENTATION);
        let rows: Vec<Student> = self.client.send_json(request).await?;
        if rows.is_empty() {
            return Err(StoreError::not_found("student", student_id));
        }
        Ok(())
    }

    async fn attendance_by_key(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError> {
        let rows: Vec<AttendanceRecord> = self
            .select(
                ATTENDANCE,
                &[("student_id", format!("eq.{}", student_id)), ("date", format!("eq.{}", date))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, StoreError> {
        self.insert(ATTENDANCE, &[new]).await
    }

    async fn update_attendance_status(&self, record_id: Uuid, status: bool) -> Result<AttendanceRecord, StoreError> {
        self.update_by_id(ATTENDANCE, "attendance", record_id, json!({ "status": status })).await
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
        let ids = student_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        self.select(
            ATTENDANCE,
            &[
                ("student_id", format!("in.({})", ids)),
                ("date", format!("gte.{}", start)),
                ("date", format!("lte.{}", end)),
                ("order", "date.asc".to_string()),
            ],
        )
        .await
    }
}
