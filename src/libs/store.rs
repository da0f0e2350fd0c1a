//! Entity contract shared by both stores, and the facade that routes between them.
//!
//! [`DataStore`] consults [`ConnectionManager::mode`] before every call. In
//! remote mode a connectivity-class failure makes it replay the same logical
//! operation against the local store, then demote the connection to local
//! fallback; any other failure is returned untouched. In local-fallback mode
//! the remote store is not contacted at all until an explicit
//! [`ConnectionManager::retry`] succeeds.
//!
//! ```rust,no_run
//! # async fn demo(store: &rollcall::libs::store::DataStore) -> Result<(), rollcall::libs::error::StoreError> {
//! use chrono::NaiveDate;
//!
//! let teacher = store.create_teacher("ada@example.com", "Ada").await?;
//! let class = store.create_class(teacher.id, "Hillside", "7B", "2024-25").await?;
//! let student = store.create_student(class.id, "Grace").await?;
//! let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! store.mark_attendance(student.id, day, true).await?;
//! # Ok(())
//! # }
//! ```

use crate::api::rest::RemoteStore;
use crate::db::local_store::LocalStore;
use crate::libs::connection::{ConnectionManager, Mode};
use crate::libs::error::StoreError;
use crate::libs::messages::Message;
use crate::libs::models::{AttendanceRecord, Class, NewAttendance, NewClass, NewStudent, NewTeacher, Student, Teacher};
use crate::{msg_debug, msg_warning};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Per-entity CRUD contract implemented by the remote and the local store.
///
/// Lookups return `Ok(None)` / an empty `Vec` for absence; updates and deletes
/// of a missing id return [`StoreError::NotFound`]. Listing order is creation
/// order, which is also roster order.
#[allow(async_fn_in_trait)]
pub trait EntityStore {
    /// Short label used in log lines.
    fn backend_name(&self) -> &'static str;

    async fn create_teacher(&self, new: &NewTeacher) -> Result<Teacher, StoreError>;
    async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError>;
    async fn update_teacher_name(&self, teacher_id: Uuid, name: &str) -> Result<Teacher, StoreError>;

    async fn create_class(&self, new: &NewClass) -> Result<Class, StoreError>;
    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError>;
    async fn class_by_id(&self, class_id: Uuid) -> Result<Option<Class>, StoreError>;

    async fn create_student(&self, new: &NewStudent) -> Result<Student, StoreError>;
    async fn students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>, StoreError>;
    async fn update_student(&self, student_id: Uuid, name: &str) -> Result<Student, StoreError>;
    async fn delete_student(&self, student_id: Uuid) -> Result<(), StoreError>;

    async fn attendance_by_key(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, StoreError>;
    async fn update_attendance_status(&self, record_id: Uuid, status: bool) -> Result<AttendanceRecord, StoreError>;
    /// Records of the given students with `start <= date <= end`, ordered by date.
    async fn attendance_in_range(
        &self,
        student_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// Whichever store a call was routed to.
pub enum Backend<'s, R> {
    Remote(&'s R),
    Local(&'s LocalStore),
}

impl<R> Clone for Backend<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Backend<'_, R> {}

macro_rules! delegate {
    ($self:ident . $method:ident ( $($arg:expr),* )) => {
        match $self {
            Backend::Remote(store) => store.$method($($arg),*).await,
            Backend::Local(store) => store.$method($($arg),*).await,
        }
    };
}

impl<R: EntityStore> EntityStore for Backend<'_, R> {
    fn backend_name(&self) -> &'static str {
        match self {
            Backend::Remote(store) => store.backend_name(),
            Backend::Local(store) => store.backend_name(),
        }
    }

    async fn create_teacher(&self, new: &NewTeacher) -> Result<Teacher, StoreError> {
        delegate!(self.create_teacher(new))
    }

    async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError> {
        delegate!(self.teacher_by_email(email))
    }

    async fn update_teacher_name(&self, teacher_id: Uuid, name: &str) -> Result<Teacher, StoreError> {
        delegate!(self.update_teacher_name(teacher_id, name))
    }

    async fn create_class(&self, new: &NewClass) -> Result<Class, StoreError> {
        delegate!(self.create_class(new))
    }

    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError> {
        delegate!(self.classes_by_teacher(teacher_id))
    }

    async fn class_by_id(&self, class_id: Uuid) -> Result<Option<Class>, StoreError> {
        delegate!(self.class_by_id(class_id))
    }

    async fn create_student(&self, new: &NewStudent) -> Result<Student, StoreError> {
        delegate!(self.create_student(new))
    }

    async fn students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>, StoreError> {
        delegate!(self.students_by_class(class_id))
    }

    async fn update_student(&self, student_id: Uuid, name: &str) -> Result<Student, StoreError> {
        delegate!(self.update_student(student_id, name))
    }

    async fn delete_student(&self, student_id: Uuid) -> Result<(), StoreError> {
        delegate!(self.delete_student(student_id))
    }

    async fn attendance_by_key(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError> {
        delegate!(self.attendance_by_key(student_id, date))
    }

    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, StoreError> {
        delegate!(self.insert_attendance(new))
    }

    async fn update_attendance_status(&self, record_id: Uuid, status: bool) -> Result<AttendanceRecord, StoreError> {
        delegate!(self.update_attendance_status(record_id, status))
    }

    async fn attendance_in_range(
        &self,
        student_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        delegate!(self.attendance_in_range(student_ids, start, end))
    }
}

type AttendanceKey = (Uuid, NaiveDate);

/// Routing facade over the remote and local stores.
pub struct DataStore<R = RemoteStore> {
    connection: Arc<ConnectionManager>,
    remote: Option<R>,
    local: LocalStore,
    key_locks: Mutex<HashMap<AttendanceKey, Arc<AsyncMutex<()>>>>,
}

impl<R: EntityStore> DataStore<R> {
    /// `remote` is `None` when the service is not configured; every call then
    /// goes to `local` regardless of mode.
    pub fn new(connection: Arc<ConnectionManager>, remote: Option<R>, local: LocalStore) -> Self {
        Self {
            connection,
            remote,
            local,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn remote(&self) -> Option<&R> {
        self.remote.as_ref()
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// The store matching the current mode. Calls made through it do not fall back.
    pub fn active(&self) -> Backend<'_, R> {
        match (self.connection.mode(), &self.remote) {
            (Mode::Remote, Some(remote)) => Backend::Remote(remote),
            _ => Backend::Local(&self.local),
        }
    }

    async fn route<'s, T, F, Fut>(&'s self, operation: &'static str, op: F) -> Result<T, StoreError>
    where
        F: Fn(Backend<'s, R>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let backend = self.active();
        msg_debug!(Message::StoreCall {
            operation,
            backend: backend.backend_name(),
        });

        let result = match backend {
            Backend::Remote(_) => match op(backend).await {
                Err(err) if err.is_connectivity() => {
                    msg_warning!(Message::FallingBack {
                        operation,
                        reason: err.to_string(),
                    });
                    let local = op(Backend::Local(&self.local)).await;
                    self.connection.degrade(&err);
                    local
                }
                other => other,
            },
            Backend::Local(_) => op(backend).await,
        };

        if let Err(err) = &result {
            msg_debug!(Message::StoreCallFailed {
                operation,
                error: err.to_string(),
            });
        }
        result
    }

    pub async fn create_teacher(&self, email: &str, name: &str) -> Result<Teacher, StoreError> {
        let new = NewTeacher {
            email: normalize_email(email)?,
            name: required("name", name)?,
        };
        let new = &new;
        self.route("create_teacher", move |store| async move { store.create_teacher(new).await })
            .await
    }

    pub async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError> {
        let email = normalize_email(email)?;
        let email = email.as_str();
        self.route("teacher_by_email", move |store| async move { store.teacher_by_email(email).await })
            .await
    }

    pub async fn update_teacher_name(&self, teacher_id: Uuid, name: &str) -> Result<Teacher, StoreError> {
        let name = required("name", name)?;
        let name = name.as_str();
        self.route("update_teacher_name", move |store| async move {
            store.update_teacher_name(teacher_id, name).await
        })
        .await
    }

    pub async fn create_class(
        &self,
        teacher_id: Uuid,
        school_name: &str,
        class_name: &str,
        session: &str,
    ) -> Result<Class, StoreError> {
        let new = NewClass {
            teacher_id,
            school_name: required("school name", school_name)?,
            class_name: required("class name", class_name)?,
            session: required("session", session)?,
        };
        let new = &new;
        self.route("create_class", move |store| async move { store.create_class(new).await })
            .await
    }

    pub async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError> {
        self.route("classes_by_teacher", move |store| async move { store.classes_by_teacher(teacher_id).await })
            .await
    }

    pub async fn class_by_id(&self, class_id: Uuid) -> Result<Option<Class>, StoreError> {
        self.route("class_by_id", move |store| async move { store.class_by_id(class_id).await })
            .await
    }

    pub async fn create_student(&self, class_id: Uuid, name: &str) -> Result<Student, StoreError> {
        let new = NewStudent {
            class_id,
            name: required("student name", name)?,
        };
        let new = &new;
        self.route("create_student", move |store| async move { store.create_student(new).await })
            .await
    }

    pub async fn students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>, StoreError> {
        self.route("students_by_class", move |store| async move { store.students_by_class(class_id).await })
            .await
    }

    pub async fn update_student(&self, student_id: Uuid, name: &str) -> Result<Student, StoreError> {
        let name = required("student name", name)?;
        let name = name.as_str();
        self.route("update_student", move |store| async move { store.update_student(student_id, name).await })
            .await
    }

    pub async fn delete_student(&self, student_id: Uuid) -> Result<(), StoreError> {
        self.route("delete_student", move |store| async move { store.delete_student(student_id).await })
            .await
    }

    /// Insert-or-update keyed by `(student_id, date)`.
    ///
    /// Calls for the same key are serialized within this process, so two
    /// concurrent marks of an unmarked day cannot both insert. An existing
    /// record keeps its id and `created_at`; only `status` changes.
    pub async fn mark_attendance(&self, student_id: Uuid, date: NaiveDate, status: bool) -> Result<AttendanceRecord, StoreError> {
        let key = (student_id, date);
        let guard = self.key_lock(key);
        let result = {
            let _held = guard.lock().await;
            let new = NewAttendance { student_id, date, status };
            let new = &new;
            self.route("mark_attendance", move |store| async move { upsert_attendance(&store, new).await })
                .await
        };
        self.release_key_lock(key, guard);
        result
    }

    pub async fn attendance_by_key(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError> {
        self.route("attendance_by_key", move |store| async move { store.attendance_by_key(student_id, date).await })
            .await
    }

    fn key_lock(&self, key: AttendanceKey) -> Arc<AsyncMutex<()>> {
        self.key_locks.lock().entry(key).or_default().clone()
    }

    fn release_key_lock(&self, key: AttendanceKey, guard: Arc<AsyncMutex<()>>) {
        let mut locks = self.key_locks.lock();
        // One reference lives in the map and one is ours; anything more is a waiter.
        if Arc::strong_count(&guard) <= 2 {
            locks.remove(&key);
        }
    }
}

async fn upsert_attendance<S: EntityStore>(store: &S, new: &NewAttendance) -> Result<AttendanceRecord, StoreError> {
    let student = new.student_id.to_string();
    let date = new.date.to_string();

    if let Some(existing) = store.attendance_by_key(new.student_id, new.date).await? {
        let record = store.update_attendance_status(existing.id, new.status).await?;
        msg_debug!(Message::AttendanceUpdated(student, date));
        return Ok(record);
    }

    match store.insert_attendance(new).await {
        Ok(record) => {
            msg_debug!(Message::AttendanceInserted(student, date));
            Ok(record)
        }
        // Another writer won the insert; the uniqueness constraint kept the key single.
        Err(err) if err.is_unique_violation() => {
            msg_warning!(Message::AttendanceInsertRaced(student.clone(), date.clone()));
            let existing = store
                .attendance_by_key(new.student_id, new.date)
                .await?
                .ok_or_else(|| StoreError::not_found("attendance", format!("{}@{}", student, date)))?;
            store.update_attendance_status(existing.id, new.status).await
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

pub(crate) fn normalize_email(email: &str) -> Result<String, StoreError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(StoreError::Validation(format!("'{}' is not a valid email address", email))),
    }
}
