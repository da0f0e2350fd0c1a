#![allow(dead_code)]

use chrono::NaiveDate;
use parking_lot::Mutex;
use rollcall::api::auth::{AuthSession, Identity, IdentityProvider};
use rollcall::api::client::RemoteConfig;
use rollcall::db::db::Db;
use rollcall::db::local_store::LocalStore;
use rollcall::libs::config::ConnectionConfig;
use rollcall::libs::error::{StoreError, UNIQUE_VIOLATION};
use rollcall::libs::models::{AttendanceRecord, Class, NewAttendance, NewClass, NewStudent, NewTeacher, Student, Teacher};
use rollcall::libs::store::EntityStore;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Offline,
    Timeout,
    Unavailable,
    Rejected,
}

impl Fault {
    fn error(self) -> StoreError {
        match self {
            Fault::Offline => StoreError::Offline,
            Fault::Timeout => StoreError::Timeout(Duration::from_secs(1)),
            Fault::Unavailable => StoreError::ServiceUnavailable(503),
            Fault::Rejected => StoreError::service(400, "rejected by policy"),
        }
    }
}

/// Remote store double backed by its own in-memory database.
pub struct ScriptedRemote {
    inner: LocalStore,
    fault: Mutex<Option<(Option<&'static str>, Fault)>>,
    race_next_insert: AtomicBool,
    calls: AtomicUsize,
    lookup_delay: Mutex<Duration>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            inner: LocalStore::new(Db::open_in_memory().unwrap()),
            fault: Mutex::new(None),
            race_next_insert: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            lookup_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Every call fails with `fault`.
    pub fn fail(&self, fault: Fault) {
        *self.fault.lock() = Some((None, fault));
    }

    /// Only `operation` fails with `fault`.
    pub fn fail_on(&self, operation: &'static str, fault: Fault) {
        *self.fault.lock() = Some((Some(operation), fault));
    }

    /// Teacher lookups by email take `delay` before answering.
    pub fn slow_teacher_lookup(&self, delay: Duration) {
        *self.lookup_delay.lock() = delay;
    }

    pub fn heal(&self) {
        *self.fault.lock() = None;
    }

    /// The next attendance insert loses a race against another writer.
    pub fn race_next_insert(&self) {
        self.race_next_insert.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &LocalStore {
        &self.inner
    }

    pub fn teachers(&self) -> Vec<Teacher> {
        self.inner.db().read_collection("teachers").unwrap()
    }

    pub fn attendance(&self) -> Vec<AttendanceRecord> {
        self.inner.db().read_collection("attendance").unwrap()
    }

    fn enter(&self, operation: &'static str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.fault.lock() {
            Some((None, fault)) => Err(fault.error()),
            Some((Some(op), fault)) if op == operation => Err(fault.error()),
            _ => Ok(()),
        }
    }
}

impl EntityStore for ScriptedRemote {
    fn backend_name(&self) -> &'static str {
        "scripted"
    }

    async fn create_teacher(&self, new: &NewTeacher) -> Result<Teacher, StoreError> {
        self.enter("create_teacher")?;
        self.inner.create_teacher(new).await
    }

    async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError> {
        let delay = *self.lookup_delay.lock();
        tokio::time::sleep(delay).await;
        self.enter("teacher_by_email")?;
        self.inner.teacher_by_email(email).await
    }

    async fn update_teacher_name(&self, teacher_id: Uuid, name: &str) -> Result<Teacher, StoreError> {
        self.enter("update_teacher_name")?;
        self.inner.update_teacher_name(teacher_id, name).await
    }

    async fn create_class(&self, new: &NewClass) -> Result<Class, StoreError> {
        self.enter("create_class")?;
        self.inner.create_class(new).await
    }

    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError> {
        self.enter("classes_by_teacher")?;
        self.inner.classes_by_teacher(teacher_id).await
    }

    async fn class_by_id(&self, class_id: Uuid) -> Result<Option<Class>, StoreError> {
        self.enter("class_by_id")?;
        self.inner.class_by_id(class_id).await
    }

    async fn create_student(&self, new: &NewStudent) -> Result<Student, StoreError> {
        self.enter("create_student")?;
        self.inner.create_student(new).await
    }

    async fn students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>, StoreError> {
        self.enter("students_by_class")?;
        self.inner.students_by_class(class_id).await
    }

    async fn update_student(&self, student_id: Uuid, name: &str) -> Result<Student, StoreError> {
        self.enter("update_student")?;
        self.inner.update_student(student_id, name).await
    }

    async fn delete_student(&self, student_id: Uuid) -> Result<(), StoreError> {
        self.enter("delete_student")?;
        self.inner.delete_student(student_id).await
    }

    async fn attendance_by_key(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError> {
        self.enter("attendance_by_key")?;
        self.inner.attendance_by_key(student_id, date).await
    }

    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, StoreError> {
        self.enter("insert_attendance")?;
        if self.race_next_insert.swap(false, Ordering::SeqCst) {
            let other = NewAttendance {
                status: !new.status,
                ..new.clone()
            };
            self.inner.insert_attendance(&other).await?;
            return Err(StoreError::Service {
                status: 409,
                code: Some(UNIQUE_VIOLATION.to_string()),
                message: "duplicate key value violates unique constraint".to_string(),
            });
        }
        self.inner.insert_attendance(new).await
    }

    async fn update_attendance_status(&self, record_id: Uuid, status: bool) -> Result<AttendanceRecord, StoreError> {
        self.enter("update_attendance_status")?;
        self.inner.update_attendance_status(record_id, status).await
    }

    async fn attendance_in_range(
        &self,
        student_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.enter("attendance_in_range")?;
        self.inner.attendance_in_range(student_ids, start, end).await
    }
}

struct Account {
    identity: Identity,
    password: String,
}

/// Identity provider double with in-memory accounts.
pub struct ScriptedIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<AuthSession>>,
    fault: Mutex<Option<Fault>>,
    sign_out_fault: Mutex<Option<Fault>>,
    confirmation_required: AtomicBool,
    session_delay: Mutex<Duration>,
}

impl ScriptedIdentity {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            fault: Mutex::new(None),
            sign_out_fault: Mutex::new(None),
            confirmation_required: AtomicBool::new(false),
            session_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Registers an account directly, as if it was created elsewhere.
    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.accounts.lock().insert(
            email.to_string(),
            Account {
                identity: Identity {
                    id: Uuid::new_v4(),
                    email: email.to_string(),
                },
                password: password.to_string(),
            },
        );
        self
    }

    /// Pretends a session for `email` was persisted by an earlier run.
    pub fn with_stored_session(self, email: &str) -> Self {
        let identity = self.accounts.lock().get(email).map(|a| a.identity.clone()).unwrap();
        *self.current.lock() = Some(session_for(identity));
        self
    }

    pub fn with_session_delay(self, delay: Duration) -> Self {
        *self.session_delay.lock() = delay;
        self
    }

    pub fn require_confirmation(&self) {
        self.confirmation_required.store(true, Ordering::SeqCst);
    }

    pub fn fail(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }

    /// Only sign-out fails with `fault`.
    pub fn fail_sign_out(&self, fault: Fault) {
        *self.sign_out_fault.lock() = Some(fault);
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.accounts.lock().contains_key(email)
    }

    fn check(&self) -> Result<(), StoreError> {
        match *self.fault.lock() {
            Some(fault) => Err(fault.error()),
            None => Ok(()),
        }
    }
}

fn session_for(identity: Identity) -> AuthSession {
    AuthSession {
        identity,
        access_token: Some(format!("token-{}", Uuid::new_v4())),
        refresh_token: None,
    }
}

impl IdentityProvider for ScriptedIdentity {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, StoreError> {
        let delay = *self.session_delay.lock();
        tokio::time::sleep(delay).await;
        self.check()?;
        Ok(self.current.lock().clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(Identity, Option<AuthSession>), StoreError> {
        self.check()?;
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(email) {
            return Err(StoreError::service(422, "User already registered"));
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
        };
        accounts.insert(
            email.to_string(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        if self.confirmation_required.load(Ordering::SeqCst) {
            return Ok((identity, None));
        }
        let session = session_for(identity.clone());
        *self.current.lock() = Some(session.clone());
        Ok((identity, Some(session)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError> {
        self.check()?;
        let session = match self.accounts.lock().get(email) {
            Some(account) if account.password == password => session_for(account.identity.clone()),
            _ => return Err(StoreError::service(400, "Invalid login credentials")),
        };
        *self.current.lock() = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        *self.current.lock() = None;
        if let Some(fault) = *self.sign_out_fault.lock() {
            return Err(fault.error());
        }
        self.check()
    }

    async fn update_password(&self, password: &str) -> Result<(), StoreError> {
        self.check()?;
        let email = self
            .current
            .lock()
            .as_ref()
            .map(|s| s.identity.email.clone())
            .ok_or_else(|| StoreError::service(401, "No user is signed in"))?;
        if let Some(account) = self.accounts.lock().get_mut(&email) {
            account.password = password.to_string();
        }
        Ok(())
    }
}

/// HTTP endpoint that answers every request with `200 OK`.
pub async fn healthy_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// TCP endpoint that accepts connections and never answers.
pub async fn silent_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

pub fn remote_at(addr: SocketAddr) -> RemoteConfig {
    RemoteConfig {
        api_url: format!("http://{}", addr),
        anon_key: "test-anon-key".to_string(),
    }
}

/// Loopback-only probe settings with short timeouts.
pub fn fast_connection(external: SocketAddr) -> ConnectionConfig {
    ConnectionConfig {
        probe_timeout_ms: 1_000,
        network_timeout_ms: 500,
        external_timeout_ms: 1_000,
        remote_timeout_ms: 1_000,
        request_timeout_ms: 1_000,
        external_probe_url: format!("http://{}/generate_204", external),
        route_probe_addr: "127.0.0.1:9".to_string(),
        ..ConnectionConfig::default()
    }
}

pub fn day(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}
