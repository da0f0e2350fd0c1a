#[derive(Debug, Clone)]
pub enum Message {
    // === STORE MESSAGES ===
    StoreCall {
        operation: &'static str,
        backend: &'static str,
    },
    FallingBack {
        operation: &'static str,
        reason: String,
    },
    StoreCallFailed {
        operation: &'static str,
        error: String,
    },
    AttendanceInserted(String, String), // student id, date
    AttendanceUpdated(String, String),  // student id, date
    AttendanceInsertRaced(String, String),
    StudentDeleted(String, usize), // student id, removed attendance records

    // === CONNECTION MESSAGES ===
    ModeChanged {
        from: String,
        to: String,
        reason: String,
    },
    ModeUnchanged(String),
    ProbeStarted(String), // url
    ProbeFinished {
        target: String,
        outcome: String,
        elapsed_ms: u128,
    },
    RetryRequested,
    RemoteNotConfigured,

    // === DIAGNOSIS MESSAGES ===
    DiagnosisNoNetwork,
    DiagnosisNoNetworkAdvice,
    DiagnosisNoInternet(String), // outcome
    DiagnosisNoInternetAdvice,
    DiagnosisNotConfigured,
    DiagnosisNotConfiguredAdvice,
    DiagnosisRemoteTimeout(u64), // timeout ms
    DiagnosisRemoteTimeoutAdvice,
    DiagnosisRemoteUnreachable(String), // outcome
    DiagnosisRemoteUnreachableAdvice,
    DiagnosisHealthyWhileDegraded,

    // === AUTHENTICATION MESSAGES ===
    AuthInitializing,
    AuthCheckAttempt(u32, u32, String), // attempt, max, outcome
    AuthSoftTimeout(u64),               // ms
    AuthHardTimeout(u64),               // ms
    AuthStateChanged(String),
    AuthSessionRestored(String), // email
    AuthSessionExpired,
    SignUpStarted(String),
    SignUpDuplicate(String),
    SignUpInterrupted(String),
    SignUpPartialFailure(String, String), // email, error
    SignUpConfirmationRequired(String),
    SignedUp(String),
    SignInStarted(String),
    SignedIn(String),
    ProfileCreatedOnSignIn(String),
    ProfileUnavailable(String, String), // email, error
    SignedOut,
    SignOutFailed(String),
    PasswordUpdated,
    ProfileRenamed(String),
    AccountAlreadyExists,
    InvalidLoginCredentials,
    NotSignedIn,
    SubscriptionCancelled,

    // === SESSION CACHE MESSAGES ===
    SessionCacheWriteFailed(String),
    SessionCacheCorrupt(String),

    // === CONFIGURATION MESSAGES ===
    ConfigLoaded(String), // path
    ConfigFileNotFound,
    ConfigEnvOverride(&'static str),
}
