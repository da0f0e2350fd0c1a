//! Display implementation for rollcall messages.
//!
//! All user-facing and log text lives here so wording stays consistent between
//! tracing output, diagnosis reports and `Failure` messages surfaced to the
//! view layer.

use super::types::Message;
use std::fmt::{Display, Formatter, Result};

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let text = match self {
            // === STORE MESSAGES ===
            Message::StoreCall { operation, backend } => format!("{} via {} store", operation, backend),
            Message::FallingBack { operation, reason } => {
                format!("Remote {} failed ({}), serving it from local storage", operation, reason)
            }
            Message::StoreCallFailed { operation, error } => format!("{} failed: {}", operation, error),
            Message::AttendanceInserted(student, date) => format!("Attendance recorded for student {} on {}", student, date),
            Message::AttendanceUpdated(student, date) => format!("Attendance updated for student {} on {}", student, date),
            Message::AttendanceInsertRaced(student, date) => {
                format!("Attendance for student {} on {} was inserted concurrently, updating instead", student, date)
            }
            Message::StudentDeleted(student, records) => {
                format!("Student {} deleted along with {} attendance record(s)", student, records)
            }

            // === CONNECTION MESSAGES ===
            Message::ModeChanged { from, to, reason } => format!("Connection mode changed from {} to {}: {}", from, to, reason),
            Message::ModeUnchanged(mode) => format!("Connection mode stays {}", mode),
            Message::ProbeStarted(url) => format!("Probing {}", url),
            Message::ProbeFinished { target, outcome, elapsed_ms } => {
                format!("Probe of {} finished as {} in {} ms", target, outcome, elapsed_ms)
            }
            Message::RetryRequested => "Retrying connection to the remote service".to_string(),
            Message::RemoteNotConfigured => {
                "Remote service is not configured, running with local storage only".to_string()
            }

            // === DIAGNOSIS MESSAGES ===
            Message::DiagnosisNoNetwork => "No network connection detected on this device".to_string(),
            Message::DiagnosisNoNetworkAdvice => "Check your Wi-Fi or wired connection and try again".to_string(),
            Message::DiagnosisNoInternet(outcome) => format!("Cannot reach the internet ({})", outcome),
            Message::DiagnosisNoInternetAdvice => {
                "Check proxy, firewall and DNS settings, or whether the network requires a captive-portal login".to_string()
            }
            Message::DiagnosisNotConfigured => "Remote service URL or API key is missing".to_string(),
            Message::DiagnosisNotConfiguredAdvice => {
                "Set ROLLCALL_REMOTE_URL and ROLLCALL_REMOTE_KEY, or add a \"remote\" section to config.json".to_string()
            }
            Message::DiagnosisRemoteTimeout(ms) => format!("Remote service did not respond within {} ms", ms),
            Message::DiagnosisRemoteTimeoutAdvice => {
                "The service may be paused or overloaded; wait a moment and retry".to_string()
            }
            Message::DiagnosisRemoteUnreachable(outcome) => format!("Cannot reach the remote service ({})", outcome),
            Message::DiagnosisRemoteUnreachableAdvice => {
                "Verify the service URL, and that DNS, CORS and firewall rules allow access to it".to_string()
            }
            Message::DiagnosisHealthyWhileDegraded => {
                "Connection looks healthy; retry to leave offline mode".to_string()
            }

            // === AUTHENTICATION MESSAGES ===
            Message::AuthInitializing => "Initializing authentication state".to_string(),
            Message::AuthCheckAttempt(attempt, max, outcome) => {
                format!("Reachability check {}/{}: {}", attempt, max, outcome)
            }
            Message::AuthSoftTimeout(ms) => {
                format!("No answer from the remote service after {} ms, continuing in offline mode while waiting", ms)
            }
            Message::AuthHardTimeout(ms) => format!("Gave up waiting for the remote service after {} ms", ms),
            Message::AuthStateChanged(state) => format!("Auth state: {}", state),
            Message::AuthSessionRestored(email) => format!("Session restored for {}", email),
            Message::AuthSessionExpired => "Stored session is no longer valid".to_string(),
            Message::SignUpStarted(email) => format!("Signing up {}", email),
            Message::SignUpDuplicate(email) => format!("An account for {} already exists", email),
            Message::SignUpInterrupted(email) => {
                format!("Lost connection to the remote service while signing up {}; try again when online", email)
            }
            Message::SignUpPartialFailure(email, error) => {
                format!("Account for {} was created but its teacher profile was not: {}", email, error)
            }
            Message::SignUpConfirmationRequired(email) => {
                format!("Please check {} to confirm your account before logging in", email)
            }
            Message::SignedUp(email) => format!("Signed up {}", email),
            Message::SignInStarted(email) => format!("Signing in {}", email),
            Message::SignedIn(email) => format!("Signed in {}", email),
            Message::ProfileCreatedOnSignIn(email) => format!("No teacher profile for {}, created one", email),
            Message::ProfileUnavailable(email, error) => format!("Teacher profile for {} is unavailable: {}", email, error),
            Message::SignedOut => "Signed out".to_string(),
            Message::SignOutFailed(error) => format!("Sign out failed: {}", error),
            Message::PasswordUpdated => "Password updated".to_string(),
            Message::ProfileRenamed(name) => format!("Profile renamed to {}", name),
            Message::AccountAlreadyExists => "User already exists".to_string(),
            Message::InvalidLoginCredentials => "Invalid login credentials".to_string(),
            Message::NotSignedIn => "No user is signed in".to_string(),
            Message::SubscriptionCancelled => "Auth state subscription cancelled".to_string(),

            // === SESSION CACHE MESSAGES ===
            Message::SessionCacheWriteFailed(error) => format!("Could not persist session: {}", error),
            Message::SessionCacheCorrupt(error) => format!("Discarding unreadable session cache: {}", error),

            // === CONFIGURATION MESSAGES ===
            Message::ConfigLoaded(path) => format!("Configuration loaded from {}", path),
            Message::ConfigFileNotFound => "Configuration file not found, using defaults".to_string(),
            Message::ConfigEnvOverride(var) => format!("Using {} from the environment", var),
        };
        write!(f, "{}", text)
    }
}
