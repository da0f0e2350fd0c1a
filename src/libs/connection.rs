//! Remote reachability tracking, operating mode and layered diagnostics.
//!
//! The mode only moves in one direction on its own: any observed connectivity
//! failure (a failed probe, or a CRUD call the facade had to absorb) demotes it
//! to [`Mode::LocalFallback`]. The only way back to [`Mode::Remote`] is an
//! explicit [`ConnectionManager::retry`] that itself observes the service as
//! reachable. This keeps a flaky link from bouncing a session between stores.

use crate::api::client::RemoteConfig;
use crate::libs::config::ConnectionConfig;
use crate::libs::messages::Message;
use crate::{msg_debug, msg_info, msg_warning};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// Outcome of a reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reachability {
    Reachable,
    /// No local network route.
    Offline,
    /// DNS, refused connection, CORS/firewall rejection or a failing gateway.
    Unreachable,
    Timeout,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reachability::Reachable => "REACHABLE",
            Reachability::Offline => "OFFLINE",
            Reachability::Unreachable => "UNREACHABLE",
            Reachability::Timeout => "TIMEOUT",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Remote,
    LocalFallback,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Remote => "REMOTE",
            Mode::LocalFallback => "LOCAL_FALLBACK",
        })
    }
}

/// Diagnostic layers, checked in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosisLayer {
    Network,
    External,
    Configuration,
    Remote,
}

/// Result of [`ConnectionManager::diagnose`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    /// Layer that stopped the diagnosis.
    pub failed_layer: Option<DiagnosisLayer>,
    /// Probe outcome of the failed layer, when it was a probe.
    pub outcome: Option<Reachability>,
}

impl Diagnosis {
    pub fn is_healthy(&self) -> bool {
        self.failed_layer.is_none()
    }

    fn fail(&mut self, layer: DiagnosisLayer, outcome: Option<Reachability>, issue: Message, advice: Message) {
        self.failed_layer = Some(layer);
        self.outcome = outcome;
        self.issues.push(issue.to_string());
        self.recommendations.push(advice.to_string());
    }
}

struct ConnectionState {
    mode: Mode,
    last_check: Option<Reachability>,
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    remote_health_url: Option<String>,
    anon_key: Option<String>,
    http: Client,
    state: Mutex<ConnectionState>,
}

impl ConnectionManager {
    /// Starts in [`Mode::Remote`] when a remote service is configured, otherwise
    /// in [`Mode::LocalFallback`] for the rest of the process.
    pub fn new(config: &ConnectionConfig, remote: Option<&RemoteConfig>) -> Self {
        let mode = if remote.is_some() { Mode::Remote } else { Mode::LocalFallback };
        if remote.is_none() {
            msg_warning!(Message::RemoteNotConfigured);
        }

        Self {
            config: config.clone(),
            remote_health_url: remote.map(|r| r.endpoint(&config.remote_health_path)),
            anon_key: remote.map(|r| r.anon_key.clone()),
            http: Client::new(),
            state: Mutex::new(ConnectionState { mode, last_check: None }),
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote_health_url.is_some()
    }

    pub fn last_reachability(&self) -> Option<Reachability> {
        self.state.lock().last_check
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Probes the remote service within `timeout`. Never fails; a non-reachable
    /// outcome demotes the mode, a reachable one leaves it as it is.
    pub async fn check_reachability(&self, timeout: Duration) -> Reachability {
        let outcome = self.full_check(timeout).await;
        self.state.lock().last_check = Some(outcome);
        if outcome != Reachability::Reachable {
            self.set_mode(Mode::LocalFallback, &format!("reachability check returned {}", outcome));
        }
        outcome
    }

    /// Re-runs the reachability check; the only path back to [`Mode::Remote`].
    pub async fn retry(&self) -> Reachability {
        msg_info!(Message::RetryRequested);
        let outcome = self.full_check(self.config.probe_timeout()).await;
        self.state.lock().last_check = Some(outcome);
        match outcome {
            Reachability::Reachable => self.set_mode(Mode::Remote, "retry observed the remote service"),
            other => self.set_mode(Mode::LocalFallback, &format!("retry returned {}", other)),
        }
        outcome
    }

    /// Records a connectivity failure seen by a live operation.
    pub fn degrade(&self, cause: &dyn fmt::Display) {
        self.set_mode(Mode::LocalFallback, &cause.to_string());
    }

    /// Layered diagnosis: local network → generic external endpoint →
    /// configuration → remote service. Stops at the first failing layer.
    /// Does not change the mode.
    pub async fn diagnose(&self) -> Diagnosis {
        let mut diagnosis = Diagnosis::default();

        if !self.network_available(Duration::from_millis(self.config.network_timeout_ms)).await {
            diagnosis.fail(
                DiagnosisLayer::Network,
                Some(Reachability::Offline),
                Message::DiagnosisNoNetwork,
                Message::DiagnosisNoNetworkAdvice,
            );
            return diagnosis;
        }

        let external = self
            .probe_url(&self.config.external_probe_url, Duration::from_millis(self.config.external_timeout_ms), None)
            .await;
        if external != Reachability::Reachable {
            diagnosis.fail(
                DiagnosisLayer::External,
                Some(external),
                Message::DiagnosisNoInternet(external.to_string()),
                Message::DiagnosisNoInternetAdvice,
            );
            return diagnosis;
        }

        let Some(url) = &self.remote_health_url else {
            diagnosis.fail(
                DiagnosisLayer::Configuration,
                None,
                Message::DiagnosisNotConfigured,
                Message::DiagnosisNotConfiguredAdvice,
            );
            return diagnosis;
        };

        let remote = self
            .probe_url(url, Duration::from_millis(self.config.remote_timeout_ms), self.anon_key.as_deref())
            .await;
        match remote {
            Reachability::Reachable => {
                if self.mode() == Mode::LocalFallback {
                    diagnosis.recommendations.push(Message::DiagnosisHealthyWhileDegraded.to_string());
                }
            }
            Reachability::Timeout => diagnosis.fail(
                DiagnosisLayer::Remote,
                Some(remote),
                Message::DiagnosisRemoteTimeout(self.config.remote_timeout_ms),
                Message::DiagnosisRemoteTimeoutAdvice,
            ),
            other => diagnosis.fail(
                DiagnosisLayer::Remote,
                Some(other),
                Message::DiagnosisRemoteUnreachable(other.to_string()),
                Message::DiagnosisRemoteUnreachableAdvice,
            ),
        }

        diagnosis
    }

    /// Whether the OS has a route for the configured probe address.
    pub async fn network_available(&self, timeout: Duration) -> bool {
        let target = self.config.route_probe_addr.clone();
        let attempt = async move {
            let addr = resolve(&target).await?;
            let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(addr).await
        };
        matches!(tokio::time::timeout(timeout, attempt).await, Ok(Ok(())))
    }

    async fn full_check(&self, timeout: Duration) -> Reachability {
        let Some(url) = &self.remote_health_url else {
            return Reachability::Unreachable;
        };

        let started = Instant::now();
        if !self.network_available(timeout.min(Duration::from_millis(self.config.network_timeout_ms))).await {
            return Reachability::Offline;
        }
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Reachability::Timeout;
        }
        self.probe_url(url, remaining, self.anon_key.as_deref()).await
    }

    async fn probe_url(&self, url: &str, timeout: Duration, api_key: Option<&str>) -> Reachability {
        msg_debug!(Message::ProbeStarted(url.to_string()));
        let started = Instant::now();

        let mut request = self.http.get(url).timeout(timeout);
        if let Some(key) = api_key {
            request = request.header("apikey", key);
        }

        // The outer deadline drops the request future, aborting it.
        let outcome = match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => Reachability::Timeout,
            Ok(Err(err)) if err.is_timeout() => Reachability::Timeout,
            Ok(Err(_)) => Reachability::Unreachable,
            Ok(Ok(response)) if response.status().is_server_error() => Reachability::Unreachable,
            Ok(Ok(_)) => Reachability::Reachable,
        };

        msg_debug!(Message::ProbeFinished {
            target: url.to_string(),
            outcome: outcome.to_string(),
            elapsed_ms: started.elapsed().as_millis(),
        });
        outcome
    }

    fn set_mode(&self, to: Mode, reason: &str) {
        let mut state = self.state.lock();
        if to == Mode::Remote && self.remote_health_url.is_none() {
            return;
        }
        if state.mode == to {
            msg_debug!(Message::ModeUnchanged(to.to_string()));
            return;
        }
        let from = std::mem::replace(&mut state.mode, to);
        drop(state);

        let message = Message::ModeChanged {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        };
        match to {
            Mode::LocalFallback => msg_warning!(message),
            Mode::Remote => msg_info!(message),
        }
    }
}

async fn resolve(target: &str) -> io::Result<SocketAddr> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host(target)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", target)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_starts_in_fallback() {
        let manager = ConnectionManager::new(&ConnectionConfig::default(), None);
        assert_eq!(manager.mode(), Mode::LocalFallback);
        assert!(!manager.is_remote_configured());
    }

    #[test]
    fn test_degrade_is_sticky() {
        let remote = RemoteConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            anon_key: "key".to_string(),
        };
        let manager = ConnectionManager::new(&ConnectionConfig::default(), Some(&remote));
        assert_eq!(manager.mode(), Mode::Remote);

        manager.degrade(&"connection reset");
        assert_eq!(manager.mode(), Mode::LocalFallback);
        manager.degrade(&"again");
        assert_eq!(manager.mode(), Mode::LocalFallback);
    }

    #[tokio::test]
    async fn test_unconfigured_retry_stays_local() {
        let manager = ConnectionManager::new(&ConnectionConfig::default(), None);
        assert_eq!(manager.retry().await, Reachability::Unreachable);
        assert_eq!(manager.mode(), Mode::LocalFallback);
    }
}
