// crates/flow-warden-sessions/src/session.rs
// ============================================================================
// Module: Session Manager
// Description: Provider subprocess launch, stdout readers, lifecycle.
// Purpose: Own each session's process, reader task, channel, and done signal.
// Dependencies: flow-warden-core, crate::{event, registry}, tokio, tokio-util
// ============================================================================

//! ## Overview
//! A session owns four resources: the child process, the stdout reader
//! task, the bounded event channel, and the done signal. Construction
//! launches the process and reader; `stop` kills, reaps, and signals done.
//! The reader closes the channel and fires the done token exactly once at
//! stdout EOF (token cancellation is idempotent by construction).
//!
//! Invariants:
//! - Session ids are minted as `ses-<provider>-<nanos>-<seq>`.
//! - The session environment wins over the provider environment on key
//!   collisions.
//! - Stopping an unknown session reports `session_not_found` with no side
//!   effects; killing an already-exited process is not a failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::SessionId;
use flow_warden_core::now_nanos;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::NormalizedEvent;
use crate::event::parse_event;
use crate::registry::ProviderRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Capacity of each session's buffered event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// SECTION: Session Config
// ============================================================================

/// Per-session launch configuration.
///
/// # Invariants
/// - `env` overrides the provider environment on key collisions.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Flow the session works for.
    pub flow_id: FlowId,
    /// Session-specific environment overrides.
    pub env: BTreeMap<String, String>,
}

/// Tracked state of one live session.
struct SessionEntry {
    /// Provider name the session was launched from.
    provider: String,
    /// Flow the session works for.
    flow_id: FlowId,
    /// Child process handle.
    child: Child,
    /// Event receiver; taken once by the consumer.
    events: Option<mpsc::Receiver<NormalizedEvent>>,
    /// Done signal fired exactly once at reader exit or stop.
    done: CancellationToken,
}

// ============================================================================
// SECTION: Session Manager
// ============================================================================

/// Owner of all live provider sessions.
///
/// # Invariants
/// - The session map mutex is never held across process kills or channel
///   sends other than within `stop`, which owns the removed entry.
pub struct SessionManager {
    /// Provider launch specs.
    registry: Arc<ProviderRegistry>,
    /// Live sessions keyed by id.
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    /// Process-wide sequence for session id minting.
    seq: AtomicU64,
    /// Ambient cancellation observed by every reader task.
    ambient: CancellationToken,
}

impl SessionManager {
    /// Creates a manager over a provider registry.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, ambient: &CancellationToken) -> Self {
        Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            ambient: ambient.clone(),
        }
    }

    /// Launches a provider subprocess and its stdout reader.
    ///
    /// # Errors
    ///
    /// Returns `provider_unavailable` for unknown providers or when the
    /// subprocess cannot be started.
    pub async fn create(
        &self,
        provider: &str,
        config: SessionConfig,
    ) -> Result<SessionId, EngineError> {
        let spec = self.registry.get(provider)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let session_id = SessionId::new(format!("ses-{provider}-{}-{seq}", now_nanos()));

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|err| {
            EngineError::new(
                ErrorCode::ProviderUnavailable,
                format!("provider {provider} failed to start: {err}"),
            )
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::new(
                ErrorCode::ProviderUnavailable,
                format!("provider {provider} has no stdout pipe"),
            )
        })?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let done = CancellationToken::new();
        let reader_done = done.clone();
        let ambient = self.ambient.clone();
        let reader_provider = spec.name.clone();
        let reader_session = session_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    () = ambient.cancelled() => break,
                    () = reader_done.cancelled() => break,
                    next = lines.next_line() => match next {
                        Ok(Some(line)) => {
                            if let Some(event) =
                                parse_event(&reader_provider, &reader_session, &line)
                                && tx.send(event).await.is_err()
                            {
                                break;
                            }
                        }
                        Ok(None) | Err(_) => break,
                    },
                }
            }
            drop(tx);
            reader_done.cancel();
            tracing::debug!(session = %reader_session, "stdout reader exited");
        });

        let entry = SessionEntry {
            provider: spec.name,
            flow_id: config.flow_id,
            child,
            events: Some(rx),
            done,
        };
        self.sessions.lock().await.insert(session_id.clone(), entry);
        Ok(session_id)
    }

    /// Takes the session's event receiver; each session yields it once.
    ///
    /// # Errors
    ///
    /// Returns `session_not_found` for unknown sessions or when the
    /// receiver was already taken.
    pub async fn take_events(
        &self,
        session_id: &SessionId,
    ) -> Result<mpsc::Receiver<NormalizedEvent>, EngineError> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .get_mut(session_id)
            .and_then(|entry| entry.events.take())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorCode::SessionNotFound,
                    format!("session {session_id} has no event channel"),
                )
            })
    }

    /// Returns the flow a session works for.
    ///
    /// # Errors
    ///
    /// Returns `session_not_found` for unknown sessions.
    pub async fn flow_of(&self, session_id: &SessionId) -> Result<FlowId, EngineError> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|entry| entry.flow_id.clone())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorCode::SessionNotFound,
                    format!("session {session_id} not found"),
                )
            })
    }

    /// Returns the provider name a session was launched from.
    ///
    /// # Errors
    ///
    /// Returns `session_not_found` for unknown sessions.
    pub async fn provider_of(&self, session_id: &SessionId) -> Result<String, EngineError> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|entry| entry.provider.clone())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorCode::SessionNotFound,
                    format!("session {session_id} not found"),
                )
            })
    }

    /// Stops a session: untrack, kill, reap, signal done.
    ///
    /// Kill and reap errors are ignored; terminating an already-exited
    /// process is not a failure. A second stop of the same id reports
    /// `session_not_found`.
    ///
    /// # Errors
    ///
    /// Returns `session_not_found` for unknown sessions.
    pub async fn stop(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let mut entry = self.sessions.lock().await.remove(session_id).ok_or_else(|| {
            EngineError::new(
                ErrorCode::SessionNotFound,
                format!("session {session_id} not found"),
            )
        })?;
        if entry.child.kill().await.is_err() {
            tracing::debug!(session = %session_id, "process already exited before kill");
        }
        let _ = entry.child.wait().await;
        entry.done.cancel();
        Ok(())
    }

    /// Stops every tracked session.
    pub async fn stop_all(&self) {
        let ids: Vec<SessionId> = self.sessions.lock().await.keys().cloned().collect();
        for session_id in ids {
            if let Err(err) = self.stop(&session_id).await {
                tracing::debug!(session = %session_id, error = %err, "stop_all race");
            }
        }
    }
}
