// crates/flow-warden-guard/src/rate.rs
// ============================================================================
// Module: Rate Limiter
// Description: Process-local sliding-window request counter per flow.
// Purpose: Bound request bursts without durable state.
// Dependencies: flow-warden-core
// ============================================================================

//! ## Overview
//! One mutex-guarded map of `flow_id -> (count, window_start)`. Windows are
//! 60 seconds of wall clock and reset lazily on the next check after they
//! elapse. The state is intentionally non-durable; cross-instance
//! enforcement is out of scope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Width of the rate window in seconds.
pub const WINDOW_SEC: i64 = 60;

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

/// Per-flow request counter over the current window.
struct Window {
    /// Requests counted in the window.
    count: u32,
    /// Unix seconds when the window opened.
    window_start: i64,
}

/// Process-local sliding-window rate limiter.
///
/// # Invariants
/// - The mutex is leaf-level and never held across I/O.
pub struct RateLimiter {
    /// Maximum checks per window per flow.
    limit: u32,
    /// Window state keyed by flow.
    windows: Mutex<HashMap<FlowId, Window>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` checks per 60-second window.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self { limit, windows: Mutex::new(HashMap::new()) }
    }

    /// Counts one check for a flow at wall-clock `now`.
    ///
    /// A window older than [`WINDOW_SEC`] resets to a count of one.
    ///
    /// # Errors
    ///
    /// Returns `rate_limit_exceeded` when the window already holds `limit`
    /// checks.
    pub fn check(&self, flow_id: &FlowId, now: i64) -> Result<(), EngineError> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        match windows.get_mut(flow_id) {
            Some(window) if now - window.window_start < WINDOW_SEC => {
                if window.count >= self.limit {
                    return Err(EngineError::new(
                        ErrorCode::RateLimitExceeded,
                        format!(
                            "flow {flow_id} exceeded {} checks in the current window",
                            self.limit
                        ),
                    ));
                }
                window.count += 1;
                Ok(())
            }
            _ => {
                windows.insert(flow_id.clone(), Window { count: 1, window_start: now });
                Ok(())
            }
        }
    }
}
