//! Throttle telemetry for Microsoft Graph API
//!
//! SharePoint reports how much of its rate-limit budget a caller has used
//! through response headers once utilization passes 80%:
//!
//! - `x-ms-throttle-limit-percentage`: fraction of the budget consumed (0.8 - 1.8)
//! - `x-ms-resource-unit`: resource units charged for the request
//! - `x-ms-throttle-scope`: which budget the numbers refer to
//!
//! [`RateLimitMonitor`] accumulates these across a run and exposes the
//! back-off decision consulted by the transport and the orchestrator.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spsync_graph::rate_limit::RateLimitMonitor;
//!
//! let monitor = RateLimitMonitor::new();
//! monitor.record(Some(0.95), Some(2), None);
//! assert!(monitor.should_slow_down());
//! println!("{}", monitor.summary().status);
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::HeaderMap;
use spsync_core::ports::RateLimitSummary;
use tracing::{debug, info, warn};

/// Header carrying the consumed fraction of the throttle budget.
pub const THROTTLE_PERCENTAGE_HEADER: &str = "x-ms-throttle-limit-percentage";
/// Header carrying the resource units charged for the request.
pub const RESOURCE_UNIT_HEADER: &str = "x-ms-resource-unit";
/// Header naming the throttle scope.
pub const THROTTLE_SCOPE_HEADER: &str = "x-ms-throttle-scope";

/// Utilization at which a warning is logged.
const ALERT_THRESHOLD: f64 = 0.8;

/// Utilization at which callers should slow down.
const SLOW_DOWN_THRESHOLD: f64 = 0.9;

/// Utilization at which a request counts as throttled.
const THROTTLED_THRESHOLD: f64 = 1.0;

// ============================================================================
// RateLimitMonitor
// ============================================================================

#[derive(Debug, Default)]
struct RateLimitState {
    total_requests: u64,
    throttled_requests: u64,
    alerts_triggered: u64,
    utilization_samples: u64,
    average_utilization: f64,
    max_utilization: f64,
    resource_units_consumed: u64,
    last_scope: Option<String>,
}

/// Run-wide accumulator of throttle telemetry.
///
/// Updated after every Graph response, never reset mid-run. Thread safety is
/// provided by an internal `Mutex`.
#[derive(Debug, Default)]
pub struct RateLimitMonitor {
    state: Mutex<RateLimitState>,
}

impl RateLimitMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one response from its headers.
    pub fn observe(&self, headers: &HeaderMap) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let utilization = header(THROTTLE_PERCENTAGE_HEADER).and_then(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| warn!(value = v, "Malformed throttle percentage header"))
                .ok()
        });
        let units = header(RESOURCE_UNIT_HEADER).and_then(|v| v.trim().parse::<u64>().ok());
        let scope = header(THROTTLE_SCOPE_HEADER).map(str::to_string);

        self.record(utilization, units, scope);
    }

    /// Records one response from already parsed telemetry.
    ///
    /// Every call counts as a request, whether or not telemetry was present.
    pub fn record(&self, utilization: Option<f64>, resource_units: Option<u64>, scope: Option<String>) {
        let mut state = self.lock();
        state.total_requests += 1;

        if let Some(pct) = utilization.filter(|p| p.is_finite() && *p >= 0.0) {
            state.utilization_samples += 1;
            let n = state.utilization_samples as f64;
            state.average_utilization = (state.average_utilization * (n - 1.0) + pct) / n;
            state.max_utilization = state.max_utilization.max(pct);

            if pct >= THROTTLED_THRESHOLD {
                state.throttled_requests += 1;
                warn!(
                    utilization = pct,
                    scope = scope.as_deref().unwrap_or("unknown"),
                    "Throttling detected"
                );
            } else if pct >= ALERT_THRESHOLD {
                state.alerts_triggered += 1;
                info!(utilization = pct, "Approaching Graph rate limit");
            }
        }

        if let Some(units) = resource_units {
            state.resource_units_consumed += units;
            debug!(resource_units = units, "Resource units consumed");
        }

        if scope.is_some() {
            state.last_scope = scope;
        }
    }

    /// True once any response reported utilization of 90% or more.
    pub fn should_slow_down(&self) -> bool {
        self.lock().max_utilization >= SLOW_DOWN_THRESHOLD
    }

    pub fn total_requests(&self) -> u64 {
        self.lock().total_requests
    }

    /// Snapshot of the accumulated telemetry.
    pub fn summary(&self) -> RateLimitSummary {
        let state = self.lock();
        let status = if state.max_utilization >= THROTTLED_THRESHOLD {
            "hit limits"
        } else if state.max_utilization >= ALERT_THRESHOLD {
            "approached limits"
        } else {
            "stayed within limits"
        };
        RateLimitSummary {
            total_requests: state.total_requests,
            throttled_requests: state.throttled_requests,
            alerts_triggered: state.alerts_triggered,
            throttle_rate: state.throttled_requests as f64 / state.total_requests.max(1) as f64,
            average_utilization: state.average_utilization,
            max_utilization: state.max_utilization,
            resource_units_consumed: state.resource_units_consumed,
            last_scope: state.last_scope.clone(),
            status: status.to_string(),
        }
    }
}

// ============================================================================
// Retry-After header parsing
// ============================================================================

/// Parses a Retry-After header value into a Duration.
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2025 23:59:59 GMT") - parsed as seconds from now
///
/// Falls back to the default duration if parsing fails.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    // Integer seconds is what Graph sends in practice
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let diff = target - now;
            if let Some(secs) = diff
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

// ============================================================================
// Unit tests
// ============================================================================
