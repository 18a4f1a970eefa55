//! Core admission decision engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, trace, warn};

use crate::error::{FloodgateError, Result};
use crate::identity::{IdentifierResolver, RequestMeta};
use crate::store::{CounterKey, CounterStore};

use super::decision::{Decision, Rejection};
use super::rules::RuleRegistry;

/// How counter updates are written back to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Counting {
    /// Read-then-write. Two concurrent evaluations for one identifier can
    /// both observe `count = k` and both write `k + 1`, under-counting
    /// contention. Adequate for coarse abuse protection, not for exact
    /// rate guarantees.
    #[default]
    BestEffort,
    /// Route admit increments through the store's atomic increment
    /// primitive. The decision read and the post-window reset write stay
    /// best-effort.
    Atomic,
}

/// The admission decision engine.
///
/// Holds the frozen rule registry and the selected counter store. One engine
/// serves arbitrarily many concurrent evaluations; no locks are held across
/// store I/O, and each admitted evaluation performs a single state
/// write-back.
pub struct ThrottleEngine {
    registry: RuleRegistry,
    store: Arc<dyn CounterStore>,
    namespace: String,
    status_code: u16,
    counting: Counting,
    resolver: IdentifierResolver,
}

impl ThrottleEngine {
    pub(crate) fn new(
        registry: RuleRegistry,
        store: Arc<dyn CounterStore>,
        namespace: String,
        status_code: u16,
        counting: Counting,
        resolver: IdentifierResolver,
    ) -> Self {
        Self {
            registry,
            store,
            namespace,
            status_code,
            counting,
            resolver,
        }
    }

    /// The status code served to throttled callers.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The registered throttle rules.
    pub fn rules(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Resolve the throttling identifier for a request.
    pub fn identify(&self, meta: &RequestMeta) -> Option<String> {
        self.resolver.resolve(meta)
    }

    /// Decide whether to admit an action for the given identifier.
    ///
    /// Aside from counter updates in the store, the decision depends only on
    /// its inputs. A scope/action with no registered rule is always
    /// admitted. Store failures and malformed stored state degrade to
    /// "never seen before": throttling protects the application and must not
    /// become a reliability hazard itself.
    ///
    /// # Errors
    /// Returns `FloodgateError::Identifier` when `identifier` is empty.
    pub async fn evaluate(
        &self,
        scope: &str,
        action: &str,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        if identifier.is_empty() {
            return Err(FloodgateError::Identifier(
                "identifier must be non-empty".to_string(),
            ));
        }

        let Some((rule_key, rule)) = self.registry.resolve(scope, action) else {
            trace!(
                scope = %scope,
                action = %action,
                "No throttle rule registered, admitting"
            );
            return Ok(Decision::Admitted);
        };

        let namespace = format!("{}:{}", self.namespace, rule_key);
        let key = CounterKey::new(&namespace, identifier);

        let (count, last_hit) = self.read_state(&key, now).await;
        // clamp to zero if a stored last hit is ahead of this evaluation
        let elapsed = (now - last_hit).to_std().unwrap_or(Duration::ZERO);

        trace!(
            rule = %rule_key,
            identifier = %identifier,
            count = count,
            elapsed_secs = elapsed.as_secs(),
            "Evaluating admission"
        );

        if elapsed < rule.window && count >= u64::from(rule.max_requests) {
            // the window keeps running against the same anchor
            let retry_after_secs = seconds_ceil(rule.window - elapsed);

            debug!(
                rule = %rule_key,
                identifier = %identifier,
                count = count,
                retry_after_secs = retry_after_secs,
                "Throttle limit exceeded"
            );

            return Ok(Decision::Rejected { retry_after_secs });
        }

        let next = if count > u64::from(rule.max_requests) {
            // the previous request was throttled and the window has since
            // elapsed, so this admission starts a fresh count
            1
        } else {
            count + 1
        };

        self.write_state(&key, count, next, now, rule.window * 2).await;

        Ok(Decision::Admitted)
    }

    /// The response the pipeline should serve for a decision, present iff
    /// the decision is a rejection.
    pub fn rejection(&self, decision: &Decision) -> Option<Rejection> {
        match decision {
            Decision::Admitted => None,
            Decision::Rejected { retry_after_secs } => Some(Rejection {
                status_code: self.status_code,
                retry_after_secs: *retry_after_secs,
            }),
        }
    }

    /// Read `(count, last_hit)` for a counter key, treating absence,
    /// read failures, and malformed values as "never observed".
    async fn read_state(&self, key: &CounterKey, now: DateTime<Utc>) -> (u64, DateTime<Utc>) {
        let amount_key = key.amount();
        let count = match self.store.get(&amount_key).await {
            Ok(Some(raw)) => match raw.parse::<u64>() {
                Ok(count) => count,
                Err(_) => {
                    warn!(key = %amount_key, "Malformed counter value, treating as absent");
                    0
                }
            },
            Ok(None) => 0,
            Err(e) => {
                warn!(key = %amount_key, error = %e, "Counter read failed, treating as absent");
                0
            }
        };

        let last_hit_key = key.last_hit();
        let last_hit = match self.store.get(&last_hit_key).await {
            Ok(Some(raw)) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => t.with_timezone(&Utc),
                Err(_) => {
                    warn!(key = %last_hit_key, "Malformed last-hit timestamp, treating as absent");
                    now
                }
            },
            Ok(None) => now,
            Err(e) => {
                warn!(key = %last_hit_key, error = %e, "Last-hit read failed, treating as absent");
                now
            }
        };

        (count, last_hit)
    }

    /// Write back the admitted state. Failures are logged and swallowed;
    /// an unreachable store must not reject traffic.
    async fn write_state(
        &self,
        key: &CounterKey,
        previous: u64,
        next: u64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) {
        let amount_key = key.amount();
        let use_atomic = self.counting == Counting::Atomic && next == previous + 1;

        if use_atomic {
            if let Err(e) = self.store.increment(&amount_key, ttl).await {
                warn!(key = %amount_key, error = %e, "Counter increment failed");
            }
        } else if let Err(e) = self.store.set(&amount_key, &next.to_string(), ttl).await {
            warn!(key = %amount_key, error = %e, "Counter write failed");
        }

        let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        if let Err(e) = self.store.set(&key.last_hit(), &stamp, ttl).await {
            warn!(key = %key.last_hit(), error = %e, "Last-hit write failed");
        }
    }
}

/// Whole seconds, rounding any fractional remainder up.
fn seconds_ceil(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
