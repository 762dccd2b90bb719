//! Identity resolution.
//!
//! `identify` turns an (email, phone) observation into the consolidated view
//! of the identity cluster it belongs to:
//!
//! 1. **Match** every live contact sharing the email or phone.
//! 2. No match: insert a fresh primary and stop.
//! 3. **Merge** all matched clusters under the oldest primary, demoting the
//!    others and relinking their secondaries.
//! 4. **Record** a secondary if the observation brings a new email or phone.
//! 5. **Project** the unified cluster into the response.
//!
//! Steps 1-5 share one `BEGIN IMMEDIATE` transaction. Lock contention surfaces
//! as `TransientStoreFailure`, and `identify_with_retry` replays the whole
//! sequence from step 1.

use std::time::Duration;

use crate::db::{ContactDb, NewContact};
use crate::error::IdentifyError;
use crate::types::{HealthStatus, IdentifyResponse, Observation};

pub mod matcher;
pub mod merger;
pub mod projection;
pub mod recorder;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 25,
            max_backoff_ms: 500,
        }
    }
}

fn retry_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 10;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Resolve raw inputs with the default retry policy.
///
/// Fails with `InvalidInput`, before touching the store, when neither value
/// is present after trimming.
pub fn identify(
    db: &ContactDb,
    email: Option<&str>,
    phone_number: Option<&str>,
) -> Result<IdentifyResponse, IdentifyError> {
    let obs = Observation::new(email, phone_number)?;
    identify_with_retry(db, &obs, &RetryPolicy::default())
}

/// Resolve an observation, replaying the transaction on transient failures.
pub fn identify_with_retry(
    db: &ContactDb,
    obs: &Observation,
    policy: &RetryPolicy,
) -> Result<IdentifyResponse, IdentifyError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match identify_once(db, obs) {
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = retry_delay(attempt, policy);
                log::warn!(
                    "identify retry {}/{} after {} (sleep {:?})",
                    attempt,
                    attempts,
                    err,
                    delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// One attempt: match, merge, record and project inside a single transaction.
pub fn identify_once(db: &ContactDb, obs: &Observation) -> Result<IdentifyResponse, IdentifyError> {
    db.with_transaction(|tx| resolve(tx, obs))
}

fn resolve(db: &ContactDb, obs: &Observation) -> Result<IdentifyResponse, IdentifyError> {
    let matches = matcher::find_matches(db, obs)?;

    let primary_id = if matches.is_empty() {
        let id = db.insert_contact(&NewContact::primary(obs.email(), obs.phone_number()))?;
        log::info!("Created primary contact {id}");
        id
    } else {
        let merge = merger::resolve_cluster(db, &matches)?;
        recorder::reconcile(db, obs, &merge.cluster, &merge.true_primary)?.primary_id
    };

    let contact = projection::project(db, primary_id)?;
    Ok(IdentifyResponse { contact })
}

/// Liveness probe: confirms the store answers queries.
pub fn healthcheck(db: &ContactDb) -> HealthStatus {
    match db.count_contacts() {
        Ok(count) => HealthStatus {
            status: "ok".to_string(),
            message: "Contact identity service is running".to_string(),
            contacts: Some(count),
        },
        Err(e) => {
            log::warn!("Healthcheck query failed: {e}");
            HealthStatus {
                status: "unavailable".to_string(),
                message: e.to_string(),
                contacts: None,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
