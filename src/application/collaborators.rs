//! Calls into external collaborators (catalog, proof store).
//!
//! Every call gets a timeout and bounded exponential backoff on transient
//! failures. Retries live here, at the boundary, and never inside a state
//! transition: a transition is only planned once these calls have returned.

use crate::domain::booking::TutorProfile;
use crate::domain::identity::UserId;
use crate::domain::money::ProofRef;
use crate::domain::ports::{CatalogRef, ProofStoreRef};
use crate::error::{LedgerError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base × 2^(attempt-1),
    /// capped at `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = 2u32.saturating_pow(exponent);
        self.backoff_base
            .saturating_mul(multiplier)
            .min(self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(2),
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_secs(1),
        }
    }
}

pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    service: &'static str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout {
                service,
                after_ms: policy.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    service,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "collaborator call failed; retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Clone)]
pub struct CatalogGateway {
    catalog: CatalogRef,
    policy: RetryPolicy,
}

impl CatalogGateway {
    pub fn new(catalog: CatalogRef, policy: RetryPolicy) -> Self {
        Self { catalog, policy }
    }

    pub async fn tutor(&self, tutor: &UserId) -> Result<TutorProfile> {
        let profile = call_with_retry(&self.policy, "catalog", || self.catalog.tutor(tutor))
            .await?
            .ok_or_else(|| LedgerError::UnknownTutor(tutor.clone()))?;
        profile.validate()?;
        Ok(profile)
    }
}

#[derive(Clone)]
pub struct ProofGate {
    proofs: ProofStoreRef,
    policy: RetryPolicy,
}

impl ProofGate {
    pub fn new(proofs: ProofStoreRef, policy: RetryPolicy) -> Self {
        Self { proofs, policy }
    }

    pub async fn ensure_exists(&self, reference: &ProofRef) -> Result<()> {
        let found =
            call_with_retry(&self.policy, "proof store", || self.proofs.contains(reference))
                .await?;
        if found {
            Ok(())
        } else {
            Err(LedgerError::UnknownProof(reference.to_string()))
        }
    }
}
