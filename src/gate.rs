//! Admit/deny gate consulted at the request boundary.
//!
//! The retrieval core only needs a boolean decision before a query runs;
//! the verification backends themselves (challenge pages, shared caches)
//! are external collaborators. What lives here is the one interface they
//! hide behind: [`AdmitGate`], a fixed-window in-memory implementation,
//! and [`GateChain`] — a ranked list of interchangeable backends tried in
//! order, falling through on backend error and admitting when every
//! backend is unreachable.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::GateConfig;
use crate::error::PipelineError;

/// Decision returned by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny,
}

/// Quota status for one key.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub used: u32,
    pub remaining: u32,
    pub limit: u32,
    pub reset_in: Option<Duration>,
}

#[async_trait]
pub trait AdmitGate: Send + Sync {
    /// Check-and-count one request for `key`.
    async fn admit(&self, key: &str) -> Result<Admission, PipelineError>;

    /// Current quota for `key`, without counting a request.
    async fn quota(&self, key: &str) -> Result<Quota, PipelineError>;
}

/// In-memory fixed-window counter: the window starts at a key's first
/// request and resets `window` after it.
pub struct FixedWindowGate {
    limit: u32,
    window: Duration,
    state: Mutex<HashMap<String, (Instant, u32)>>,
}

impl FixedWindowGate {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    fn entry(&self, key: &str, count_request: bool) -> (u32, Option<Duration>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_insert((now, 0));

        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        if count_request {
            entry.1 += 1;
        }

        let elapsed = now.duration_since(entry.0);
        let reset_in = self.window.checked_sub(elapsed);
        (entry.1, reset_in)
    }
}

#[async_trait]
impl AdmitGate for FixedWindowGate {
    async fn admit(&self, key: &str) -> Result<Admission, PipelineError> {
        let (used, _) = self.entry(key, true);
        if used <= self.limit {
            Ok(Admission::Allow)
        } else {
            Ok(Admission::Deny)
        }
    }

    async fn quota(&self, key: &str) -> Result<Quota, PipelineError> {
        let (used, reset_in) = self.entry(key, false);
        Ok(Quota {
            used,
            remaining: self.limit.saturating_sub(used),
            limit: self.limit,
            reset_in,
        })
    }
}

/// Ranked list of interchangeable gate backends. The first backend that
/// answers wins; a backend error logs a warning and falls through to the
/// next. When every backend errors the chain admits — availability over
/// strictness, matching the surrounding site's behavior.
pub struct GateChain {
    backends: Vec<Box<dyn AdmitGate>>,
}

impl GateChain {
    pub fn new(backends: Vec<Box<dyn AdmitGate>>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl AdmitGate for GateChain {
    async fn admit(&self, key: &str) -> Result<Admission, PipelineError> {
        for (rank, backend) in self.backends.iter().enumerate() {
            match backend.admit(key).await {
                Ok(decision) => return Ok(decision),
                Err(e) => {
                    tracing::warn!(rank, error = %e, "gate backend failed, trying next");
                }
            }
        }
        tracing::warn!("all gate backends failed, admitting by default");
        Ok(Admission::Allow)
    }

    async fn quota(&self, key: &str) -> Result<Quota, PipelineError> {
        for backend in &self.backends {
            if let Ok(quota) = backend.quota(key).await {
                return Ok(quota);
            }
        }
        Err(PipelineError::Provider(
            "no gate backend could report quota".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenGate;

    #[async_trait]
    impl AdmitGate for BrokenGate {
        async fn admit(&self, _key: &str) -> Result<Admission, PipelineError> {
            Err(PipelineError::Provider("backend down".to_string()))
        }
        async fn quota(&self, _key: &str) -> Result<Quota, PipelineError> {
            Err(PipelineError::Provider("backend down".to_string()))
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let gate = FixedWindowGate::new(3, Duration::from_secs(3600));
        for _ in 0..3 {
            assert_eq!(gate.admit("1.2.3.4").await.unwrap(), Admission::Allow);
        }
        assert_eq!(gate.admit("1.2.3.4").await.unwrap(), Admission::Deny);
        // Other keys are unaffected.
        assert_eq!(gate.admit("5.6.7.8").await.unwrap(), Admission::Allow);
    }

    #[tokio::test]
    async fn window_resets_counts() {
        let gate = FixedWindowGate::new(1, Duration::from_millis(20));
        assert_eq!(gate.admit("k").await.unwrap(), Admission::Allow);
        assert_eq!(gate.admit("k").await.unwrap(), Admission::Deny);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(gate.admit("k").await.unwrap(), Admission::Allow);
    }

    #[tokio::test]
    async fn quota_reports_without_counting() {
        let gate = FixedWindowGate::new(4, Duration::from_secs(3600));
        gate.admit("k").await.unwrap();
        let quota = gate.quota("k").await.unwrap();
        assert_eq!(quota.used, 1);
        assert_eq!(quota.remaining, 3);
        assert_eq!(quota.limit, 4);
        // quota() itself did not consume a request
        let again = gate.quota("k").await.unwrap();
        assert_eq!(again.used, 1);
    }

    #[tokio::test]
    async fn chain_falls_through_to_working_backend() {
        let chain = GateChain::new(vec![
            Box::new(BrokenGate),
            Box::new(FixedWindowGate::new(1, Duration::from_secs(3600))),
        ]);
        assert_eq!(chain.admit("k").await.unwrap(), Admission::Allow);
        assert_eq!(chain.admit("k").await.unwrap(), Admission::Deny);
    }

    #[tokio::test]
    async fn chain_admits_when_all_backends_fail() {
        let chain = GateChain::new(vec![Box::new(BrokenGate), Box::new(BrokenGate)]);
        assert_eq!(chain.admit("k").await.unwrap(), Admission::Allow);
        assert!(chain.quota("k").await.is_err());
    }
}
