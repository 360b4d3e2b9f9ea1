//! Guardrails for privileged actions: per-action amount ceilings and a
//! cooldown window between invocations of the same action name.
//!
//! Cooldown state is keyed purely by action name, not caller identity.
//! The check and the post-success update are separate steps with the
//! guarded operation in between, so callers must serialize the whole
//! sequence through [`GuardrailEngine::lock_action`]; without it, two
//! concurrent calls can both observe an open window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::AgentError;

/// Cooldown and amount-limit enforcement.
pub struct GuardrailEngine {
    cooldown: Duration,
    limits: HashMap<String, f64>,
    last_action: DashMap<String, Instant>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl GuardrailEngine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            limits: HashMap::new(),
            last_action: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    pub fn with_limits(cooldown: Duration, limits: HashMap<String, f64>) -> Self {
        Self {
            cooldown,
            limits,
            last_action: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Take the per-action lock. Hold the guard across
    /// check → operation → [`update_cooldown`](Self::update_cooldown) so at
    /// most one guarded invocation of `action` runs at a time; a failed
    /// attempt releases the lock without consuming the window.
    pub async fn lock_action(&self, action: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(action.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Set or replace the amount ceiling for an action.
    pub fn set_limit(&mut self, action: &str, ceiling: f64) {
        self.limits.insert(action.to_string(), ceiling);
    }

    /// Whether enough time has passed since the last successful invocation
    /// of `action`. Actions never seen before are always allowed.
    pub fn check_cooldown(&self, action: &str) -> bool {
        self.last_action
            .get(action)
            .map_or(true, |last| last.elapsed() >= self.cooldown)
    }

    /// Time left until `action` leaves cooldown, if it is in cooldown.
    pub fn cooldown_remaining(&self, action: &str) -> Option<Duration> {
        self.last_action
            .get(action)
            .and_then(|last| self.cooldown.checked_sub(last.elapsed()))
            .filter(|d| !d.is_zero())
    }

    /// Record a successful invocation. Call only after the guarded
    /// operation fully completed — a failed attempt must not consume the
    /// cooldown window.
    pub fn update_cooldown(&self, action: &str) {
        self.last_action.insert(action.to_string(), Instant::now());
    }

    /// Validate an amount against the action's configured ceiling.
    pub fn validate_amount(&self, action: &str, amount: f64) -> Result<(), AgentError> {
        if amount <= 0.0 {
            return Err(AgentError::Guardrail(format!(
                "{action} amount must be positive (got {amount})"
            )));
        }
        if let Some(ceiling) = self.limits.get(action) {
            if amount > *ceiling {
                return Err(AgentError::Guardrail(format!(
                    "{action} amount {amount} exceeds maximum {ceiling}"
                )));
            }
        }
        Ok(())
    }

    /// Full gate: amount ceiling, then cooldown.
    pub fn check(&self, action: &str, amount: f64) -> Result<(), AgentError> {
        self.validate_amount(action, amount)?;
        self.check_action(action)
    }

    /// Cooldown-only gate, for actions without an amount (compound).
    pub fn check_action(&self, action: &str) -> Result<(), AgentError> {
        if !self.check_cooldown(action) {
            let wait = self
                .cooldown_remaining(action)
                .unwrap_or(self.cooldown)
                .as_secs();
            return Err(AgentError::Guardrail(format!(
                "{action} in cooldown, retry in {wait}s"
            )));
        }
        Ok(())
    }
}
