use crate::config::ResubmitConfig;
use crate::supervisor::ErrorClass;

/// What to do with a pair whose job just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubmitDecision {
    /// Push the pair back onto the pending list; it runs again under a new uid.
    Resubmit,
    /// Record the failure; the pair is not attempted again this run.
    GiveUp,
}

/// Attempt-capped resubmission of transient (`mem_err`) failures.
#[derive(Debug, Clone, Copy)]
pub struct ResubmitPolicy {
    pub enabled: bool,
    /// Maximum number of attempts per pair (including the first). 0 = unlimited.
    pub max_attempts: u32,
}

impl Default for ResubmitPolicy {
    fn default() -> Self {
        Self::from(&ResubmitConfig::default())
    }
}

impl From<&ResubmitConfig> for ResubmitPolicy {
    fn from(cfg: &ResubmitConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            max_attempts: cfg.max_attempts,
        }
    }
}

impl ResubmitPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
        }
    }

    /// `attempt` is 1-based: the attempt that just failed with `class`.
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> ResubmitDecision {
        if !self.enabled || class != ErrorClass::Memory {
            return ResubmitDecision::GiveUp;
        }
        if self.max_attempts != 0 && attempt >= self.max_attempts {
            return ResubmitDecision::GiveUp;
        }
        ResubmitDecision::Resubmit
    }
}
