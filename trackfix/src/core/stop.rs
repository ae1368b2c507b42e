//! Loop termination policy.

use serde::{Deserialize, Serialize};

/// Reason why the iteration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum LoopStop {
    /// Enough iterations passed every dataset.
    #[serde(rename_all = "camelCase")]
    TargetReached { successes: u32 },
    /// The hard attempt cap was hit, whatever the success count.
    #[serde(rename_all = "camelCase")]
    AttemptCapReached { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub success_target: u32,
    pub max_attempts: u32,
}

impl StopPolicy {
    /// Decide whether another iteration may run after `attempts` attempts with `successes` passes.
    ///
    /// The target is checked first so a run reaching it on the last allowed
    /// attempt reports success.
    pub fn check(&self, attempts: u32, successes: u32) -> Option<LoopStop> {
        if successes >= self.success_target {
            return Some(LoopStop::TargetReached { successes });
        }
        if attempts >= self.max_attempts {
            return Some(LoopStop::AttemptCapReached { attempts });
        }
        None
    }
}
