//! Orchestrator configuration.

use std::time::Duration;

/// Tunables for [`CheckoutOrchestrator`](crate::CheckoutOrchestrator).
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Deadline for one checkout, applied when the caller gives none.
    pub timeout: Duration,
    /// Reject requests without a client token instead of deriving one.
    pub require_client_key: bool,
    /// How many times a lost race on the key insert re-runs the unit of work.
    pub max_key_conflict_retries: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            require_client_key: true,
            max_key_conflict_retries: 3,
        }
    }
}
