//! Timelock: executes approved governance proposals once their timelock
//! elapses.
//!
//! # Architecture
//!
//! The workspace is split into crates:
//!
//! * `timelock-core`: configuration, logging, database pool and shared errors
//! * `timelock-protocol`: execution request, event and HTTP body types
//! * `timelock-engine`: execution ledger, retry policy, processor, runtime loop
//!   and HTTP service
//! * `timelock-cli`: the `timelock` operator console
//!
//! This crate re-exports the pieces needed to embed the scheduler in-process.

pub use timelock_core as core;
pub use timelock_engine as engine;
pub use timelock_protocol as protocol;

pub use timelock_engine::{
    BroadcastNotifier, Clock, ExecutionCall, ExecutionError, ExecutionLedger, ExecutionProcessor,
    ExecutorAdapter, ExponentialBackoffPolicy, FanoutNotifier, FixedDelayPolicy, InMemoryLedger,
    LedgerError, LifecycleNotifier, ManualClock, PostgresLedger, RelayerExecutor, RetryDecision,
    RetryPolicy, SchedulerConfig, SchedulerError, SchedulerRuntime, SystemClock, TickReport,
    TracingNotifier,
};
pub use timelock_protocol::execution::{
    AttemptOutcome, ExecutionQuery, ExecutionReceipt, ExecutionRequest, ExecutionStatus,
    LifecycleEvent, LifecycleEventKind, PayloadCall,
};

/// Version of the execution request wire format.
pub const EXECUTION_FORMAT_VERSION: &str = "1.0.0";

/// Whether a peer speaking `version` understands this crate's wire format.
pub fn verify_format_compatibility(version: &str) -> bool {
    version.split('.').next() == EXECUTION_FORMAT_VERSION.split('.').next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_decides_compatibility() {
        assert!(verify_format_compatibility("1.4.2"));
        assert!(!verify_format_compatibility("2.0.0"));
    }
}
