//! Timelock engine - execution ledger, retry policy, scheduler loop and the
//! HTTP service around them.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod notifier;
pub mod processor;
pub mod relayer_client;
pub mod retry;
pub mod runtime;

pub use api::{RunningService, SchedulerApiBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryStrategy, SchedulerConfig};
pub use error::{LedgerError, SchedulerError};
pub use executor::{ExecutionCall, ExecutionError, ExecutorAdapter, FailureKind};
pub use ledger::{ExecutionLedger, InMemoryLedger, PostgresLedger};
pub use notifier::{BroadcastNotifier, FanoutNotifier, LifecycleNotifier, TracingNotifier};
pub use processor::{ExecutionProcessor, ExecutionProcessorBuilder, TickReport};
pub use relayer_client::{RelayerClientError, RelayerExecutor};
pub use retry::{ExponentialBackoffPolicy, FixedDelayPolicy, RetryDecision, RetryPolicy};
pub use runtime::SchedulerRuntime;
