mod call;
mod event;
mod outcome;
mod query;
mod request;

pub use call::{ExecutionReceipt, PayloadCall};
pub use event::{LifecycleEvent, LifecycleEventKind};
pub use outcome::AttemptOutcome;
pub use query::ExecutionQuery;
pub use request::{ExecutionRequest, ExecutionStatus, ParseStatusError};
