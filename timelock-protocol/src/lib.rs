pub mod api;
pub mod execution;

pub mod prelude {
    pub use crate::api::{EnqueueExecutionRequest, ErrorResponse, OperatorActionRequest};
    pub use crate::execution::{
        AttemptOutcome, ExecutionQuery, ExecutionReceipt, ExecutionRequest, ExecutionStatus,
        LifecycleEvent, LifecycleEventKind, PayloadCall,
    };
}
