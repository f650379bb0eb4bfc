// Lifecycle state machine
//
// Stage and status enums plus the operation record whose transitions are validated
// against the enable/disable pipelines.

pub mod errors;
pub mod events;
pub mod operation;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::OperationEvent;
pub use operation::{LifecycleOperation, StageOutcome};
pub use states::{LifecycleStage, OperationKind, OperationStatus};
