mod job;
mod state;

pub use job::{AuditRecord, Failure, Job, JobOutcome, Mode};
pub use state::{Event, State, StateMachine, Transition};
