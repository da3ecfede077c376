use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::job::{Failure, Job, JobOutcome};

/// Lifecycle states of a job.
///
/// CREATED → FETCHING → ALIGNING → {SUCCEEDED | FAILED | CANCELLED} → CLEANED_UP,
/// with FETCHING → FAILED when an input can't be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Created,
    Fetching,
    Aligning,
    Succeeded,
    Failed,
    Cancelled,
    CleanedUp,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Succeeded | State::Failed | State::Cancelled)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Created => write!(f, "CREATED"),
            State::Fetching => write!(f, "FETCHING"),
            State::Aligning => write!(f, "ALIGNING"),
            State::Succeeded => write!(f, "SUCCEEDED"),
            State::Failed => write!(f, "FAILED"),
            State::Cancelled => write!(f, "CANCELLED"),
            State::CleanedUp => write!(f, "CLEANED_UP"),
        }
    }
}

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Fetch,
    Align,
    Succeed,
    Fail(Failure),
    Cancel,
    CleanUp,
}

impl From<&JobOutcome> for Event {
    fn from(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded(_) => Event::Succeed,
            JobOutcome::Failed(failure) => Event::Fail(failure.clone()),
            JobOutcome::Cancelled => Event::Cancel,
        }
    }
}

/// The result of applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The job moved forward to this state.
    Next(State),
    /// The event is not valid in the job's current state; nothing changed.
    Rejected { state: State, event: Event },
}

/// Drives a `Job` forward through its lifecycle. States are never revisited.
pub struct StateMachine;

impl StateMachine {
    pub fn next(job: &mut Job, event: Event) -> Transition {
        let next = match (job.state, &event) {
            (State::Created, Event::Fetch) => Some(State::Fetching),
            (State::Fetching, Event::Align) => Some(State::Aligning),
            (State::Fetching | State::Aligning, Event::Fail(_)) => Some(State::Failed),
            (State::Aligning, Event::Succeed) => Some(State::Succeeded),
            (State::Aligning, Event::Cancel) => Some(State::Cancelled),
            (s, Event::CleanUp) if s.is_terminal() => Some(State::CleanedUp),
            _ => None,
        };

        let Some(next) = next else {
            return Transition::Rejected {
                state: job.state,
                event,
            };
        };

        if let Event::Fail(failure) = event {
            job.failure = Some(failure);
        }
        job.state_history.push(job.state);
        job.state = next;
        job.updated_at = Utc::now();

        Transition::Next(next)
    }
}
