//! Shared domain enumerations aligned with persisted database values.

use serde::{Deserialize, Serialize};

/// Lifecycle of a message on the durable render channel.
///
/// `Killed` is the dead-letter state: the job exhausted its attempts or failed
/// permanently and stays in the table for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Killed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Killed => "Killed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Killed)
    }
}

impl TryFrom<&str> for JobState {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Pending" => Ok(JobState::Pending),
            "Running" => Ok(JobState::Running),
            "Done" => Ok(JobState::Done),
            "Killed" => Ok(JobState::Killed),
            _ => Err(()),
        }
    }
}

/// Named durable channels carried by the jobs table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobQueue {
    #[serde(rename = "dossier_render")]
    RenderDossier,
}

impl JobQueue {
    pub fn as_str(self) -> &'static str {
        match self {
            JobQueue::RenderDossier => "dossier_render",
        }
    }
}

impl TryFrom<&str> for JobQueue {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "dossier_render" => Ok(JobQueue::RenderDossier),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_round_trips_through_storage_names() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Done,
            JobState::Killed,
        ] {
            assert_eq!(JobState::try_from(state.as_str()), Ok(state));
        }
        assert!(JobState::try_from("Latest").is_err());
    }

    #[test]
    fn serde_names_match_storage_names() {
        let state = serde_json::to_value(JobState::Killed).expect("serialize state");
        assert_eq!(state, JobState::Killed.as_str());

        let queue = serde_json::to_value(JobQueue::RenderDossier).expect("serialize queue");
        assert_eq!(queue, JobQueue::RenderDossier.as_str());
    }

    #[test]
    fn only_done_and_killed_are_terminal() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Killed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
