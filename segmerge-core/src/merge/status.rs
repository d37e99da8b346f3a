use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Downloading,
    Merging,
    Ready,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Error)
    }

    pub fn can_transition(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Downloading)
                | (Downloading, Merging)
                | (Merging, Ready)
                | (Idle, Error)
                | (Downloading, Error)
                | (Merging, Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Downloading => "downloading",
            JobState::Merging => "merging",
            JobState::Ready => "ready",
            JobState::Error => "error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
