use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle shared by elections and their sessions.
///
/// Transitions are driven by admins and only ever move forward:
/// `upcoming -> ongoing -> past`. The stored status is authoritative, the
/// session's start/end times are informational only.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Upcoming,
    Ongoing,
    Past,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: Status,
    pub to: Status,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Upcoming => "upcoming",
            Status::Ongoing => "ongoing",
            Status::Past => "past",
        }
    }

    pub fn next(&self) -> Option<Status> {
        match self {
            Status::Upcoming => Some(Status::Ongoing),
            Status::Ongoing => Some(Status::Past),
            Status::Past => None,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Status::Upcoming),
            "ongoing" => Ok(Status::Ongoing),
            "past" => Ok(Status::Past),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Ballots are accepted only while the owning session is ongoing.
pub fn can_accept_votes(session_status: Status) -> bool {
    session_status == Status::Ongoing
}

/// Validates a single forward step. Skipping a state, staying put and going
/// backwards are all rejected.
pub fn transition(from: Status, to: Status) -> Result<Status, InvalidTransition> {
    match from.next() {
        Some(next) if next == to => Ok(to),
        _ => Err(InvalidTransition { from, to }),
    }
}
