//! Election status values written to `election_status`, matching
//! `failover_election.py`'s `STATUS_*` string constants exactly (other
//! hosts read this node as plain text, so the wire representation can't
//! drift from the original names).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionStatus {
    Cleanup,
    Registration,
    Selection,
    Done,
    Failed,
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElectionStatus::Cleanup => "cleanup",
            ElectionStatus::Registration => "registration",
            ElectionStatus::Selection => "selection",
            ElectionStatus::Done => "done",
            ElectionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for ElectionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "cleanup" => ElectionStatus::Cleanup,
            "registration" => ElectionStatus::Registration,
            "selection" => ElectionStatus::Selection,
            "done" => ElectionStatus::Done,
            "failed" => ElectionStatus::Failed,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        for status in [
            ElectionStatus::Cleanup,
            ElectionStatus::Registration,
            ElectionStatus::Selection,
            ElectionStatus::Done,
            ElectionStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ElectionStatus>().unwrap(), status);
        }
    }
}
