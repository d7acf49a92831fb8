//! Failover and switchover state machines (spec §3, §4.5, §4.6).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::host::HostId;
use crate::lsn::{Lsn, Timeline};

/// `failover_state` in the DCS. Shared by the failover election protocol
/// and the planned switchover protocol, which both drive the primary
/// handover through the same state machine (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    Promoting,
    CreatingSlots,
    Checkpointing,
    SwitchoverInitiated,
    SwitchoverMasterShut,
    Finished,
}

impl fmt::Display for FailoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailoverState::Promoting => "promoting",
            FailoverState::CreatingSlots => "creating_slots",
            FailoverState::Checkpointing => "checkpointing",
            FailoverState::SwitchoverInitiated => "switchover_initiated",
            FailoverState::SwitchoverMasterShut => "switchover_master_shut",
            FailoverState::Finished => "finished",
        };
        f.write_str(s)
    }
}

impl FromStr for FailoverState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "promoting" => FailoverState::Promoting,
            "creating_slots" => FailoverState::CreatingSlots,
            "checkpointing" => FailoverState::Checkpointing,
            "switchover_initiated" => FailoverState::SwitchoverInitiated,
            "switchover_master_shut" => FailoverState::SwitchoverMasterShut,
            "finished" => FailoverState::Finished,
            _ => return Err(()),
        })
    }
}

/// `switchover/state` in the DCS (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchoverState {
    Scheduled,
    Initiated,
    CandidateFound,
    Failed,
}

impl fmt::Display for SwitchoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchoverState::Scheduled => "scheduled",
            SwitchoverState::Initiated => "initiated",
            SwitchoverState::CandidateFound => "candidate_found",
            SwitchoverState::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for SwitchoverState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "scheduled" => SwitchoverState::Scheduled,
            "initiated" => SwitchoverState::Initiated,
            "candidate_found" => SwitchoverState::CandidateFound,
            "failed" => SwitchoverState::Failed,
            _ => return Err(()),
        })
    }
}

/// `switchover/master` JSON payload: the operator's switchover intent
/// (spec §3, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchoverIntent {
    pub hostname: HostId,
    pub timeline: Timeline,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<HostId>,
}

/// A single vote cast during failover election (spec §4.5): the winner is
/// the lexicographic maximum of `(lsn, priority)`, priority breaking LSN
/// ties (spec property P8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ElectionVote {
    pub lsn: Lsn,
    pub priority: crate::host::Priority,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Priority;

    #[test]
    fn switchover_state_round_trips_through_display_and_from_str() {
        for state in [
            SwitchoverState::Scheduled,
            SwitchoverState::Initiated,
            SwitchoverState::CandidateFound,
            SwitchoverState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<SwitchoverState>().unwrap(), state);
        }
    }

    #[test]
    fn failover_state_round_trips_through_display_and_from_str() {
        for state in [
            FailoverState::Promoting,
            FailoverState::CreatingSlots,
            FailoverState::Checkpointing,
            FailoverState::SwitchoverInitiated,
            FailoverState::SwitchoverMasterShut,
            FailoverState::Finished,
        ] {
            assert_eq!(state.to_string().parse::<FailoverState>().unwrap(), state);
        }
    }

    #[test]
    fn election_vote_orders_by_lsn_then_priority() {
        let higher_lsn = ElectionVote { lsn: Lsn::new(100), priority: Priority(1) };
        let lower_lsn_higher_prio = ElectionVote { lsn: Lsn::new(50), priority: Priority(99) };
        assert!(higher_lsn > lower_lsn_higher_prio);

        let tie_low_prio = ElectionVote { lsn: Lsn::new(100), priority: Priority(1) };
        let tie_high_prio = ElectionVote { lsn: Lsn::new(100), priority: Priority(2) };
        assert!(tie_high_prio > tie_low_prio);
    }
}
