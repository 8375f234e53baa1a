use crate::idea::ContractEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

pub const NULL_AUTHOR: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProposalStatus {
    Successful,
    Rejected,
    Pending,
}

impl ProposalStatus {
    pub const ALL: [Self; 3] = [Self::Successful, Self::Rejected, Self::Pending];
}

/// Statistics about an Idea derived from its contract events and from
/// gossiped peer messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaStatistics {
    pub total_votes: u64,
    pub author: String,
    pub proposal_counts: BTreeMap<ProposalStatus, u64>,
}

impl Default for IdeaStatistics {
    fn default() -> Self {
        Self {
            total_votes: 0,
            author: NULL_AUTHOR.to_string(),
            proposal_counts: ProposalStatus::ALL
                .into_iter()
                .map(|status| (status, 0))
                .collect(),
        }
    }
}

/// Peer message announcing an incremental change to an Idea's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatisticsMessage {
    NewIdea { author: String },
    NewProposal,
    VoteCast { votes: u64, nature: bool },
}

impl StatisticsMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// One change to fold into a snapshot, from either upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Resolution(ContractEvent),
    Message(StatisticsMessage),
}

impl IdeaStatistics {
    pub fn count(&self, status: ProposalStatus) -> u64 {
        self.proposal_counts.get(&status).copied().unwrap_or(0)
    }

    pub fn apply(&mut self, delta: &Delta) {
        match delta {
            Delta::Resolution(ContractEvent::ProposalAccepted) => {
                self.increment(ProposalStatus::Successful);
                self.decrement_pending(delta);
            }
            Delta::Resolution(ContractEvent::ProposalRejected) => {
                self.increment(ProposalStatus::Rejected);
                self.decrement_pending(delta);
            }
            Delta::Message(StatisticsMessage::NewProposal) => {
                self.increment(ProposalStatus::Pending);
            }
            // Each message counts as one vote whatever weight it carries.
            Delta::Message(StatisticsMessage::VoteCast { .. }) => {
                self.total_votes = self.total_votes.saturating_add(1);
            }
            Delta::Message(StatisticsMessage::NewIdea { author }) => {
                self.author = author.clone();
            }
        }
    }

    fn increment(&mut self, status: ProposalStatus) {
        let count = self.proposal_counts.entry(status).or_insert(0);
        *count = count.saturating_add(1);
    }

    // A resolution can be observed before the gossip message announcing the
    // proposal; the pending counter stays at zero in that case.
    fn decrement_pending(&mut self, delta: &Delta) {
        let pending = self.proposal_counts.entry(ProposalStatus::Pending).or_insert(0);
        match pending.checked_sub(1) {
            Some(remaining) => *pending = remaining,
            None => warn!(?delta, "Proposal resolved with no pending proposal recorded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fold(deltas: &[Delta]) -> IdeaStatistics {
        let mut stats = IdeaStatistics::default();
        for delta in deltas {
            stats.apply(delta);
        }
        stats
    }

    #[test]
    fn counts_proposals_and_votes() {
        let stats = fold(&[
            Delta::Message(StatisticsMessage::NewProposal),
            Delta::Message(StatisticsMessage::NewProposal),
            Delta::Resolution(ContractEvent::ProposalAccepted),
            Delta::Message(StatisticsMessage::VoteCast {
                votes: 1,
                nature: true,
            }),
        ]);

        assert_eq!(stats.total_votes, 1);
        assert_eq!(stats.count(ProposalStatus::Pending), 1);
        assert_eq!(stats.count(ProposalStatus::Successful), 1);
        assert_eq!(stats.count(ProposalStatus::Rejected), 0);
    }

    #[test]
    fn vote_cast_counts_once_per_message() {
        let stats = fold(&[
            Delta::Message(StatisticsMessage::VoteCast {
                votes: 5,
                nature: true,
            }),
            Delta::Message(StatisticsMessage::VoteCast {
                votes: 0,
                nature: false,
            }),
        ]);

        assert_eq!(stats.total_votes, 2);
    }

    #[test]
    fn early_resolution_does_not_underflow() {
        let stats = fold(&[Delta::Resolution(ContractEvent::ProposalRejected)]);

        assert_eq!(stats.count(ProposalStatus::Pending), 0);
        assert_eq!(stats.count(ProposalStatus::Rejected), 1);
    }

    #[test]
    fn new_idea_sets_author() {
        let stats = fold(&[Delta::Message(StatisticsMessage::NewIdea {
            author: "0xabc".to_string(),
        })]);

        assert_eq!(stats.author, "0xabc");
    }

    #[test]
    fn snapshot_uses_camel_case_fields() {
        let json = serde_json::to_value(IdeaStatistics::default()).unwrap();

        assert_eq!(json["totalVotes"], 0);
        assert_eq!(json["author"], NULL_AUTHOR);
        assert_eq!(json["proposalCounts"]["Pending"], 0);
    }

    #[test]
    fn decodes_tagged_messages() {
        assert_eq!(
            StatisticsMessage::decode(br#"{"type":"VoteCast","votes":3,"nature":false}"#).unwrap(),
            StatisticsMessage::VoteCast {
                votes: 3,
                nature: false
            }
        );
        assert_eq!(
            StatisticsMessage::decode(br#"{"type":"NewProposal"}"#).unwrap(),
            StatisticsMessage::NewProposal
        );
        assert!(StatisticsMessage::decode(br#"{"type":"Unknown"}"#).is_err());
        assert!(StatisticsMessage::decode(b"not json").is_err());
    }

    fn delta_strategy() -> impl Strategy<Value = Delta> {
        prop_oneof![
            Just(Delta::Resolution(ContractEvent::ProposalAccepted)),
            Just(Delta::Resolution(ContractEvent::ProposalRejected)),
            Just(Delta::Message(StatisticsMessage::NewProposal)),
            (0u64..1_000, any::<bool>()).prop_map(|(votes, nature)| {
                Delta::Message(StatisticsMessage::VoteCast { votes, nature })
            }),
        ]
    }

    proptest! {
        #[test]
        fn resolutions_and_votes_are_accounted(deltas in prop::collection::vec(delta_strategy(), 0..64)) {
            let stats = fold(&deltas);

            let accepted = deltas.iter().filter(|d| **d == Delta::Resolution(ContractEvent::ProposalAccepted)).count() as u64;
            let rejected = deltas.iter().filter(|d| **d == Delta::Resolution(ContractEvent::ProposalRejected)).count() as u64;
            let votes = deltas.iter().filter(|d| matches!(d, Delta::Message(StatisticsMessage::VoteCast { .. }))).count() as u64;

            prop_assert_eq!(stats.count(ProposalStatus::Successful), accepted);
            prop_assert_eq!(stats.count(ProposalStatus::Rejected), rejected);
            prop_assert_eq!(stats.total_votes, votes);
        }

        #[test]
        fn pending_matches_unclamped_fold_when_announced_first(proposals in 0usize..32, resolutions in 0usize..32) {
            let resolutions = resolutions.min(proposals);
            let mut deltas = vec![Delta::Message(StatisticsMessage::NewProposal); proposals];
            deltas.extend(vec![Delta::Resolution(ContractEvent::ProposalAccepted); resolutions]);

            let stats = fold(&deltas);

            prop_assert_eq!(stats.count(ProposalStatus::Pending), (proposals - resolutions) as u64);
        }
    }
}
