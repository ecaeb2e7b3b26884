use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::db::{Ballot, Vote, Voter, VotingItem, VotingOption};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OptionTally {
    pub voting_item_id: String,
    pub option_id: String,
    pub value: String,
    pub vote_count: usize,
}

/// Vote counts for one voting item, options in authoring order.
///
/// No winner is picked. Equal counts are reported as they are.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ItemTally {
    pub voting_item_id: String,
    pub title: String,
    pub options: Vec<OptionTally>,
    pub ballots: usize,
    pub abstentions: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Participation {
    pub election_id: String,
    pub total_voters: usize,
    pub participated_voters: usize,
}

impl Participation {
    pub fn ratio(&self) -> f64 {
        if self.total_voters == 0 {
            0.0
        } else {
            self.participated_voters as f64 / self.total_voters as f64
        }
    }
}

/// Counts `votes` per option of `item`. Votes and ballots belonging to other
/// items are skipped, as are votes naming an option the item doesn't have.
pub fn tally_item(item: &VotingItem, options: &[VotingOption], votes: &[Vote], ballots: &[Ballot]) -> ItemTally {
    let counts: HashMap<&str, usize> = votes.iter()
        .filter(|v| v.voting_item_id == item.id)
        .into_group_map_by(|v| v.option_id.as_str())
        .into_iter()
        .map(|(option_id, votes)| (option_id, votes.len()))
        .collect();

    for option_id in counts.keys() {
        if !options.iter().any(|o| o.id == *option_id) {
            warn!("Vote for unknown option_id={} on voting_item_id={}", option_id, item.id);
        }
    }

    let options = options.iter()
        .filter(|o| o.voting_item_id == item.id)
        .sorted_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)))
        .map(|o| OptionTally {
            voting_item_id: item.id.clone(),
            option_id: o.id.clone(),
            value: o.value.clone(),
            vote_count: counts.get(o.id.as_str()).copied().unwrap_or(0),
        })
        .collect();

    let item_ballots = ballots.iter().filter(|b| b.voting_item_id == item.id);
    let (ballot_count, abstentions) = item_ballots.fold((0, 0), |(total, abstained), b| {
        (total + 1, abstained + b.abstain as usize)
    });

    ItemTally {
        voting_item_id: item.id.clone(),
        title: item.title.clone(),
        options,
        ballots: ballot_count,
        abstentions,
    }
}

pub fn participation(election_id: &str, voters: &[Voter]) -> Participation {
    let voters: Vec<&Voter> = voters.iter()
        .filter(|v| v.election_id == election_id)
        .collect();
    Participation {
        election_id: election_id.to_owned(),
        total_voters: voters.len(),
        participated_voters: voters.iter().filter(|v| v.has_voted).count(),
    }
}
