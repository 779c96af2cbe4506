//! Merging of per-batch results into one report

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::analysis::{EvidenceItem, StructuredResult};
use crate::config::AggregationConfig;

/// Final scouting report for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub team_weaknesses: Vec<String>,
    pub player_weaknesses: Vec<String>,
    pub improvement_ideas: Vec<String>,
    pub evidence: Vec<EvidenceItem>,
}

impl AggregatedReport {
    pub fn is_empty(&self) -> bool {
        self.team_weaknesses.is_empty()
            && self.player_weaknesses.is_empty()
            && self.improvement_ideas.is_empty()
            && self.evidence.is_empty()
    }
}

/// Dedup key: trimmed and case-folded
fn dedup_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// First-seen-wins list with a hard cap
#[derive(Debug, Default)]
struct DedupList {
    seen: HashSet<String>,
    items: Vec<String>,
    cap: usize,
}

impl DedupList {
    fn with_cap(cap: usize) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    fn extend(&mut self, entries: Vec<String>) {
        for entry in entries {
            if self.items.len() >= self.cap {
                return;
            }
            let key = dedup_key(&entry);
            if !key.is_empty() && self.seen.insert(key) {
                self.items.push(entry.trim().to_string());
            }
        }
    }
}

/// Builds an [`AggregatedReport`] incrementally as batch results arrive in order
#[derive(Debug)]
pub struct Aggregator {
    team_weaknesses: DedupList,
    player_weaknesses: DedupList,
    improvement_ideas: DedupList,
    evidence: Vec<EvidenceItem>,
    max_evidence: usize,
    results_merged: usize,
}

impl Aggregator {
    pub fn new(limits: &AggregationConfig) -> Self {
        Self {
            team_weaknesses: DedupList::with_cap(limits.max_items),
            player_weaknesses: DedupList::with_cap(limits.max_items),
            improvement_ideas: DedupList::with_cap(limits.max_items),
            evidence: Vec::new(),
            max_evidence: limits.max_evidence,
            results_merged: 0,
        }
    }

    pub fn push(&mut self, result: StructuredResult) {
        self.team_weaknesses.extend(result.team_weaknesses);
        self.player_weaknesses.extend(result.player_weaknesses);
        self.improvement_ideas.extend(result.improvement_ideas);

        let room = self.max_evidence.saturating_sub(self.evidence.len());
        self.evidence.extend(result.evidence.into_iter().take(room));

        self.results_merged += 1;
    }

    pub fn results_merged(&self) -> usize {
        self.results_merged
    }

    pub fn finalize(self) -> AggregatedReport {
        AggregatedReport {
            team_weaknesses: self.team_weaknesses.items,
            player_weaknesses: self.player_weaknesses.items,
            improvement_ideas: self.improvement_ideas.items,
            evidence: self.evidence,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(&AggregationConfig::default())
    }
}

/// Merge results given in batch order. An empty input gives an empty report.
pub fn merge<I>(results: I, limits: &AggregationConfig) -> AggregatedReport
where
    I: IntoIterator<Item = StructuredResult>,
{
    let mut aggregator = Aggregator::new(limits);
    for result in results {
        aggregator.push(result);
    }
    aggregator.finalize()
}
