use async_trait::async_trait;
use tracing::debug;

use super::{AnalysisBackend, EvidenceItem, StructuredResult};
use crate::batching::AnalysisBatch;
use crate::error::BackendFailure;

/// Offline backend with a fixed answer shape.
///
/// The output depends only on the batch's timestamps, which makes it usable
/// for tests and for running without a configured credential.
#[derive(Debug, Clone, Default)]
pub struct MockBackend;

impl MockBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnalysisBackend for MockBackend {
    async fn analyze(&self, batch: AnalysisBatch) -> Result<StructuredResult, BackendFailure> {
        debug!("Mock analysis of batch {} ({} frames)", batch.index, batch.len());

        Ok(StructuredResult {
            team_weaknesses: vec![
                "Defensive shape stretches too wide during transitions".to_string(),
                "Slow recovery runs after losing possession".to_string(),
                "Predictable build-up through the same channel".to_string(),
            ],
            player_weaknesses: vec![
                "Drifts out of position when the ball is on the far side".to_string(),
                "Tends to take an extra touch under pressure".to_string(),
            ],
            improvement_ideas: vec![
                "Press immediately after turnovers to exploit the slow recovery".to_string(),
                "Overload the opposite channel to pull the defensive shape apart".to_string(),
                "Close down the player early to force rushed decisions".to_string(),
            ],
            evidence: batch
                .frames
                .iter()
                .map(|frame| {
                    EvidenceItem::new(
                        frame.timestamp_label(),
                        format!("Frame {} reviewed for spacing and positioning", frame.sequence_index),
                    )
                })
                .collect(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn is_mock(&self) -> bool {
        true
    }
}
