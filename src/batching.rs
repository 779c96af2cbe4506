//! Batch partitioning of sampled frames

use std::sync::Arc;

use crate::analysis::AnalysisContext;
use crate::error::{PipelineError, Result};
use crate::sampling::{FrameSample, SamplingWindow};

/// Contiguous run of frames sent to the analysis backend in one request.
///
/// Consumed by value by the backend, so its image buffers are dropped as soon
/// as the batch has been analyzed.
#[derive(Debug, Clone)]
pub struct AnalysisBatch {
    /// Position of this batch in the request, 0-based
    pub index: usize,
    pub frames: Vec<FrameSample>,
    pub context: Arc<AnalysisContext>,
    pub window: SamplingWindow,
}

impl AnalysisBatch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.timestamp_seconds).collect()
    }

    pub fn timestamp_labels(&self) -> Vec<String> {
        self.frames.iter().map(FrameSample::timestamp_label).collect()
    }
}

/// Split `samples` into batches of `batch_size`, preserving order.
///
/// Every batch but the last holds exactly `batch_size` frames.
pub fn partition(
    samples: Vec<FrameSample>,
    batch_size: usize,
    context: Arc<AnalysisContext>,
    window: SamplingWindow,
) -> Result<Vec<AnalysisBatch>> {
    if batch_size == 0 {
        return Err(PipelineError::InvalidBatchSize(batch_size));
    }

    let mut batches = Vec::with_capacity(samples.len().div_ceil(batch_size));
    let mut frames = samples.into_iter().peekable();

    while frames.peek().is_some() {
        batches.push(AnalysisBatch {
            index: batches.len(),
            frames: frames.by_ref().take(batch_size).collect(),
            context: Arc::clone(&context),
            window,
        });
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: usize) -> Vec<FrameSample> {
        (0..n)
            .map(|i| FrameSample {
                sequence_index: i,
                timestamp_seconds: i as f64 * 2.5,
                width: 4,
                height: 4,
                encoded_image: vec![i as u8],
            })
            .collect()
    }

    fn context() -> Arc<AnalysisContext> {
        Arc::new(AnalysisContext::new("Harbor City", Some("#1d4ed8"), 7))
    }

    #[test]
    fn test_partition_counts_and_order() {
        for n in 0..12 {
            for batch_size in 1..6 {
                let original = samples(n);
                let batches = partition(original.clone(), batch_size, context(), SamplingWindow::default()).unwrap();

                assert_eq!(batches.len(), n.div_ceil(batch_size));
                assert!(batches.iter().rev().skip(1).all(|b| b.len() == batch_size));
                if let Some(last) = batches.last() {
                    assert!((1..=batch_size).contains(&last.len()));
                }
                assert!(batches.iter().enumerate().all(|(i, b)| b.index == i));

                let rejoined: Vec<FrameSample> = batches.into_iter().flat_map(|b| b.frames).collect();
                assert_eq!(rejoined, original);
            }
        }
    }

    #[test]
    fn test_partition_rejects_zero_batch_size() {
        let err = partition(samples(3), 0, context(), SamplingWindow::default()).unwrap_err();
        assert_eq!(err, PipelineError::InvalidBatchSize(0));
    }

    #[test]
    fn test_batches_share_context() {
        let ctx = context();
        let batches = partition(samples(6), 3, Arc::clone(&ctx), SamplingWindow::default()).unwrap();
        assert!(batches.iter().all(|b| Arc::ptr_eq(&b.context, &ctx)));
        assert_eq!(batches[1].timestamps(), vec![7.5, 10.0, 12.5]);
    }
}
