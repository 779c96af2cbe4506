use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use game_scout_rust::sampling::{encode_frame, sample_schedule, FrameEncoding};
use game_scout_rust::{
    merge, AnalysisContext, ConfigBuilder, EvidenceItem, MockBackend, PipelineOrchestrator, SamplingWindow,
    StructuredResult, SyntheticVideoSource,
};
use game_scout_rust::config::AggregationConfig;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Benchmark schedule computation
fn bench_sample_schedule(c: &mut Criterion) {
    let window = SamplingWindow::full_video(50);

    c.bench_function("sample_schedule", |b| {
        b.iter(|| sample_schedule(black_box(5400.0), black_box(&window)))
    });
}

/// Benchmark resize + JPEG encoding at common source resolutions
fn bench_encode_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    group.sample_size(20);

    for (w, h) in [(640u32, 360u32), (1280, 720), (1920, 1080)] {
        let frame = DynamicImage::new_rgb8(w, h);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}x{}", w, h)), &frame, |b, frame| {
            b.iter(|| encode_frame(black_box(frame), FrameEncoding::default()))
        });
    }

    group.finish();
}

/// Benchmark merging many overlapping batch results
fn bench_merge(c: &mut Criterion) {
    let results: Vec<StructuredResult> = (0..50)
        .map(|i| StructuredResult {
            team_weaknesses: (0..6).map(|j| format!("Weakness {}", (i + j) % 12)).collect(),
            player_weaknesses: vec![format!("  player ISSUE {}  ", i % 3)],
            improvement_ideas: vec!["Press after turnovers".to_string()],
            evidence: vec![EvidenceItem::new("0:30", format!("note {}", i))],
        })
        .collect();
    let limits = AggregationConfig::default();

    c.bench_function("merge_50_results", |b| {
        b.iter(|| merge(black_box(results.clone()), &limits))
    });
}

/// Benchmark a full request over a synthetic stream with the mock backend
fn bench_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = ConfigBuilder::new().with_window(0.0, 1.0).build();
    let orchestrator = PipelineOrchestrator::new(
        &config,
        Arc::new(SyntheticVideoSource::new(600.0).with_resolution(1280, 720)),
        Arc::new(MockBackend::new()),
    )
    .unwrap();
    let window = config.sampling.window();

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("synthetic_mock_6_frames", |b| {
        b.iter(|| {
            rt.block_on(async {
                orchestrator
                    .run_analysis(
                        black_box(Path::new("bench.mp4")),
                        AnalysisContext::new("Bench FC", None, 10),
                        window,
                    )
                    .await
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_sample_schedule, bench_encode_frame, bench_merge, bench_pipeline);
criterion_main!(benches);
