use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use game_scout_rust::sampling::{encode_frame, sample_schedule, FrameEncoding};
use game_scout_rust::{
    merge, AnalysisContext, Config, ConfigBuilder, EvidenceItem, MockBackend, PipelineOrchestrator, SamplingWindow,
    StructuredResult, SyntheticVideoSource,
};
use image::DynamicImage;

#[tokio::main]
async fn main() {
    println!("🚀 Game Scout - Quick Performance Benchmark");
    println!("===========================================");

    // Benchmark 1: Scheduling
    println!("\n🗓️ Sampling schedule:");
    let window = SamplingWindow::full_video(50);
    let start = Instant::now();
    for i in 0..10_000 {
        let _ = sample_schedule(60.0 + i as f64, &window);
    }
    let elapsed = start.elapsed();
    println!("  ✅ 10,000 schedules: {:?} ({:.2}μs each)", elapsed, elapsed.as_micros() as f64 / 10_000.0);

    // Benchmark 2: Frame encoding
    println!("\n🖼️ Frame encoding:");
    for (w, h) in [(640, 360), (1280, 720), (1920, 1080)] {
        let frame = DynamicImage::new_rgb8(w, h);
        let start = Instant::now();
        let mut bytes = 0;
        for _ in 0..20 {
            if let Ok((encoded, _, _)) = encode_frame(&frame, FrameEncoding::default()) {
                bytes = encoded.len();
            }
        }
        let elapsed = start.elapsed();
        println!(
            "  ✅ {}x{} → 20 encodes: {:?} ({:.2}ms each, {} bytes)",
            w,
            h,
            elapsed,
            elapsed.as_secs_f64() * 1000.0 / 20.0,
            bytes
        );
    }

    // Benchmark 3: Aggregation
    println!("\n🧮 Aggregation:");
    let results: Vec<StructuredResult> = (0..100)
        .map(|i| StructuredResult {
            team_weaknesses: (0..10).map(|j| format!("Weakness {}", (i + j) % 15)).collect(),
            player_weaknesses: vec![format!("Player issue {}", i % 4)],
            improvement_ideas: vec!["Press high".to_string()],
            evidence: vec![EvidenceItem::new(format!("0:{:02}", i % 60), "note")],
        })
        .collect();
    let start = Instant::now();
    let report = merge(results, &Config::default().aggregation);
    println!(
        "  ✅ 100 results merged: {:?} ({} team weaknesses, {} evidence)",
        start.elapsed(),
        report.team_weaknesses.len(),
        report.evidence.len()
    );

    // Benchmark 4: Full pipeline on a synthetic stream with the mock backend
    println!("\n🎞️ End-to-end (synthetic, mock backend):");
    for max_frames in [6, 12, 24] {
        let config = ConfigBuilder::new().with_window(0.0, 1.0).with_max_frames(max_frames).build();
        let orchestrator = match PipelineOrchestrator::new(
            &config,
            Arc::new(SyntheticVideoSource::new(600.0)),
            Arc::new(MockBackend::new()),
        ) {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                println!("  ❌ {}", e);
                continue;
            }
        };

        let run = orchestrator
            .execute(
                Path::new("bench.mp4"),
                AnalysisContext::new("Bench FC", None, 10),
                config.sampling.window(),
            )
            .await;
        println!(
            "  {} {} frames in {} batches: {:?}",
            if run.is_success() { "✅" } else { "❌" },
            run.frames_sampled,
            run.batch_count,
            run.elapsed
        );
    }

    println!("\n🎉 Benchmark complete!");
}
