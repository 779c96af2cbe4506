use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use game_scout_rust::{
    create_backend, AnalysisContext, Config, FfmpegVideoSource, PipelineOrchestrator, SyntheticVideoSource,
    VideoSource,
};

fn cli() -> Command {
    Command::new("Game Scout (Rust)")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Scouting report from game footage: team and player weaknesses with timestamped evidence")
        .arg(
            Arg::new("video")
                .short('i')
                .long("video")
                .value_name("FILE")
                .help("Video file to analyze")
                .required_unless_present("synthetic"),
        )
        .arg(
            Arg::new("team")
                .short('t')
                .long("team")
                .value_name("NAME")
                .help("Team under review")
                .required(true),
        )
        .arg(
            Arg::new("color")
                .short('c')
                .long("color")
                .value_name("HEX")
                .help("Team jersey color, e.g. #1d4ed8"),
        )
        .arg(
            Arg::new("player")
                .short('p')
                .long("player")
                .value_name("NUMBER")
                .help("Jersey number of the player to focus on")
                .value_parser(clap::value_parser!(u32))
                .required(true),
        )
        .arg(
            Arg::new("max-frames")
                .long("max-frames")
                .value_name("NUM")
                .help("Frames sampled per request")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_name("NUM")
                .help("Frames per backend request")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("window-start")
                .long("window-start")
                .value_name("FRACTION")
                .help("Start of the sampling window as a fraction of the duration")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("window-end")
                .long("window-end")
                .value_name("FRACTION")
                .help("End of the sampling window as a fraction of the duration")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("synthetic")
                .long("synthetic")
                .value_name("SECONDS")
                .help("Analyze a generated test stream of this length instead of a file")
                .value_parser(clap::value_parser!(f64))
                .conflicts_with("video"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
}

fn load_config(matches: &ArgMatches) -> Config {
    let loaded = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(Path::new(path)),
        None => Config::load(),
    };

    let mut config = loaded.unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::from_env()
    });

    if let Some(max_frames) = matches.get_one::<usize>("max-frames") {
        config.sampling.max_frames = *max_frames;
    }
    if let Some(batch_size) = matches.get_one::<usize>("batch-size") {
        config.batching.batch_size = *batch_size;
    }
    if let Some(start) = matches.get_one::<f64>("window-start") {
        config.sampling.window_start = *start;
    }
    if let Some(end) = matches.get_one::<f64>("window-end") {
        config.sampling.window_end = *end;
    }

    config
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("game_scout_rust=debug,game_scout=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("game_scout_rust={},game_scout={},warn", level, level)))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    let config = load_config(&matches);
    init_logging(&config.logging.level, verbose);

    if verbose {
        info!("Verbose logging enabled");
    }
    info!("🚀 Game Scout (Rust) starting...");
    info!("{}", config.summary());

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(e.exit_code());
    }

    let (source, video_path): (Arc<dyn VideoSource>, PathBuf) = match matches.get_one::<f64>("synthetic") {
        Some(seconds) => {
            info!("🧪 Using a {:.1}s synthetic stream", seconds);
            (Arc::new(SyntheticVideoSource::new(*seconds)), PathBuf::from("synthetic.mp4"))
        }
        None => {
            let path = matches
                .get_one::<String>("video")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("--video is required"))?;
            (Arc::new(FfmpegVideoSource::from_config(&config.video)), path)
        }
    };

    let context = AnalysisContext::new(
        matches
            .get_one::<String>("team")
            .map(String::as_str)
            .unwrap_or_default(),
        matches.get_one::<String>("color").map(String::as_str),
        matches.get_one::<u32>("player").copied().unwrap_or_default(),
    );

    let backend = match create_backend(&config.backend).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to set up analysis backend: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let orchestrator = match PipelineOrchestrator::new(&config, source, backend) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    let run = orchestrator
        .execute(&video_path, context, config.sampling.window())
        .await;

    info!(
        "🎉 Finished in {:.2}s ({} frames, {} batches)",
        run.elapsed.as_secs_f64(),
        run.frames_sampled,
        run.batch_count
    );

    match run.outcome {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!("❌ {} ({})", e, e.kind());
            if e.is_retryable() {
                warn!("This failure is transient; retrying later may succeed");
            }
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_cli_overrides_config() {
        let matches = cli()
            .try_get_matches_from([
                "game-scout",
                "--synthetic",
                "30",
                "--team",
                "Rovers",
                "--player",
                "7",
                "--batch-size",
                "2",
                "--window-end",
                "1.0",
            ])
            .unwrap();

        let config = load_config(&matches);
        assert_eq!(config.batching.batch_size, 2);
        assert_eq!(config.sampling.window_end, 1.0);
    }

    #[test]
    fn test_video_or_synthetic_required() {
        let result = cli().try_get_matches_from(["game-scout", "--team", "Rovers", "--player", "7"]);
        assert!(result.is_err());
    }
}
