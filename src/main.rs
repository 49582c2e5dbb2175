use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use surfcoach_analyzer::{
    sample_timestamps, AnalysisPipeline, AnalysisRequester, Config, EnvCredential, FramePreset,
    GeminiClient, InputMode, LogReauth, RequestOutcome, VideoProbe,
};

fn cli() -> Command {
    let video_arg = Arg::new("video")
        .value_name("VIDEO")
        .help("Surf video to analyze")
        .required(true);

    Command::new("surfcoach")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Surf technique analysis from video using a hosted multimodal model")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to surfcoach.toml if present)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("analyze")
                .about("Analyze a surf video and print the coaching report as JSON")
                .arg(video_arg.clone())
                .arg(
                    Arg::new("frames")
                        .short('f')
                        .long("frames")
                        .value_name("NUM")
                        .help("Number of frames to sample")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("preset")
                        .short('p')
                        .long("preset")
                        .value_name("HEIGHT")
                        .help("Frame size preset")
                        .value_parser(["360", "480", "540", "720"]),
                )
                .arg(
                    Arg::new("mode")
                        .short('m')
                        .long("mode")
                        .value_name("MODE")
                        .help("Send the raw video, sampled frames, or decide by size")
                        .value_parser(["auto", "raw", "frames"]),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Write the report to a file instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("probe")
                .about("Print video information as JSON")
                .arg(video_arg),
        )
        .subcommand(
            Command::new("schedule")
                .about("Print the sampling timestamps for a clip duration")
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .value_name("SECONDS")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("frames")
                        .short('f')
                        .long("frames")
                        .value_name("NUM")
                        .default_value("12")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(Path::new(path)),
        None => Config::load(),
    }
}

fn required<'a, T>(matches: &'a ArgMatches, name: &str) -> Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    matches
        .get_one::<T>(name)
        .ok_or_else(|| anyhow!("Missing required argument: {}", name))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // Configure logging based on verbose flag
    let filter = if matches.get_flag("verbose") {
        "surfcoach_analyzer=debug,surfcoach=debug,info"
    } else {
        "surfcoach_analyzer=info,surfcoach=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SURFCOACH_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("analyze", sub)) => {
            apply_overrides(&mut config, sub)?;
            config.validate()?;
            let video = PathBuf::from(required::<String>(sub, "video")?);
            let output = sub.get_one::<String>("output").map(PathBuf::from);
            analyze(config, &video, output.as_deref()).await
        }
        Some(("probe", sub)) => {
            let video = PathBuf::from(required::<String>(sub, "video")?);
            let info = VideoProbe::new(config.sampling.ffprobe_path.clone())
                .probe(&video)
                .await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Some(("schedule", sub)) => {
            let duration = *required::<f64>(sub, "duration")?;
            let frames = *required::<usize>(sub, "frames")?;
            for (index, ts) in sample_timestamps(duration, frames).iter().enumerate() {
                println!("{:>3}  {:.3}s", index + 1, ts);
            }
            Ok(())
        }
        _ => Err(anyhow!("No subcommand given, see --help")),
    }
}

fn apply_overrides(config: &mut Config, sub: &ArgMatches) -> Result<()> {
    if let Some(frames) = sub.get_one::<usize>("frames") {
        config.sampling.frame_count = *frames;
    }
    if let Some(preset) = sub.get_one::<String>("preset") {
        config.sampling.preset = preset.parse::<FramePreset>().map_err(|e| anyhow!(e))?;
    }
    if let Some(mode) = sub.get_one::<String>("mode") {
        config.policy.mode = match mode.as_str() {
            "raw" => InputMode::Raw,
            "frames" => InputMode::Frames,
            _ => InputMode::Auto,
        };
    }
    Ok(())
}

async fn analyze(config: Config, video: &Path, output: Option<&Path>) -> Result<()> {
    info!("🚀 SurfCoach starting...");
    info!("📁 Input video: {}", video.display());
    for line in config.summary().lines() {
        info!("{}", line);
    }

    if !video.exists() {
        return Err(anyhow!("Input video not found: {}", video.display()));
    }

    let instruction = config.prompts.load_instruction().await?;
    let client = Arc::new(GeminiClient::new(&config.model)?);
    let credentials = Arc::new(EnvCredential::new(config.model.credential_env.clone()));
    let reauth = Arc::new(LogReauth::new(config.model.credential_env.clone()));

    let requester = AnalysisRequester::new(client, credentials, &config.model)
        .with_instruction(instruction)
        .with_reauth_handler(reauth);
    let pipeline = AnalysisPipeline::new(&config, requester);

    match pipeline.run(video).await? {
        RequestOutcome::Success(result) => {
            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    tokio::fs::write(path, json).await?;
                    info!("💾 Report saved to: {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        RequestOutcome::Failure { kind, message } => {
            warn!("Analysis failed ({}): {}", kind, message);
            Err(anyhow!("{}", kind.user_message()))
        }
    }
}
