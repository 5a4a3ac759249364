//! CLI entry point for Media Batch
//!
//! Maps subcommands to engine operations over a single file, an explicit
//! list or a directory, and reports one line per job.

use clap::{Args, Parser, Subcommand};
use media_batch::paths::{normalize, MediaKind, MediaPath};
use media_batch::{
    check_tools_available, discover, probe, strip_derived_names, AudioSource, BatchOrchestrator,
    BatchResult, MediaError, MediaTool, Operation, Outcome, PairingAssigner, Settings, SystemTool,
    TransformEngine, TrimMode,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

/// Media Batch - cut, convert, compress and re-score media files with ffmpeg
#[derive(Parser, Debug)]
#[command(name = "media-batch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Debug logging for the engine (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip the ffmpeg/ffprobe availability check
    #[arg(long, global = true, default_value = "false")]
    skip_checks: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Exactly one way of naming the inputs
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Targets {
    /// A single input file
    #[arg(long)]
    file: Option<String>,

    /// An explicit list of input files
    #[arg(long, num_args = 1..)]
    files: Vec<String>,

    /// Every matching file directly inside this directory
    #[arg(long)]
    dir: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct AudioSources {
    /// One audio file used for every video
    #[arg(long)]
    audio: Option<String>,

    /// Audio files assigned to videos in turn (or at random)
    #[arg(long, num_args = 1..)]
    audios: Vec<String>,

    /// Directory whose audio files are assigned to videos
    #[arg(long)]
    audio_dir: Option<String>,
}

#[derive(Args, Debug)]
struct AudioOptions {
    #[command(flatten)]
    sources: AudioSources,

    /// Pick a random audio per video instead of round-robin
    #[arg(long)]
    random: bool,

    /// Seed for --random, for reproducible pairing
    #[arg(long, requires = "random")]
    seed: Option<u64>,

    /// Re-encode the video instead of copying it
    #[arg(long)]
    compress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cut a time range out of videos
    Cut {
        #[command(flatten)]
        targets: Targets,
        /// Start time (seconds or HH:MM:SS)
        #[arg(long)]
        start: Option<String>,
        /// End time (seconds or HH:MM:SS)
        #[arg(long)]
        end: Option<String>,
        /// Keyframe-aligned stream copy instead of a frame-accurate re-encode
        #[arg(long)]
        fast: bool,
    },
    /// Convert media to another container
    Convert {
        #[command(flatten)]
        targets: Targets,
        /// Target extension (mp4, mkv, mov, webm, avi, mp3, wav, ogg, flac)
        #[arg(long)]
        to: String,
    },
    /// Downscale and re-encode videos at a target bitrate
    Compress {
        #[command(flatten)]
        targets: Targets,
        /// Video bitrate in kbps
        #[arg(long, default_value_t = 2500)]
        bitrate: u32,
        /// Shorter side after scaling; smaller videos are left as is
        #[arg(long, default_value_t = 1080)]
        min_resolution: u32,
        /// Video codec (defaults to the settings codec)
        #[arg(long)]
        vcodec: Option<String>,
    },
    /// Replace the audio track of videos
    ReplaceAudio {
        #[command(flatten)]
        targets: Targets,
        #[command(flatten)]
        audio: AudioOptions,
    },
    /// Mix an audio file into the existing audio of videos
    CombineAudio {
        #[command(flatten)]
        targets: Targets,
        #[command(flatten)]
        audio: AudioOptions,
    },
    /// Upscale videos by an integer factor
    Upscale {
        #[command(flatten)]
        targets: Targets,
        #[arg(long, default_value_t = 2)]
        factor: u32,
    },
    /// Add reverb, writing an MP3
    Reverb {
        #[command(flatten)]
        targets: Targets,
    },
    /// Lower pitch and tempo, writing an MP3
    DeepVoice {
        #[command(flatten)]
        targets: Targets,
        /// Playback rate in (0, 1]
        #[arg(long, default_value_t = 0.8)]
        rate: f64,
    },
    /// Show duration, resolution, bitrate and codecs of a file
    Probe {
        file: String,
        /// Print the raw ffprobe result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that ffmpeg and ffprobe are installed
    CheckTools,
    /// Show or change the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Rename derived outputs (`name__cut.mp4`) back to their original name
    TidyNames { dir: String },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the effective settings
    Show,
    /// Update and save the settings file
    Save {
        #[arg(long)]
        max_workers: Option<u32>,
        #[arg(long)]
        vcodec: Option<String>,
    },
}

impl Targets {
    /// Normalized inputs; directories are listed without recursion and
    /// filtered to `kinds`.
    fn resolve(&self, kinds: &[MediaKind]) -> Result<Vec<MediaPath>, MediaError> {
        if let Some(file) = &self.file {
            return Ok(vec![normalize(file)]);
        }
        if let Some(dir) = &self.dir {
            let dir = normalize(dir).path;
            let mut items = Vec::new();
            for kind in kinds {
                items.extend(discover(&dir, *kind)?);
            }
            items.sort_by(|a, b| a.path.cmp(&b.path));
            return Ok(items);
        }
        Ok(self.files.iter().map(|f| normalize(f)).collect())
    }

    fn dir(&self) -> Option<PathBuf> {
        self.dir.as_deref().map(|d| normalize(d).path)
    }
}

impl AudioOptions {
    fn source(&self) -> Result<AudioSource, MediaError> {
        let sources = &self.sources;
        if let Some(audio) = &sources.audio {
            return Ok(AudioSource::Fixed(normalize(audio).path));
        }

        let audios: Vec<PathBuf> = match &sources.audio_dir {
            Some(dir) => discover(&normalize(dir).path, MediaKind::Audio)?
                .into_iter()
                .map(|m| m.path)
                .collect(),
            None => sources.audios.iter().map(|a| normalize(a).path).collect(),
        };

        let assigner = match self.seed {
            Some(seed) => PairingAssigner::with_seed(audios, self.random, seed)?,
            None => PairingAssigner::new(audios, self.random)?,
        };
        Ok(AudioSource::Paired(Arc::new(assigner)))
    }
}

/// Builds the operation and its inputs for a transform subcommand.
fn plan(command: Commands) -> Result<(Vec<MediaPath>, Operation), MediaError> {
    const VIDEO: &[MediaKind] = &[MediaKind::Video];
    const MEDIA: &[MediaKind] = &[MediaKind::Video, MediaKind::Audio];

    let planned = match command {
        Commands::Cut {
            targets,
            start,
            end,
            fast,
        } => {
            let mode = if fast {
                TrimMode::FastSeek
            } else {
                TrimMode::FrameAccurate
            };
            (targets.resolve(VIDEO)?, Operation::Cut { start, end, mode })
        }
        Commands::Convert { targets, to } => {
            (targets.resolve(MEDIA)?, Operation::Convert { extension: to })
        }
        Commands::Compress {
            targets,
            bitrate,
            min_resolution,
            vcodec,
        } => {
            let output_dir = targets.dir().map(|d| d.join("output"));
            (
                targets.resolve(VIDEO)?,
                Operation::Compress {
                    bitrate_kbps: bitrate,
                    min_resolution,
                    vcodec,
                    output_dir,
                },
            )
        }
        Commands::ReplaceAudio { targets, audio } => (
            targets.resolve(VIDEO)?,
            Operation::AudioReplace {
                audio: audio.source()?,
                compress: audio.compress,
            },
        ),
        Commands::CombineAudio { targets, audio } => (
            targets.resolve(VIDEO)?,
            Operation::AudioCombine {
                audio: audio.source()?,
                compress: audio.compress,
            },
        ),
        Commands::Upscale { targets, factor } => {
            (targets.resolve(VIDEO)?, Operation::Upscale { factor })
        }
        Commands::Reverb { targets } => (targets.resolve(MEDIA)?, Operation::Reverb),
        Commands::DeepVoice { targets, rate } => {
            (targets.resolve(MEDIA)?, Operation::DeepVoice { rate })
        }
        other => {
            return Err(MediaError::InvalidParameter(format!(
                "{:?} is not a transform command",
                other
            )))
        }
    };
    Ok(planned)
}

fn report(result: &BatchResult) {
    for job in &result.results {
        match &job.outcome {
            Ok(Outcome::Written(path)) => println!("{} -> {}", job.input.display(), path.display()),
            Ok(Outcome::Unchanged { path, reason }) => {
                println!("{} unchanged ({})", path.display(), reason)
            }
            Err(_) => {
                if let Some(line) = job.failure_line() {
                    eprintln!("{}", line);
                }
            }
        }
    }
    println!(
        "{} succeeded, {} unchanged, {} failed",
        result.succeeded(),
        result.unchanged(),
        result.failed()
    );
}

fn run_probe(tool: &dyn MediaTool, file: &str, json: bool) -> ExitCode {
    let media = normalize(file);
    if json {
        return match tool.probe(&media.path) {
            Ok(result) => match serde_json::to_string_pretty(&result) {
                Ok(text) => {
                    println!("{}", text);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to render probe result: {}", e);
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("{}: {}: {}", media.path.display(), e.kind(), e);
                ExitCode::FAILURE
            }
        };
    }

    match probe::probe(tool, &media.path) {
        Ok(info) => {
            println!("File: {}", media.path.display());
            println!("Kind: {}", media.kind.as_str());
            println!("Duration: {:.3}s", info.duration_secs);
            if let Some(video) = &info.video {
                println!(
                    "Video: {}x{} {}",
                    video.width,
                    video.height,
                    video.codec.as_deref().unwrap_or("unknown")
                );
            }
            if let Some(kbps) = info.bitrate_kbps {
                println!("Bitrate: {} kbps", kbps);
            }
            if let Some(codec) = &info.audio_codec {
                println!("Audio: {}", codec);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}: {}", media.path.display(), e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_settings(path: &Path, action: SettingsAction) -> ExitCode {
    let mut settings = match Settings::load(path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings from {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let SettingsAction::Save { max_workers, vcodec } = action {
        if let Some(workers) = max_workers {
            settings.max_workers = workers;
        }
        if let Some(vcodec) = vcodec {
            settings.default_codec = vcodec;
        }
        settings = match settings.save_and_reload(path) {
            Ok(saved) => {
                info!("settings saved to {}", path.display());
                saved
            }
            Err(e) => {
                eprintln!("Failed to save settings: {}", e);
                return ExitCode::FAILURE;
            }
        };
    }

    match serde_json::to_string_pretty(&settings) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render settings: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_tidy(dir: &str) -> ExitCode {
    let dir = normalize(dir).path;
    match strip_derived_names(&dir) {
        Ok(renamed) => {
            for (from, to) in &renamed {
                println!("{} -> {}", from.display(), to.display());
            }
            println!("{} file(s) renamed", renamed.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to rename files in {}: {}", dir.display(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "media_batch=debug,media_batch_cli=debug".to_string()
        } else {
            "media_batch=info,media_batch_cli=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Settings { action } => return run_settings(&cli.settings, action),
        Commands::TidyNames { dir } => return run_tidy(&dir),
        _ => {}
    }

    let settings = match Settings::load(&cli.settings) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings from {}: {}", cli.settings.display(), e);
            return ExitCode::FAILURE;
        }
    };
    debug!(
        "settings: max_workers={}, vcodec={}",
        settings.max_workers, settings.default_codec
    );

    let tool: Arc<dyn MediaTool> = Arc::new(SystemTool::new());

    if matches!(cli.command, Commands::CheckTools) || !cli.skip_checks {
        match check_tools_available(tool.as_ref()) {
            Ok(Some(major)) => info!("ffmpeg {} and ffprobe available", major),
            Ok(None) => info!("ffmpeg (unknown version) and ffprobe available"),
            Err(e) => {
                eprintln!("Startup check failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        eprintln!("WARNING: Skipping startup checks (--skip-checks enabled)");
    }

    let (items, operation) = match cli.command {
        Commands::CheckTools => {
            println!("ffmpeg and ffprobe are available");
            return ExitCode::SUCCESS;
        }
        Commands::Probe { file, json } => return run_probe(tool.as_ref(), &file, json),
        command => match plan(command) {
            Ok(planned) => planned,
            Err(e) => {
                eprintln!("{}: {}", e.kind(), e);
                return ExitCode::FAILURE;
            }
        },
    };

    if items.is_empty() {
        eprintln!("No matching input files");
        return ExitCode::FAILURE;
    }

    let engine = Arc::new(TransformEngine::new(tool, &settings));
    let orchestrator = BatchOrchestrator::new(engine, &settings)
        .with_terminal_progress(std::io::stderr().is_terminal());

    let result = orchestrator.run_batch(items, operation).await;
    report(&result);

    if result.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
