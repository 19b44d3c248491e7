use clap::{Parser, Subcommand};
use motiondng_cli::{build_render_settings, parse_frame_range, RenderOptionArgs};
use motiondng_core::{CancelToken, DngSequence, McrawParser, NoopCache, RenderError};
use std::path::{Path, PathBuf};
use std::time::Instant;

// Exit codes
const EXIT_INVALID_ARGS: i32 = 2;
const EXIT_PARSE_FAILURE: i32 = 3;
const EXIT_PARTIAL_FAILURE: i32 = 4;
const EXIT_CANCELLED: i32 = 5;

#[derive(Parser)]
#[command(name = "motiondng")]
#[command(version, about = "MCRAW to Cinema DNG converter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a clip into one DNG file per output frame
    Decode {
        /// Input .mcraw file
        #[arg(value_name = "CONTAINER")]
        input: PathBuf,

        /// Output directory (defaults to the container's directory)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Render only the output frames start:end (end exclusive)
        #[arg(long, value_name = "START:END")]
        frames: Option<String>,

        #[command(flatten)]
        render: RenderOptionArgs,

        /// Number of parallel render threads
        #[arg(short = 'j', long, value_name = "N")]
        threads: Option<usize>,

        /// Suppress non-essential output
        #[arg(long)]
        silent: bool,

        /// Enable verbose output (detection and pipeline details)
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print clip information
    Info {
        /// Input .mcraw file
        #[arg(value_name = "CONTAINER")]
        input: PathBuf,

        #[command(flatten)]
        render: RenderOptionArgs,

        /// Output as JSON (machine-readable)
        #[arg(long)]
        json: bool,
    },

    /// Extract the embedded audio stream as one opaque blob
    Audio {
        /// Input .mcraw file
        #[arg(value_name = "CONTAINER")]
        input: PathBuf,

        /// Output file (defaults to <container>.audio)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

struct CliError {
    code: i32,
    message: String,
}

impl CliError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    fn args(message: impl Into<String>) -> Self {
        Self::new(EXIT_INVALID_ARGS, message)
    }
}

impl From<RenderError> for CliError {
    fn from(err: RenderError) -> Self {
        let code = match err {
            RenderError::ContainerInvalid(_) | RenderError::ParserExhausted => EXIT_PARSE_FAILURE,
            RenderError::Cancelled => EXIT_CANCELLED,
            RenderError::FrameOutOfRange(..) => EXIT_INVALID_ARGS,
            _ => 1,
        };
        Self::new(code, err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::new(1, err.to_string())
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decode {
            input,
            out,
            frames,
            render,
            threads,
            silent,
            verbose,
        } => cmd_decode(input, out, frames, render, threads, silent, verbose),

        Commands::Info { input, render, json } => cmd_info(input, render, json),

        Commands::Audio { input, out } => cmd_audio(input, out),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e.message);
        std::process::exit(e.code);
    }
}

fn base_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string())
}

#[allow(clippy::too_many_arguments)]
fn cmd_decode(
    input: PathBuf,
    out: Option<PathBuf>,
    frames: Option<String>,
    render: RenderOptionArgs,
    threads: Option<usize>,
    silent: bool,
    verbose: bool,
) -> Result<(), CliError> {
    let start_time = Instant::now();

    motiondng_core::config::set_verbose(verbose);

    let settings = build_render_settings(&render).map_err(CliError::args)?;

    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| CliError::new(1, format!("failed to configure thread pool: {}", e)))?;
        if !silent {
            println!("Using {} threads for parallel processing", num_threads);
        }
    }

    if !silent {
        println!("Decoding {}...", input.display());
    }

    let data = std::fs::read(&input)?;
    let parser = McrawParser::open(&data)?;
    let sequence = DngSequence::new(&parser, settings, &base_name(&input));

    if !silent {
        let info = sequence.file_info();
        let meta = parser.metadata();
        println!(
            "  Clip: {}x{}, {} source frames, {:.2} fps median ({:?} confidence)",
            meta.width,
            meta.height,
            parser.frame_count(),
            info.median_fps,
            parser.detection_confidence()
        );
        println!(
            "  Output: {} frames at {:.3} fps ({} dropped, {} duplicated)",
            info.total_frames, info.target_fps, info.dropped_frames, info.duplicated_frames
        );
    }

    let range = match frames {
        Some(range_str) => {
            let (start, end) = parse_frame_range(&range_str).map_err(CliError::args)?;
            if start >= sequence.len() {
                return Err(CliError::args(format!(
                    "frame range starts at {} but only {} frames are planned",
                    start,
                    sequence.len()
                )));
            }
            start..end.unwrap_or(sequence.len()).min(sequence.len())
        }
        None => 0..sequence.len(),
    };

    let output_dir = out.unwrap_or_else(|| {
        input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    });
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir)?;
    }

    let cancel = CancelToken::new();
    let summary = sequence.render_range(range, &NoopCache, &cancel, |_, entry, bytes| {
        let path = output_dir.join(&entry.name);
        std::fs::write(&path, bytes)?;
        if !silent {
            println!("  {}", path.display());
        }
        Ok(())
    })?;

    let elapsed = start_time.elapsed();
    if !silent {
        println!();
        println!("Done in {:.2}s", elapsed.as_secs_f64());
        println!("  Successful: {}", summary.successful);
        println!("  Failed:     {}", summary.failed);

        if !summary.failures.is_empty() {
            println!("\nFailures:");
            for (index, message) in &summary.failures {
                println!("  frame {}: {}", index, message);
            }
        }
    }

    if summary.aborted {
        return Err(CliError::new(
            EXIT_PARTIAL_FAILURE,
            format!(
                "{} of {} frames failed, aborting past the failure threshold",
                summary.failed, summary.total
            ),
        ));
    }

    Ok(())
}

fn cmd_info(input: PathBuf, render: RenderOptionArgs, json: bool) -> Result<(), CliError> {
    let settings = build_render_settings(&render).map_err(CliError::args)?;

    let data = std::fs::read(&input)?;
    let parser = McrawParser::open(&data)?;
    let sequence = DngSequence::new(&parser, settings, &base_name(&input));
    let info = sequence.file_info();

    if json {
        let out = serde_json::to_string_pretty(&info)
            .map_err(|e| CliError::new(1, format!("failed to serialize info: {}", e)))?;
        println!("{}", out);
    } else {
        let meta = parser.metadata();
        println!("Clip: {}", input.display());
        println!(
            "  Median / Average / Target FPS: {:.2} / {:.2} -> {:.2}",
            info.median_fps, info.average_fps, info.target_fps
        );
        println!(
            "  Framecount: {} | Dropped: -{} | Duplicated: +{}",
            info.total_frames, info.dropped_frames, info.duplicated_frames
        );
        println!("  Resolution: {}x{}", info.width, info.height);
        println!("  CFA: {:?} | Device: {}", meta.cfa, meta.device_model);
        println!(
            "  Detection: {:?} via {:?}",
            parser.detection_confidence(),
            parser.detection_strategy()
        );
        if parser.has_audio() {
            println!("  Audio: {} bytes", parser.audio_data().len());
        }
    }

    Ok(())
}

fn cmd_audio(input: PathBuf, out: Option<PathBuf>) -> Result<(), CliError> {
    let data = std::fs::read(&input)?;
    let parser = McrawParser::open(&data)?;

    if !parser.has_audio() {
        return Err(CliError::new(1, "container holds no audio stream"));
    }

    let output = out.unwrap_or_else(|| input.with_extension("audio"));
    std::fs::write(&output, parser.audio_data())?;
    println!("{}", output.display());

    Ok(())
}
