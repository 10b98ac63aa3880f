use chrono::Local;
use clap::Parser;
use deepcheck::logging::{self, Verbosity};
use deepcheck::report::{self, Summary};
use deepcheck::{AnalysisResult, Analyzer, EngineConfig, Extras, Label, MediaKind};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "deepcheck")]
#[command(author, version, about = "Detect manipulated images, video and audio")]
struct Args {
    /// File or directory to analyze
    path: PathBuf,

    /// Treat every input as this kind instead of guessing from the extension
    #[arg(long, value_parser = parse_kind)]
    kind: Option<MediaKind>,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output report file (.csv, .json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for auto-generated reports
    #[arg(long, default_value = "deepcheck-reports")]
    report_dir: PathBuf,

    /// Don't auto-generate a CSV report
    #[arg(long)]
    no_report: bool,

    /// Number of parallel workers (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Show per-signal detail and debug logs
    #[arg(short, long)]
    verbose: bool,

    /// Only show summary
    #[arg(short, long)]
    quiet: bool,

    /// Print results to stdout as JSON
    #[arg(long)]
    json: bool,
}

fn parse_kind(s: &str) -> Result<MediaKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "image" => Ok(MediaKind::Image),
        "video" => Ok(MediaKind::Video),
        "audio" => Ok(MediaKind::Audio),
        other => Err(format!("unknown media kind '{}' (expected image, video or audio)", other)),
    }
}

fn main() {
    let args = Args::parse();
    logging::init(Verbosity::from_flags(args.verbose, args.quiet));

    let config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "invalid configuration");
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    // Set up thread pool
    if let Some(jobs) = args.jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            warn!(error = %e, "could not size the worker pool");
        }
    }

    let files = collect_files(&args.path, args.kind);
    if files.is_empty() {
        eprintln!("No media files found (supported: {})", MediaKind::supported_extensions());
        std::process::exit(1);
    }

    if !args.quiet {
        eprintln!("\x1b[1mdeepcheck - Manipulated Media Detector\x1b[0m");
        eprintln!("{}", "─".repeat(70));
        eprintln!("Found {} media file(s)\n", files.len());
    }

    // Set up progress bar
    let pb = if !args.quiet && files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    } else {
        None
    };

    let analyzer = Analyzer::new(config);

    // Analyze files in parallel
    let results: Vec<AnalysisResult> = files
        .par_iter()
        .map(|path| {
            let result = analyzer.analyze_path(path, args.kind);
            if let Some(ref pb) = pb {
                pb.inc(1);
                pb.set_message(result.file_name.clone());
            }
            result
        })
        .collect();

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if args.json {
        match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "could not serialize results"),
        }
    } else if !args.quiet {
        for r in &results {
            print_result(r, args.verbose);
        }
    }

    let summary = Summary::from_results(&results);
    if !args.quiet {
        print_summary(&summary);
    }

    // Determine report path
    let report_path = if let Some(ref output) = args.output {
        Some(output.clone())
    } else if !args.no_report {
        if let Err(e) = std::fs::create_dir_all(&args.report_dir) {
            warn!(dir = %args.report_dir.display(), error = %e, "could not create report directory");
        }
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("deepcheck_report_{}.csv", timestamp);
        Some(args.report_dir.join(filename))
    } else {
        None
    };

    if let Some(ref output_path) = report_path {
        if let Err(e) = report::generate(output_path, &results) {
            eprintln!("Failed to write report: {}", e);
            std::process::exit(1);
        }
        if !args.quiet {
            eprintln!("\n\x1b[32mReport saved: {}\x1b[0m", output_path.display());
        }
    }

    if !args.quiet {
        eprintln!("\n\x1b[90mAnalysis complete.\x1b[0m");
    }

    std::process::exit(summary.exit_code());
}

/// A single file is analyzed whatever its extension; directories are walked
/// for files whose kind can be guessed (or for everything when `--kind` is set).
fn collect_files(path: &Path, kind: Option<MediaKind>) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            kind.is_some()
                || e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(MediaKind::from_extension)
                    .is_some()
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

fn print_result(r: &AnalysisResult, verbose: bool) {
    let color = match r.label {
        Label::Authentic => "\x1b[32m",   // Green
        Label::Manipulated => "\x1b[31m", // Red
        Label::Error => "\x1b[90m",       // Gray
    };
    let reset = "\x1b[0m";

    let kind = r.media_kind.map(|k| k.to_string()).unwrap_or_else(|| "?".to_string());
    let regions = if r.suspicious_regions.is_empty() {
        "-".to_string()
    } else {
        r.suspicious_regions.join(",")
    };

    println!(
        "{}{:<14}{} {:>3}%  trust {:>3}  {:<6}  {:<40}  {}",
        color,
        format!("[{}]", r.label),
        reset,
        r.confidence,
        r.trust_score,
        kind,
        truncate(&regions, 40),
        &r.file_name
    );

    if verbose {
        eprintln!("    {}", r.reason);
        match &r.extras {
            Extras::Image(image) => {
                let signals: Vec<String> = image
                    .signals
                    .iter()
                    .map(|s| format!("{}={:.2}", s.signal.name(), s.applied_score))
                    .collect();
                eprintln!(
                    "    Signals: {} | fused={:.3} faces={}",
                    signals.join(" "),
                    image.fused_score,
                    image.face_count
                );
            }
            Extras::Video(video) => {
                eprintln!(
                    "    Frames: {} (stride {}) penalty={:.3} motion={} face={} lip-sync={}",
                    video.frames_analyzed,
                    video.stride,
                    video.temporal_penalty,
                    fmt_opt(video.motion_consistency),
                    fmt_opt(video.face_consistency),
                    fmt_opt(video.lip_sync_score)
                );
            }
            Extras::Audio(audio) => {
                eprintln!(
                    "    Audio: {:.1}s spoof={:.1} artifacts={:.1} overall={:.1} pitch={:.0}Hz jitter={:.2}%",
                    audio.duration_secs,
                    audio.spoof.confidence,
                    audio.artifact_score,
                    audio.overall_confidence,
                    audio.voice.pitch_mean,
                    audio.voice.jitter
                );
            }
            Extras::None => {}
        }
    }
}

fn print_summary(summary: &Summary) {
    eprintln!("\n{}", "─".repeat(70));
    eprintln!("\x1b[1mSummary:\x1b[0m");
    eprintln!("  \x1b[32m✓ Authentic:\x1b[0m   {}", summary.authentic);
    eprintln!("  \x1b[31m✗ Manipulated:\x1b[0m {}", summary.manipulated);
    if summary.error > 0 {
        eprintln!("  \x1b[90mErrors:\x1b[0m        {}", summary.error);
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
