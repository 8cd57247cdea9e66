use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand, ValueEnum};
use soundcheck_core::{
    detect_audio_format, AnalysisPipeline, AnalysisResult, AppConfig, AudioSourceConfig,
    ProcessOptions, RealtimeDriver, SourceType, Waveform,
};
use tracing_subscriber::EnvFilter;

fn main() -> soundcheck_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Analyze {
            file,
            pretty,
            skip_cache,
            blocks,
        } => run_analyze(&config, &file, pretty, skip_cache, blocks),
        Commands::Generate {
            waveform,
            frequency,
            amplitude,
            seed,
            repeat,
        } => {
            let waveform = waveform.into_waveform(frequency, amplitude, seed);
            run_generate(&config, waveform, repeat)
        }
        Commands::Monitor { seconds } => run_monitor(&config, seconds),
        Commands::Formats { paths } => {
            for path in paths {
                println!("{}\t{}", path.display(), detect_audio_format(&path));
            }
            Ok(())
        }
    }
}

fn run_analyze(
    config: &AppConfig,
    file: &Path,
    pretty: bool,
    skip_cache: bool,
    blocks: usize,
) -> soundcheck_core::Result<()> {
    let name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    tracing::info!(?file, format = %detect_audio_format(file), blocks, "analysing file");

    let pipeline = AnalysisPipeline::new(config);
    pipeline
        .router()
        .create_source(AudioSourceConfig::file(&name, file, &config.audio))?;

    let options = ProcessOptions { skip_cache };
    for _ in 0..blocks.max(1) {
        let result = pipeline.process_audio_source(&name, options)?;
        print_result(&result, pretty)?;
    }

    if let Some(metrics) = pipeline.get_latest_metrics() {
        tracing::info!(
            processing_ms = metrics.processing_time.as_secs_f64() * 1_000.0,
            cache_hit_rate = metrics.cache_hit_rate,
            "analysis finished"
        );
    }
    Ok(())
}

fn run_generate(config: &AppConfig, waveform: Waveform, repeat: usize) -> soundcheck_core::Result<()> {
    tracing::info!(?waveform, repeat, "analysing generated signal");

    let pipeline = AnalysisPipeline::new(config);
    pipeline.router().create_source(
        AudioSourceConfig::from_audio("generator", SourceType::Generator, &config.audio)
            .with_waveform(waveform),
    )?;

    for _ in 0..repeat.max(1) {
        let result = pipeline.process_audio_source("generator", ProcessOptions::default())?;
        print_result(&result, false)?;
    }

    println!("{}", serde_json::to_string(&pipeline.cache_stats())?);
    Ok(())
}

fn run_monitor(config: &AppConfig, seconds: f64) -> soundcheck_core::Result<()> {
    let pipeline = Arc::new(AnalysisPipeline::new(config));
    pipeline.router().create_source(AudioSourceConfig::from_audio(
        "monitor",
        SourceType::Generator,
        &config.audio,
    ))?;

    let mut driver = RealtimeDriver::start(Arc::clone(&pipeline), Vec::new(), ProcessOptions::default())?;
    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match driver.results().recv_timeout(remaining) {
            Ok(output) => tracing::info!(
                source = %output.source,
                latency_ms = output.latency.as_secs_f64() * 1_000.0,
                actions = output.result.suggested_actions.len(),
                "analysed buffer"
            ),
            Err(_) => break,
        }
    }
    driver.stop();

    let stats = pipeline.cache_stats();
    tracing::info!(
        processed = pipeline.get_metrics().len(),
        dropped = driver.dropped(),
        hit_rate = stats.hit_rate,
        "monitor stopped"
    );
    Ok(())
}

fn print_result(result: &AnalysisResult, pretty: bool) -> soundcheck_core::Result<()> {
    let json = if pretty {
        result.to_json_pretty()?
    } else {
        result.to_json()?
    };
    println!("{json}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio source routing and cached feature analysis", long_about = None)]
struct Cli {
    /// JSON configuration file; built-in defaults otherwise.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse consecutive blocks of an audio file and print the results.
    Analyze {
        /// Path to the audio file that should be analysed.
        file: PathBuf,
        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
        /// Bypass the analysis cache.
        #[arg(long)]
        skip_cache: bool,
        /// Number of buffers to pull from the file.
        #[arg(long, default_value_t = 1)]
        blocks: usize,
    },
    /// Analyse a synthetic signal, repeatedly, and report cache behaviour.
    Generate {
        #[arg(long, value_enum, default_value_t = WaveformArg::Sine)]
        waveform: WaveformArg,
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
        /// Noise generator seed.
        #[arg(long, default_value_t = 1)]
        seed: u32,
        #[arg(long, default_value_t = 2)]
        repeat: usize,
    },
    /// Drive a generator through the real-time capture loop.
    Monitor {
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
    },
    /// Print the detected container format of each path.
    Formats {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WaveformArg {
    Silence,
    Sine,
    Noise,
}

impl WaveformArg {
    fn into_waveform(self, frequency: f32, amplitude: f32, seed: u32) -> Waveform {
        match self {
            WaveformArg::Silence => Waveform::Silence,
            WaveformArg::Sine => Waveform::Sine {
                frequency,
                amplitude,
            },
            WaveformArg::Noise => Waveform::Noise { amplitude, seed },
        }
    }
}
