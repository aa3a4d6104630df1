use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use piano_metronome::audio::{shared_output, AudioContext, OfflineContext};
use piano_metronome::config::AppConfig;
use piano_metronome::metronome::{
    plan_clicks, LookaheadScheduler, Metronome, Tempo, MAX_LOOKAHEAD_MS,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "metronome_cli",
    about = "Look-ahead metronome: play, render to WAV, or inspect click plans"
)]
struct Cli {
    /// Override configuration file (defaults to assets/metronome_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play clicks on the default output device, printing events as JSON lines
    Play {
        #[arg(long)]
        bpm: Option<f64>,
        #[arg(long, default_value_t = 8.0)]
        seconds: f64,
        /// Tempo to switch to mid-run
        #[arg(long, requires = "change_at")]
        change_bpm: Option<f64>,
        /// Seconds after start at which `--change-bpm` is applied
        #[arg(long, requires = "change_bpm")]
        change_at: Option<f64>,
    },
    /// Render clicks offline to a 32-bit float mono WAV
    Render {
        #[arg(long)]
        bpm: Option<f64>,
        #[arg(long, default_value_t = 8.0)]
        seconds: f64,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, requires = "change_at")]
        change_bpm: Option<f64>,
        #[arg(long, requires = "change_bpm")]
        change_at: Option<f64>,
    },
    /// Print the clicks one look-ahead pass would schedule
    Plan {
        #[arg(long)]
        bpm: Option<f64>,
        #[arg(long)]
        now_ms: f64,
        #[arg(long, default_value_t = 0.0)]
        origin_ms: f64,
        #[arg(long)]
        window_ms: Option<f64>,
    },
}

/// Tempo change requested on the command line
#[derive(Debug, Clone, Copy)]
struct TempoChange {
    at: Duration,
    tempo: Tempo,
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);

    match cli.command {
        Commands::Play {
            bpm,
            seconds,
            change_bpm,
            change_at,
        } => {
            let tempo = resolve_tempo(&config, bpm)?;
            let change = resolve_change(&config, change_bpm, change_at)?;
            run_play(&config, tempo, seconds, change)
        }
        Commands::Render {
            bpm,
            seconds,
            output,
            change_bpm,
            change_at,
        } => {
            let tempo = resolve_tempo(&config, bpm)?;
            let change = resolve_change(&config, change_bpm, change_at)?;
            run_render(&config, tempo, seconds, change, output)
        }
        Commands::Plan {
            bpm,
            now_ms,
            origin_ms,
            window_ms,
        } => {
            let tempo = resolve_tempo(&config, bpm)?;
            let window_ms = window_ms.unwrap_or(config.metronome.lookahead_ms);
            if !(window_ms.is_finite() && window_ms > 0.0 && window_ms <= MAX_LOOKAHEAD_MS) {
                anyhow::bail!("--window-ms must be in (0, {MAX_LOOKAHEAD_MS}], got {window_ms}");
            }
            let plan = plan_clicks(now_ms, origin_ms, tempo.interval_ms(), window_ms);
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn resolve_tempo(config: &AppConfig, bpm: Option<f64>) -> Result<Tempo> {
    let requested = bpm.unwrap_or(config.metronome.default_bpm);
    let tempo = Tempo::within(requested, &config.metronome.tempo_range)
        .with_context(|| format!("invalid tempo {requested}"))?;
    if tempo.bpm() != requested {
        tracing::warn!("Tempo {} BPM clamped to {} BPM", requested, tempo.bpm());
    }
    Ok(tempo)
}

fn resolve_change(
    config: &AppConfig,
    bpm: Option<f64>,
    at_seconds: Option<f64>,
) -> Result<Option<TempoChange>> {
    match (bpm, at_seconds) {
        (Some(bpm), Some(at)) => {
            let at = Duration::try_from_secs_f64(at)
                .with_context(|| format!("invalid --change-at {at}"))?;
            Ok(Some(TempoChange {
                at,
                tempo: resolve_tempo(config, Some(bpm))?,
            }))
        }
        _ => Ok(None),
    }
}

fn run_play(
    config: &AppConfig,
    tempo: Tempo,
    seconds: f64,
    change: Option<TempoChange>,
) -> Result<ExitCode> {
    let duration = Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("invalid --seconds {seconds}"))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("metronome-cli")
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let context: Arc<dyn AudioContext> = shared_output().context("opening audio output")?;
    let metronome = Metronome::with_runtime(context, config, runtime.handle().clone());

    runtime.block_on(async {
        let mut events = Box::pin(metronome.event_stream());
        let printer = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::warn!("Failed to encode event: {}", err),
                }
            }
        });

        metronome.start(tempo.bpm())?;

        let session = async {
            match change {
                Some(change) if change.at < duration => {
                    tokio::time::sleep(change.at).await;
                    metronome.update_tempo(change.tempo.bpm())?;
                    tokio::time::sleep(duration - change.at).await;
                }
                _ => tokio::time::sleep(duration).await,
            }
            Ok::<_, anyhow::Error>(())
        };

        tokio::select! {
            result = session => result?,
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        }

        metronome.stop()?;
        // Let the printer drain the final events
        tokio::time::sleep(Duration::from_millis(50)).await;
        printer.abort();
        Ok::<_, anyhow::Error>(())
    })?;

    Ok(ExitCode::from(0))
}

fn run_render(
    config: &AppConfig,
    tempo: Tempo,
    seconds: f64,
    change: Option<TempoChange>,
    output: PathBuf,
) -> Result<ExitCode> {
    let sample_rate = config.audio.offline_sample_rate;
    let context = OfflineContext::with_config(sample_rate, &config.audio);
    let mut scheduler = LookaheadScheduler::new(config);
    let window_ms = scheduler.window_ms();
    let end_ms = seconds * 1000.0;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&output, spec)
        .with_context(|| format!("creating {}", output.display()))?;

    scheduler.start(&context, tempo)?;
    let mut pending_change = change;
    let mut next_pass_ms = window_ms;
    while context.current_time_ms() < end_ms {
        // A tempo change is only stored; the next pass applies it
        let mut target_ms = next_pass_ms.min(end_ms);
        if let Some(change) = pending_change {
            let at_ms = change.at.as_secs_f64() * 1000.0;
            if at_ms <= context.current_time_ms() {
                scheduler.update_tempo(change.tempo)?;
                pending_change = None;
                continue;
            }
            target_ms = target_ms.min(at_ms);
        }

        // At least one frame so the clock always advances
        let span_ms = (target_ms - context.current_time_ms()).max(context.clock().frame_to_ms(1));
        for sample in context.render_ms(span_ms)? {
            writer.write_sample(sample)?;
        }

        let now_ms = context.current_time_ms();
        if now_ms >= next_pass_ms && now_ms < end_ms {
            scheduler.run_pass(now_ms)?;
            next_pass_ms += window_ms;
        }
    }
    scheduler.stop();
    writer.finalize()?;

    println!(
        "Rendered {:.2}s at {} BPM to {}",
        seconds,
        tempo.bpm(),
        output.display()
    );
    Ok(ExitCode::from(0))
}
