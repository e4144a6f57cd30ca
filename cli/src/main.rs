use clap::{Args, Parser, Subcommand, ValueEnum};
use hound::{SampleFormat, WavSpec};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use chimeshare_core::resample::{conform, downmix};
use chimeshare_core::{
    build_plan, BufferSink, ChannelSink, ChannelSource, ChimeError, Listener, MemorySource, Progress,
    ReceiverConfig, SamplingStrategy, ShareCode, ToneEvent, Transmitter, FFT_SIZE, NOISE_GATE,
    SAMPLE_RATE, TOLERANCE,
};
use tokio::{signal, task, time};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Unsupported WAV format: {bits}-bit {format:?}")]
    UnsupportedFormat { bits: u16, format: SampleFormat },

    #[error("No share code heard before the audio ended")]
    NoCodeHeard,

    #[error("Interrupted")]
    Interrupted,
}

#[derive(Parser)]
#[command(name = "chimeshare")]
#[command(about = "Send and receive DS- share codes as audible tone sequences")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tone sequence for a share code
    Plan {
        /// Share code, e.g. DS-3F9KQ2
        #[arg(value_name = "CODE")]
        code: String,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a share code to a WAV audio file
    Encode {
        /// Share code, e.g. DS-3F9KQ2
        #[arg(value_name = "CODE")]
        code: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Output sample rate in Hz
        #[arg(short = 'r', long, default_value_t = SAMPLE_RATE)]
        sample_rate: u32,

        /// Silence added before and after the chime, in milliseconds
        #[arg(long, default_value = "500")]
        padding_ms: u32,
    },

    /// Listen to a WAV audio file and print the share code it carries
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        #[command(flatten)]
        listen: ListenArgs,
    },

    /// Transmit a code and decode it concurrently, in process
    Loopback {
        /// Share code, e.g. DS-3F9KQ2
        #[arg(value_name = "CODE")]
        code: String,

        /// Pace the transmitter at playback speed instead of rendering ahead
        #[arg(long)]
        realtime: bool,

        #[command(flatten)]
        listen: ListenArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct ListenArgs {
    /// Milliseconds of new audio per analysis frame
    #[arg(long, default_value = "10")]
    hop_ms: u32,

    /// Give up if no start marker is heard within this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// How symbols are sampled from the tone stream
    #[arg(long, value_enum, default_value_t = Sampling::Dedup)]
    sampling: Sampling,

    /// Peaks at or below this strength (0-255) count as silence
    #[arg(long, default_value_t = NOISE_GATE)]
    noise_gate: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Sampling {
    /// Accept a symbol when it differs from the last one (default)
    Dedup,
    /// Accept one symbol per fixed time slot; decodes repeated symbols
    Slot,
}

impl ListenArgs {
    fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            tolerance_hz: TOLERANCE,
            noise_gate: self.noise_gate,
            sampling: match self.sampling {
                Sampling::Dedup => SamplingStrategy::Deduplicate,
                Sampling::Slot => SamplingStrategy::SlotTimed,
            },
            start_timeout: self.timeout.map(Duration::from_secs),
        }
    }

    fn hop_samples(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.hop_ms as u64) / 1000).max(1) as usize
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.downcast_ref::<ChimeError>().is_some_and(ChimeError::is_retryable) {
                eprintln!("Play the chime again and retry.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Plan { code, json } => plan_command(&code, json)?,
        Commands::Encode {
            code,
            output,
            sample_rate,
            padding_ms,
        } => encode_command(&code, &output, sample_rate, padding_ms)?,
        Commands::Decode { input, listen } => decode_command(&input, &listen)?,
        Commands::Loopback {
            code,
            realtime,
            listen,
        } => loopback_command(&code, realtime, &listen).await?,
    }

    Ok(())
}

fn plan_command(code: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let plan = build_plan(code)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{}", plan.code);
    for event in &plan.events {
        match event {
            ToneEvent::Tone {
                frequency_hz,
                duration_ms,
            } => println!("  tone {:>7.1} Hz {:>4} ms", frequency_hz, duration_ms),
            ToneEvent::Gap { duration_ms } => println!("  gap  {:>10} {:>4} ms", "", duration_ms),
        }
    }
    println!("total {} ms", plan.duration_ms());
    Ok(())
}

fn encode_command(
    code: &str,
    output_path: &Path,
    sample_rate: u32,
    padding_ms: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = build_plan(code)?;

    let mut sink = BufferSink::new(sample_rate);
    Transmitter::new().play(&plan, &mut sink)?;
    let padding = vec![0.0f32; (sample_rate as u64 * padding_ms as u64 / 1000) as usize];
    tracing::info!(
        "Rendered {} as {} samples at {} Hz",
        plan.code,
        sink.samples().len(),
        sample_rate
    );

    // Write WAV file (16-bit PCM)
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let file = File::create(output_path)?;
    let mut writer = hound::WavWriter::new(file, spec)?;

    for &sample in padding.iter().chain(sink.samples()).chain(padding.iter()) {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()?;

    println!("Wrote {} to {}", plan.code, output_path.display());
    Ok(())
}

/// Read a WAV file as mono f32 samples
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let mut reader = hound::WavReader::new(file)?;

    let spec = reader.spec();
    tracing::info!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (format, bits) => return Err(CliError::UnsupportedFormat { bits, format }.into()),
    };

    let mono = downmix(&interleaved, spec.channels as usize)?;
    Ok(conform(mono, spec.sample_rate)?)
}

fn decode_command(input_path: &Path, listen: &ListenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (samples, sample_rate) = read_wav(input_path)?;
    tracing::debug!("Analyzing {} samples at {} Hz", samples.len(), sample_rate);

    let source = MemorySource::new(&samples, sample_rate, FFT_SIZE, listen.hop_samples(sample_rate));
    let mut listener = Listener::new(listen.receiver_config());
    listener.start_listening(source)?;

    let code = loop {
        match listener.poll_available()? {
            Progress::Decoded(code) => break code,
            Progress::SourceEnded => {
                tracing::warn!("Audio ended at {}", listener.partial());
                return Err(CliError::NoCodeHeard.into());
            }
            Progress::Inactive => return Err(CliError::Interrupted.into()),
            Progress::Waiting | Progress::Listening(_) => continue,
        }
    };

    println!("{}", code);
    Ok(())
}

async fn loopback_command(
    code: &str,
    realtime: bool,
    listen: &ListenArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = build_plan(code)?;
    let (sender, receiver) = mpsc::channel();

    let mut transmitter = Transmitter::new();
    let transmit_cancel = transmitter.cancel_token();
    let transmit = task::spawn_blocking(move || {
        let mut sink = ChannelSink::new(SAMPLE_RATE, sender).with_pacing(realtime);
        transmitter.play(&plan, &mut sink)
    });

    let mut listener = Listener::new(listen.receiver_config());
    let source = ChannelSource::new(receiver, SAMPLE_RATE, FFT_SIZE, listen.hop_samples(SAMPLE_RATE));
    let listen_cancel = listener.start_listening(source)?;

    let period = if realtime { listen.hop_ms.max(1) } else { 1 };
    let mut ticker = time::interval(Duration::from_millis(period as u64));
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                tracing::warn!("Interrupted, stopping transmitter and listener");
                interrupted = true;
                transmit_cancel.cancel();
                listen_cancel.cancel();
            }
            _ = ticker.tick() => {}
        }

        match listener.poll_available() {
            Ok(Progress::Waiting) | Ok(Progress::Listening(_)) => continue,
            other => break other,
        }
    };

    let playback = transmit.await?;

    let code: ShareCode = match outcome? {
        Progress::Decoded(code) => code,
        Progress::Inactive => return Err(CliError::Interrupted.into()),
        _ => return Err(CliError::NoCodeHeard.into()),
    };
    tracing::info!("Transmitter finished: {:?}", playback?);

    println!("{}", code);
    Ok(())
}
