//! Naptick wake-word - offline detector driver
//!
//! Feeds a raw PCM file (signed 16-bit little-endian, mono) through the
//! detector frame by frame and prints every detection.

use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use naptick_wakeword::model::loader::{ChainLoader, FsModelLoader};
use naptick_wakeword::model::runtime::default_backend;
use naptick_wakeword::{
    Detection, FrameAssembler, ManualClock, WakeWordConfig, WakeWordDetector, WakeWordError,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Samples handed to the framer per push, like a capture DMA buffer
const CAPTURE_CHUNK: usize = 512;

/// Frames the framer can hold before dropping samples
const FRAMER_CAPACITY: usize = 4;

struct Options {
    config: Option<PathBuf>,
    save_config: Option<PathBuf>,
    model: Option<String>,
    threshold: Option<f32>,
    test_mode: bool,
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("naptick_wakeword=info".parse()?)
                .add_directive("wakeword_core=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    let mut config = match &options.config {
        Some(path) => WakeWordConfig::load_from(path),
        None => WakeWordConfig::default(),
    };
    if let Some(model) = options.model {
        config.model_path = Some(model);
    }
    if let Some(threshold) = options.threshold {
        config.threshold = threshold;
    }
    if options.test_mode {
        config.test_mode = true;
    }
    config.validate().context("Invalid configuration")?;

    if let Some(path) = &options.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to save config to {}", path.display()))?;
        println!("Configuration saved to {}", path.display());
    }

    let Some(input) = options.input else {
        if options.save_config.is_none() {
            print_help();
        }
        return Ok(());
    };

    run(config, &input)
}

/// Parse command line arguments; `None` means nothing left to do
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options {
        config: None,
        save_config: None,
        model: None,
        threshold: None,
        test_mode: false,
        input: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!(
                    "naptick-wakeword {} (built {})",
                    naptick_wakeword::VERSION,
                    naptick_wakeword::BUILD_DATE
                );
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--test-mode" | "-t" => options.test_mode = true,
            "--config" | "-c" => {
                options.config = Some(PathBuf::from(value_of(args, i, "--config")?));
                i += 1;
            }
            "--save-config" => {
                options.save_config = Some(PathBuf::from(value_of(args, i, "--save-config")?));
                i += 1;
            }
            "--model" | "-m" => {
                options.model = Some(value_of(args, i, "--model")?.to_string());
                i += 1;
            }
            "--threshold" => {
                let raw = value_of(args, i, "--threshold")?;
                let threshold = raw
                    .parse()
                    .with_context(|| format!("Invalid threshold: {}", raw))?;
                options.threshold = Some(threshold);
                i += 1;
            }
            arg if arg.starts_with('-') => {
                print_help();
                bail!("Unknown argument: {}", arg);
            }
            path => options.input = Some(PathBuf::from(path)),
        }
        i += 1;
    }

    Ok(Some(options))
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    match args.get(i + 1) {
        Some(value) => Ok(value),
        None => bail!("{} requires a value", flag),
    }
}

fn print_help() {
    println!("Usage: naptick-wakeword [OPTIONS] <PCM_FILE>");
    println!();
    println!("Runs the wake-word detector over raw 16-bit little-endian mono PCM.");
    println!();
    println!("Options:");
    println!("  -c, --config PATH       Load detector configuration (JSON)");
    println!("      --save-config PATH  Write the effective configuration (JSON)");
    println!("  -m, --model PATH        Model file (.tflite)");
    println!("      --threshold VALUE   Detection threshold, 0.0 to 1.0");
    println!("  -t, --test-mode         Score frames by energy when no model is loaded");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  naptick-wakeword -m hey_naptick.tflite capture.raw");
    println!("  naptick-wakeword --test-mode --threshold 0.6 capture.raw");
}

fn read_pcm(path: &Path) -> Result<Vec<i16>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.len() % 2 != 0 {
        warn!(path = %path.display(), "Odd byte count, ignoring the last byte");
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn run(config: WakeWordConfig, input: &Path) -> Result<()> {
    let samples = read_pcm(input)?;
    let frame_ms = config.frame_size_ms as u64;
    info!(
        path = %input.display(),
        samples = samples.len(),
        sample_rate = config.sample_rate,
        "Processing PCM file"
    );

    let loader = ChainLoader::new().with(FsModelLoader::new());
    let backend = default_backend();
    let (sender, receiver) = crossbeam_channel::unbounded::<Detection>();
    // Cooldown runs on audio time; the file is read far faster than real time
    let clock = ManualClock::new();
    let mut detector =
        WakeWordDetector::load_with_clock(config, &loader, backend.as_ref(), sender, clock.clone())
            .context("Failed to create detector")?;

    let frame_samples = detector.input_requirements();
    let mut framer = FrameAssembler::new(frame_samples, FRAMER_CAPACITY)?;
    let mut frame = vec![0i16; frame_samples];
    let mut frame_index: u64 = 0;
    let mut not_ready: u64 = 0;

    for chunk in samples.chunks(CAPTURE_CHUNK) {
        framer.push(chunk);
        while framer.next_frame(&mut frame) {
            match detector.process_audio(&frame) {
                Ok(()) => {}
                Err(WakeWordError::NotReady) => not_ready += 1,
                Err(e) if e.is_recoverable() => warn!(frame = frame_index, error = %e, "Frame failed"),
                Err(e) => return Err(e).context("Detector failed"),
            }
            print_detections(&receiver, frame_index * frame_ms);
            clock.advance(Duration::from_millis(frame_ms));
            frame_index += 1;
        }
    }

    if framer.available() > 0 {
        info!(samples = framer.available(), "Ignoring trailing partial frame");
    }

    println!();
    println!("Processed {} frames ({} ms)", frame_index, frame_index * frame_ms);
    if not_ready > 0 {
        println!(
            "{} frames skipped: no model loaded (use --model or --test-mode)",
            not_ready
        );
    }
    println!("{}", detector.stats());

    Ok(())
}

fn print_detections(receiver: &Receiver<Detection>, offset_ms: u64) {
    for detection in receiver.try_iter() {
        println!(
            "[{:>8.3}s] {} detected (confidence {:.3})",
            offset_ms as f64 / 1000.0,
            detection.label,
            detection.confidence
        );
    }
}
