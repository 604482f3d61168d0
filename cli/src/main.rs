use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tvo_core::audio::{i16_to_f64, resample_linear, to_mono};
use tvo_core::record::{write_csv, OptimumRecord, TrialRecord};
use tvo_core::stats::mean;
use tvo_core::{
    BandSet, CalibrationConfig, CalibrationController, CalibrationOutcome, Clip, DistortionScorer, NoIndicator,
    NotFoundReason, ScorerConfig, SimulatedChannel, XAxis, SAMPLE_RATE,
};

#[derive(Parser)]
#[command(name = "tvo")]
#[command(about = "Transmit volume optimization for speech links")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a received WAV against the transmitted clip
    Score {
        /// Transmitted clip
        #[arg(value_name = "TX.WAV")]
        tx: PathBuf,

        /// Received capture
        #[arg(value_name = "RX.WAV")]
        rx: PathBuf,

        #[command(flatten)]
        scorer: ScorerArgs,
    },

    /// Search for the transmit volume over a simulated channel
    Calibrate {
        /// Transmit clips, played in turn
        #[arg(value_name = "CLIP.WAV", required = true)]
        clips: Vec<PathBuf>,

        /// JSON file with "calibration" and "scorer" sections
        #[arg(short, long, value_name = "FILE.JSON")]
        config: Option<PathBuf>,

        /// Lower edge of the search interval (dB)
        #[arg(long, allow_hyphen_values = true)]
        lower: Option<f64>,

        /// Upper edge of the search interval (dB)
        #[arg(long, allow_hyphen_values = true)]
        upper: Option<f64>,

        /// Stop once the grid spacing falls below this (dB)
        #[arg(long)]
        tolerance: Option<f64>,

        /// Trials per volume
        #[arg(long)]
        trials: Option<usize>,

        /// Maximum number of volumes to visit
        #[arg(long)]
        max_volumes: Option<usize>,

        /// Standard deviation of the score dither
        #[arg(long)]
        dither: Option<f64>,

        /// Seed for dither, permutation test and channel noise
        #[arg(long)]
        seed: Option<u64>,

        /// Volume the audio device plays at; clips are scaled relative to it (dB)
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        device_volume: f64,

        /// Channel noise floor (dBFS); no noise when omitted
        #[arg(long, allow_hyphen_values = true)]
        noise_db: Option<f64>,

        /// Write the result record as CSV
        #[arg(short, long, value_name = "FILE.CSV")]
        output: Option<PathBuf>,

        /// Write the result record as JSON
        #[arg(long, value_name = "FILE.JSON")]
        json: Option<PathBuf>,

        #[command(flatten)]
        scorer: ScorerArgs,
    },

    /// List the frequency bands used for scoring
    Bands {
        /// Band set
        #[arg(long, value_enum, default_value = "ai")]
        bands: BandChoice,
    },
}

#[derive(clap::Args)]
struct ScorerArgs {
    /// X axis of the slope fit
    #[arg(long, value_enum)]
    x_axis: Option<AxisChoice>,

    /// Band set
    #[arg(long, value_enum)]
    bands: Option<BandChoice>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BandChoice {
    Ai,
    Mel,
}

impl BandChoice {
    fn band_set(self) -> BandSet {
        match self {
            BandChoice::Ai => BandSet::ai(),
            BandChoice::Mel => BandSet::mel(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AxisChoice {
    Index,
    LogFreq,
}

impl From<AxisChoice> for XAxis {
    fn from(choice: AxisChoice) -> Self {
        match choice {
            AxisChoice::Index => XAxis::BandIndex,
            AxisChoice::LogFreq => XAxis::LogCenterFrequency,
        }
    }
}

impl ScorerArgs {
    fn apply(&self, config: &mut ScorerConfig) {
        if let Some(axis) = self.x_axis {
            config.x_axis = axis.into();
        }
        if let Some(bands) = self.bands {
            config.bands = bands.band_set();
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("unsupported WAV format: {bits}-bit {format:?}")]
    UnsupportedFormat { bits: u16, format: hound::SampleFormat },

    #[error("failed to parse config {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    calibration: CalibrationConfig,
    scorer: ScorerConfig,
}

/// Simulated radio path settings
struct ChannelArgs {
    device_volume: f64,
    noise_db: Option<f64>,
}

/// JSON layout of the result record
#[derive(Serialize)]
struct ResultFile<'a> {
    optimal: OptimumRecord,
    measurement: &'a [TrialRecord],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Score { tx, rx, scorer } => score_command(&tx, &rx, &scorer)?,
        Commands::Calibrate {
            clips,
            config,
            lower,
            upper,
            tolerance,
            trials,
            max_volumes,
            dither,
            seed,
            device_volume,
            noise_db,
            output,
            json,
            scorer,
        } => {
            let mut file = match &config {
                Some(path) => load_config(path)?,
                None => ConfigFile::default(),
            };
            let calibration = &mut file.calibration;
            calibration.lower_db = lower.unwrap_or(calibration.lower_db);
            calibration.upper_db = upper.unwrap_or(calibration.upper_db);
            calibration.tolerance_db = tolerance.unwrap_or(calibration.tolerance_db);
            calibration.trials = trials.unwrap_or(calibration.trials);
            calibration.max_volumes = max_volumes.unwrap_or(calibration.max_volumes);
            calibration.dither_std = dither.unwrap_or(calibration.dither_std);
            calibration.seed = seed.or(calibration.seed);
            scorer.apply(&mut file.scorer);

            let channel = ChannelArgs {
                device_volume,
                noise_db,
            };
            calibrate_command(&clips, file, &channel, output.as_deref(), json.as_deref())?
        }
        Commands::Bands { bands } => bands_command(bands),
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let file = serde_json::from_str(&text).map_err(|source| CliError::ConfigFile {
        path: path.display().to_string(),
        source,
    })?;
    info!("Loaded configuration from {}", path.display());
    Ok(file)
}

/// Reads a WAV file as mono samples at the scoring rate.
fn read_wav(path: &Path) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let mut reader = hound::WavReader::new(file)?;

    let spec = reader.spec();
    println!(
        "Read WAV {}: {} Hz, {} channels, {} bits",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    // Handle both 16-bit PCM and 32-bit float
    let interleaved = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => {
            let int_samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
            i16_to_f64(&int_samples?)
        }
        (hound::SampleFormat::Float, 32) => {
            let float_samples: Result<Vec<f32>, _> = reader.samples::<f32>().collect();
            float_samples?.into_iter().map(|s| s as f64).collect()
        }
        (format, bits) => return Err(CliError::UnsupportedFormat { bits, format }.into()),
    };

    let mono = to_mono(&interleaved, spec.channels as usize)?;
    let target_rate = SAMPLE_RATE as u32;
    if spec.sample_rate != target_rate {
        info!("Resampling {} from {} Hz to {} Hz", path.display(), spec.sample_rate, target_rate);
    }
    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

fn score_command(tx_path: &Path, rx_path: &Path, args: &ScorerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let tx = read_wav(tx_path)?;
    let rx = read_wav(rx_path)?;

    let mut config = ScorerConfig::default();
    args.apply(&mut config);
    let scorer = DistortionScorer::new(&config)?;
    let report = scorer.evaluate(&tx, &rx, SAMPLE_RATE)?;

    println!("FSF score: {:.4}", report.score);
    println!(
        "Delay: {} samples ({:.2} ms mouth-to-ear)",
        report.delay_samples,
        report.latency_s * 1000.0
    );
    println!(
        "Slopes: tx {:.4} dB/band (pivot {}), rx {:.4} dB/band (pivot {})",
        report.tx_fit.slope, report.tx_fit.pivot_index, report.rx_fit.slope, report.rx_fit.pivot_index
    );
    for warning in &report.warnings {
        println!("Warning: {:?}", warning);
    }
    Ok(())
}

fn calibrate_command(
    clip_paths: &[PathBuf],
    file: ConfigFile,
    channel_args: &ChannelArgs,
    output: Option<&Path>,
    json: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut clips = Vec::with_capacity(clip_paths.len());
    for path in clip_paths {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        clips.push(Clip::new(name, read_wav(path)?));
    }

    let seed = file.calibration.seed;
    let scorer = DistortionScorer::new(&file.scorer)?;
    let mut channel =
        SimulatedChannel::new(clips, scorer, SAMPLE_RATE)?.with_device_volume(channel_args.device_volume);
    println!("Assuming device volume of {} dB", channel_args.device_volume);
    if let Some(seed) = seed {
        channel = channel.with_seed(seed.wrapping_add(2));
    }
    if let Some(floor) = channel_args.noise_db {
        channel = channel.with_noise_floor(floor)?;
    }

    let mut controller = CalibrationController::new(file.calibration)?;
    let report = controller.run(&mut channel, &mut NoIndicator)?;

    println!("Visited {} volume(s) in {} refinement round(s)", report.evaluations.len(), report.rounds);
    for evaluation in &report.evaluations {
        println!(
            "  {:>8.3} dB: {} sample(s), mean FSF {:.4}",
            evaluation.volume,
            evaluation.samples.len(),
            mean(&evaluation.samples)
        );
    }

    match &report.outcome {
        CalibrationOutcome::Found(point) => println!(
            "Optimum: {:.3} dB (interval {:.3} to {:.3} dB)",
            point.optimum, point.interval.lower, point.interval.upper
        ),
        CalibrationOutcome::NotFound(NotFoundReason::NoPlateau) => println!("No plateau found"),
        CalibrationOutcome::NotFound(NotFoundReason::BudgetExhausted { visited, interval }) => {
            println!("Volume budget exhausted after {} volume(s)", visited);
            if let Some(interval) = interval {
                println!("Best interval so far: {:.3} to {:.3} dB", interval.lower, interval.upper);
            }
        }
        CalibrationOutcome::NotFound(NotFoundReason::FixedVolumes) => {
            println!("Fixed volumes evaluated, no optimum searched")
        }
    }

    let optimum = report.optimum_record();
    if let Some(path) = output {
        let mut writer = BufWriter::new(File::create(path)?);
        write_csv(&mut writer, &optimum, &report.trials)?;
        writer.flush()?;
        println!("Wrote {} trial record(s) to {}", report.trials.len(), path.display());
    }
    if let Some(path) = json {
        let writer = BufWriter::new(File::create(path)?);
        let result = ResultFile {
            optimal: optimum,
            measurement: &report.trials,
        };
        serde_json::to_writer_pretty(writer, &result)?;
        println!("Wrote result record to {}", path.display());
    }

    Ok(())
}

fn bands_command(choice: BandChoice) {
    let bands = choice.band_set();
    println!("{} bands", bands.len());
    for (i, band) in bands.iter().enumerate() {
        println!(
            "{:>3}: {:>7.1} - {:>7.1} Hz (center {:.1} Hz)",
            i,
            band.low_hz,
            band.high_hz,
            band.center_hz()
        );
    }
}
