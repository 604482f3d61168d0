//! Result records of a calibration run
//!
//! One [`TrialRecord`] per scored trial plus one [`OptimumRecord`] per run.
//! The CSV layout puts the summary first:
//!
//! ```text
//! Optimum,Lower_Interval,Upper_Interval
//! -6.4,-12,-4.8
//!
//! Timestamp,Filename,Volume,FSF,m2e_latency,Channels
//! 14-Nov-2023 22:13:20,F1_clip,-12,1.004,0.0213,rx_voice
//! ```
//!
//! Volumes and interval edges are in dB, latency in seconds, timestamps in
//! local time.

use std::io::{self, Write};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::controller::CalibrationOutcome;

pub const OPTIMUM_FIELDS: [&str; 3] = ["Optimum", "Lower_Interval", "Upper_Interval"];
/// Local time, e.g. `14-Nov-2023 22:13:20`
pub const TIMESTAMP_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

pub const TRIAL_FIELDS: [&str; 6] = ["Timestamp", "Filename", "Volume", "FSF", "m2e_latency", "Channels"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Volume")]
    pub volume: f64,
    #[serde(rename = "FSF")]
    pub fsf: f64,
    #[serde(rename = "m2e_latency")]
    pub m2e_latency: f64,
    #[serde(rename = "Channels")]
    pub channels: String,
}

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

impl TrialRecord {
    pub fn csv_row(&self) -> String {
        [
            csv_field(&self.timestamp),
            csv_field(&self.filename),
            self.volume.to_string(),
            self.fsf.to_string(),
            self.m2e_latency.to_string(),
            csv_field(&self.channels),
        ]
        .join(",")
    }
}

/// Summary row; all values are NaN when no optimum was found.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimumRecord {
    #[serde(rename = "Optimum")]
    pub optimum: f64,
    #[serde(rename = "Lower_Interval")]
    pub lower: f64,
    #[serde(rename = "Upper_Interval")]
    pub upper: f64,
}

impl OptimumRecord {
    pub fn from_outcome(outcome: &CalibrationOutcome) -> Self {
        match outcome {
            CalibrationOutcome::Found(point) => Self {
                optimum: point.optimum,
                lower: point.interval.lower,
                upper: point.interval.upper,
            },
            CalibrationOutcome::NotFound(_) => Self {
                optimum: f64::NAN,
                lower: f64::NAN,
                upper: f64::NAN,
            },
        }
    }

    pub fn csv_row(&self) -> String {
        format!("{},{},{}", self.optimum, self.lower, self.upper)
    }
}

pub fn write_csv<W: Write>(writer: &mut W, optimum: &OptimumRecord, trials: &[TrialRecord]) -> io::Result<()> {
    writeln!(writer, "{}", OPTIMUM_FIELDS.join(","))?;
    writeln!(writer, "{}", optimum.csv_row())?;
    writeln!(writer)?;
    writeln!(writer, "{}", TRIAL_FIELDS.join(","))?;
    for trial in trials {
        writeln!(writer, "{}", trial.csv_row())?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
