use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Metadata for a Workmate text export.
///
/// Built from the 6-line header of the first and last session index files.
/// Values the vendor writes as free text (sample rate, resolution) are kept
/// verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct WorkmateInfo {
    /// Patient name as written in the header
    pub patient_name: String,
    /// Patient identifier (e.g. "J-740979")
    pub patient_id: String,
    /// Start of the first session
    pub recording_start: NaiveDateTime,
    /// Start of the *last* session.
    ///
    /// The export carries no session duration, so this is not the true end
    /// of the recorded data. For a single-session export it equals
    /// `recording_start`.
    pub recording_end: NaiveDateTime,
    /// Sample rate string, unparsed
    pub sample_rate: String,
    /// Signal resolution string, unparsed
    pub signal_resolution: String,
    /// Channel names in order of first appearance in the first session
    pub signal_names: Vec<String>,
}

impl WorkmateInfo {
    /// Best-effort numeric reading of the verbatim sample rate.
    ///
    /// Takes the leading numeric part of the string ("2000", "2000 Hz",
    /// "1000.0Hz"). Returns `None` if the string does not start with a number.
    pub fn sample_rate_hz(&self) -> Option<f64> {
        let trimmed = self.sample_rate.trim();
        let end = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        trimmed[..end].parse::<f64>().ok().filter(|rate| *rate > 0.0)
    }
}

/// Metadata for an Eko Duo archive export.
#[derive(Debug, Clone, Serialize)]
pub struct EkoDuoInfo {
    /// ECG channel labels recovered from member file names, in archive order
    pub signal_names: Vec<String>,
    /// Shared sample rate of the ECG channels (Hz)
    pub sample_rate: u32,
    /// Sample rate of the phonocardiogram channel (Hz)
    pub phonocardiogram_sample_rate: u32,
}

/// A Workmate export reassembled into one continuous recording.
///
/// `data` has shape `[signal_names.len(), total_samples]`, sessions
/// concatenated along the time axis in sorted session order.
#[derive(Debug, Clone, Serialize)]
pub struct WorkmateRecording {
    /// Recording-level metadata
    pub info: WorkmateInfo,
    /// Samples, one row per signal
    pub data: Array2<f64>,
    /// Session index files the recording was built from, in session order
    pub source_files: Vec<PathBuf>,
}

impl WorkmateRecording {
    /// Splits the recording into the canonical `(info, matrix)` pair.
    pub fn into_parts(self) -> (WorkmateInfo, Array2<f64>) {
        (self.info, self.data)
    }

    /// Returns the number of channels (matrix rows).
    ///
    /// Always equals `info.signal_names.len()`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ep_importer::read_workmate_export;
    ///
    /// let rec = read_workmate_export("path/to/workmate_export").unwrap();
    /// println!("Channels: {}", rec.num_channels());
    /// ```
    pub fn num_channels(&self) -> usize {
        self.data.nrows()
    }

    /// Returns the number of samples per channel, summed over all sessions.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ep_importer::read_workmate_export;
    ///
    /// let rec = read_workmate_export("path/to/workmate_export").unwrap();
    /// println!("Number of samples: {}", rec.num_samples());
    /// ```
    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Duration in seconds, if the header sample rate is numeric.
    pub fn duration(&self) -> Option<f64> {
        self.info
            .sample_rate_hz()
            .map(|rate| self.num_samples() as f64 / rate)
    }

    /// Returns the row for the named signal.
    pub fn channel(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        channel_row(&self.data, &self.info.signal_names, name)
    }
}

/// An Eko Duo export: ECG matrix plus the phonocardiogram.
#[derive(Debug, Clone, Serialize)]
pub struct EkoDuoRecording {
    /// Recording-level metadata
    pub info: EkoDuoInfo,
    /// ECG samples, one row per ECG member
    pub ecg_data: Array2<f64>,
    /// Phonocardiogram samples
    pub phonocardiogram: Array1<f64>,
}

impl EkoDuoRecording {
    /// Splits the recording into the canonical `(info, ecg, phonocardiogram)` triple.
    pub fn into_parts(self) -> (EkoDuoInfo, Array2<f64>, Array1<f64>) {
        (self.info, self.ecg_data, self.phonocardiogram)
    }

    /// Returns the number of ECG channels.
    pub fn num_channels(&self) -> usize {
        self.ecg_data.nrows()
    }

    /// Returns the number of samples per ECG channel.
    ///
    /// The phonocardiogram length is `phonocardiogram.len()`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ep_importer::read_eko_duo_export;
    ///
    /// let rec = read_eko_duo_export("path/to/eko_duo.zip").unwrap();
    /// println!("ECG samples: {}", rec.num_samples());
    /// ```
    pub fn num_samples(&self) -> usize {
        self.ecg_data.ncols()
    }

    /// ECG duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.info.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.info.sample_rate as f64
    }

    /// Phonocardiogram duration in seconds.
    pub fn phonocardiogram_duration(&self) -> f64 {
        if self.info.phonocardiogram_sample_rate == 0 {
            return 0.0;
        }
        self.phonocardiogram.len() as f64 / self.info.phonocardiogram_sample_rate as f64
    }

    /// Returns the ECG row for the named channel.
    pub fn channel(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        channel_row(&self.ecg_data, &self.info.signal_names, name)
    }
}

/// Any recording `load` can produce.
#[derive(Debug, Clone, Serialize)]
pub enum Recording {
    Workmate(WorkmateRecording),
    EkoDuo(EkoDuoRecording),
}

impl Recording {
    /// Channel names of the primary matrix
    pub fn signal_names(&self) -> &[String] {
        match self {
            Recording::Workmate(rec) => &rec.info.signal_names,
            Recording::EkoDuo(rec) => &rec.info.signal_names,
        }
    }

    /// The primary channels-by-samples matrix
    pub fn data(&self) -> &Array2<f64> {
        match self {
            Recording::Workmate(rec) => &rec.data,
            Recording::EkoDuo(rec) => &rec.ecg_data,
        }
    }
}

fn channel_row<'a>(
    data: &'a Array2<f64>,
    names: &[String],
    name: &str,
) -> Result<ArrayView1<'a, f64>> {
    names
        .iter()
        .position(|n| n == name)
        .map(|idx| data.row(idx))
        .ok_or_else(|| EpError::ChannelNotFound(name.to_string()))
}

/// Errors raised while importing an export.
///
/// Every reader fails fast: the first error is returned and no partial
/// recording is produced.
#[derive(Debug, Error)]
pub enum EpError {
    /// A header, file name or member layout violates the fixed positional format
    #[error("format error: {0}")]
    Format(String),
    /// Expected files were not found
    #[error("discovery error: {0}")]
    Discovery(String),
    /// A referenced data file is missing, unreadable or non-numeric
    #[error("data error in {}: {reason}", .path.display())]
    Data { path: PathBuf, reason: String },
    /// Channel counts, channel names, sample counts or rates disagree
    #[error("shape error: {0}")]
    Shape(String),
    /// An embedded audio member could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested format variant is not supported
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    /// A requested channel was not found
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    /// The archive container could not be read
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// An I/O error occurred while reading a header or archive
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EpError>;
