use chrono::NaiveDateTime;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use std::fs;
use std::path::Path;

use crate::types::*;

// Date and time as written by the EP system, e.g. "24/09/2024" and "08:59:25"
const DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Parses a `DD/MM/YYYY` date and `HH:MM:SS` time into a naive local instant.
///
/// No timezone is assumed.
pub fn parse_datetime(date: &str, time: &str) -> Result<NaiveDateTime> {
    let joined = format!("{} {}", date, time);
    NaiveDateTime::parse_from_str(&joined, DATETIME_FORMAT).map_err(|e| {
        EpError::Format(format!(
            "invalid date/time '{}' (expected DD/MM/YYYY HH:MM:SS): {}",
            joined, e
        ))
    })
}

/// Reads a text file that may not be valid UTF-8.
///
/// Vendor exports are not guaranteed to be UTF-8 (patient names in particular),
/// so invalid sequences are replaced instead of rejected.
pub fn read_text_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses whitespace-delimited numeric text into a 1-D array.
///
/// `path` is only used to label errors.
pub fn parse_numeric_text(text: &str, path: &Path) -> Result<Array1<f64>> {
    let mut samples = Vec::new();
    for (idx, token) in text.split_whitespace().enumerate() {
        let value = token.parse::<f64>().map_err(|_| EpError::Data {
            path: path.to_path_buf(),
            reason: format!("non-numeric token '{}' at position {}", token, idx),
        })?;
        samples.push(value);
    }
    Ok(Array1::from(samples))
}

/// Loads a numeric text file (no header, one channel) as a 1-D array.
pub fn load_numeric_text(path: &Path) -> Result<Array1<f64>> {
    let text = read_text_lossy(path).map_err(|e| EpError::Data {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_numeric_text(&text, path)
}

/// Stacks equal-length 1-D arrays as the rows of a matrix.
pub fn stack_rows(rows: &[Array1<f64>]) -> Result<Array2<f64>> {
    let num_samples = rows.first().map(|row| row.len()).unwrap_or(0);

    if let Some((idx, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != num_samples)
    {
        return Err(EpError::Shape(format!(
            "row {} has {} samples, expected {}",
            idx,
            row.len(),
            num_samples
        )));
    }

    let mut flat = Vec::with_capacity(rows.len() * num_samples);
    for row in rows {
        flat.extend(row.iter().copied());
    }

    Array2::from_shape_vec((rows.len(), num_samples), flat)
        .map_err(|e| EpError::Shape(e.to_string()))
}

/// Concatenates matrices along the sample (time) axis.
///
/// All matrices must have the same number of rows.
pub fn concat_sessions(sessions: &[Array2<f64>]) -> Result<Array2<f64>> {
    let first = sessions
        .first()
        .ok_or_else(|| EpError::Shape("no session data to combine".to_string()))?;

    for (idx, session) in sessions.iter().enumerate().skip(1) {
        if session.nrows() != first.nrows() {
            return Err(EpError::Shape(format!(
                "session {} has {} channels, session 0 has {}",
                idx,
                session.nrows(),
                first.nrows()
            )));
        }
    }

    let views: Vec<ArrayView2<f64>> = sessions.iter().map(|s| s.view()).collect();
    concatenate(Axis(1), &views).map_err(|e| EpError::Shape(e.to_string()))
}
