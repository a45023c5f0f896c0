//! Workmate EP system text exports.
//!
//! An export is a flat directory. Each recording session has an index file
//! (`*Information*.TXT`) whose first six lines are a `key=value` header and
//! whose remaining lines list per-page, per-signal data files
//! (`<signal>.<page>`, first comma-separated field). Each data file holds
//! whitespace-delimited samples for one signal.

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::reader::{
    concat_sessions, load_numeric_text, parse_datetime, read_text_lossy, stack_rows,
};
use crate::types::*;

const SESSION_FILE_MARKER: &str = "Information";
const SESSION_FILE_EXTENSION: &str = ".TXT";

// Header layout: fixed line positions, keys are not checked
const HEADER_LINES: usize = 6;
const HEADER_FIELDS: [&str; HEADER_LINES] = [
    "name",
    "id",
    "date",
    "time",
    "sample_rate",
    "signal_resolution",
];
const NAME_LINE: usize = 0;
const ID_LINE: usize = 1;
const DATE_LINE: usize = 2;
const TIME_LINE: usize = 3;
const SAMPLE_RATE_LINE: usize = 4;
const RESOLUTION_LINE: usize = 5;

/// The six header values of one session index file.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHeader {
    pub name: String,
    pub id: String,
    pub date: String,
    pub time: String,
    pub sample_rate: String,
    pub signal_resolution: String,
}

/// One catalog row: a signal name and the data file that represents it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub signal_name: String,
    pub file_name: String,
}

/// Reads a Workmate export directory into one continuous recording.
///
/// Sessions are discovered in `folder`, ordered by file name and concatenated
/// along the time axis. Channel names and order come from the first session;
/// every later session must list the same signals in the same order.
pub fn read_workmate_export<P: AsRef<Path>>(folder: P) -> Result<WorkmateRecording> {
    let tic = Instant::now();
    let folder = folder.as_ref();

    let session_files = discover_sessions(folder)?;
    debug!(
        "Found {} session(s) in {}",
        session_files.len(),
        folder.display()
    );

    let mut recording_info = extract_info(&session_files)?;
    let first_catalog = build_catalog(&session_files[0])?;
    recording_info.signal_names = signal_names(&first_catalog);

    let mut sessions: Vec<Array2<f64>> = Vec::with_capacity(session_files.len());
    for (i, session_file) in session_files.iter().enumerate() {
        debug!(
            "Loading session {}/{}: {}",
            i + 1,
            session_files.len(),
            session_file.display()
        );

        let catalog = if i == 0 {
            first_catalog.clone()
        } else {
            build_catalog(session_file)?
        };
        verify_catalog_compatibility(&recording_info.signal_names, &catalog, session_file)?;

        sessions.push(assemble_session(folder, &catalog)?);
    }

    let data = concat_sessions(&sessions)?;

    info!(
        "Loaded Workmate export {}: {} channels x {} samples from {} session(s) in {:.1} s",
        folder.display(),
        data.nrows(),
        data.ncols(),
        session_files.len(),
        tic.elapsed().as_secs_f64()
    );

    Ok(WorkmateRecording {
        info: recording_info,
        data,
        source_files: session_files,
    })
}

/// Lists the session index files in `folder`, sorted by file name.
///
/// A session index file contains `Information` in its name and ends in `.TXT`
/// (case-sensitive). Subdirectories are not searched.
pub fn discover_sessions(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(folder).map_err(|e| {
        EpError::Discovery(format!("cannot read directory {}: {}", folder.display(), e))
    })?;

    let mut session_files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if is_session_file_name(file_name) {
            session_files.push(entry.path());
        }
    }

    if session_files.is_empty() {
        return Err(EpError::Discovery(format!(
            "no *{}*{} session files in {}",
            SESSION_FILE_MARKER,
            SESSION_FILE_EXTENSION,
            folder.display()
        )));
    }

    session_files.sort();
    Ok(session_files)
}

fn is_session_file_name(file_name: &str) -> bool {
    // The extension must follow the marker, as in `*Information*.TXT`
    file_name
        .strip_suffix(SESSION_FILE_EXTENSION)
        .is_some_and(|stem| stem.contains(SESSION_FILE_MARKER))
}

/// Combines the headers of the first and last sessions into recording metadata.
///
/// `session_files` must be sorted in session order. `signal_names` is left
/// empty; the caller fills it from the first session's catalog.
pub fn extract_info(session_files: &[PathBuf]) -> Result<WorkmateInfo> {
    let (first_file, last_file) = match (session_files.first(), session_files.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(EpError::Discovery(
                "no session files to read metadata from".to_string(),
            ))
        }
    };

    let first = read_session_header(first_file)?;
    let recording_start = parse_datetime(&first.date, &first.time)?;

    let recording_end = if last_file == first_file {
        recording_start
    } else {
        // Start of the last session; the export carries no duration
        read_session_start(last_file)?
    };

    Ok(WorkmateInfo {
        patient_name: first.name,
        patient_id: first.id,
        recording_start,
        recording_end,
        sample_rate: first.sample_rate,
        signal_resolution: first.signal_resolution,
        signal_names: Vec::new(),
    })
}

/// Reads the 6-line `key=value` header of a session index file.
pub fn read_session_header(session_file: &Path) -> Result<SessionHeader> {
    let text = read_text_lossy(session_file)?;
    parse_session_header(&text).map_err(|e| annotate_format_error(e, session_file))
}

fn parse_session_header(text: &str) -> Result<SessionHeader> {
    let lines = header_lines(text)?;
    let value = |idx: usize| header_value(&lines, idx);

    Ok(SessionHeader {
        name: value(NAME_LINE)?,
        id: value(ID_LINE)?,
        date: value(DATE_LINE)?,
        time: value(TIME_LINE)?,
        sample_rate: value(SAMPLE_RATE_LINE)?,
        signal_resolution: value(RESOLUTION_LINE)?,
    })
}

/// Reads only the date and time lines of a session header.
///
/// Used for the last session, whose other header values are not needed.
fn read_session_start(session_file: &Path) -> Result<NaiveDateTime> {
    let text = read_text_lossy(session_file)?;
    parse_session_start(&text).map_err(|e| annotate_format_error(e, session_file))
}

fn parse_session_start(text: &str) -> Result<NaiveDateTime> {
    let lines = header_lines(text)?;
    parse_datetime(
        &header_value(&lines, DATE_LINE)?,
        &header_value(&lines, TIME_LINE)?,
    )
}

fn header_lines(text: &str) -> Result<Vec<&str>> {
    let lines: Vec<&str> = text.lines().take(HEADER_LINES).collect();
    if lines.len() < HEADER_LINES {
        return Err(EpError::Format(format!(
            "header has {} line(s), expected {}",
            lines.len(),
            HEADER_LINES
        )));
    }
    Ok(lines)
}

fn header_value(lines: &[&str], idx: usize) -> Result<String> {
    let line = lines[idx];
    line.split_once('=')
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| {
            EpError::Format(format!(
                "header line {} ({}) has no '=' separator: '{}'",
                idx + 1,
                HEADER_FIELDS[idx],
                line
            ))
        })
}

fn annotate_format_error(err: EpError, path: &Path) -> EpError {
    match err {
        EpError::Format(msg) => EpError::Format(format!("{}: {}", path.display(), msg)),
        other => other,
    }
}

/// Builds the ordered, de-duplicated signal catalog of one session.
///
/// Each data row's file name `<signal>.<page>` yields signal name `<signal>`.
/// Only the first file seen for each signal is kept, so a signal spread over
/// several pages is represented by its first-listed page.
pub fn build_catalog(session_file: &Path) -> Result<Vec<CatalogEntry>> {
    let text = read_text_lossy(session_file)?;
    let catalog = parse_catalog(&text);
    if catalog.is_empty() {
        return Err(EpError::Format(format!(
            "{}: session index lists no signal files",
            session_file.display()
        )));
    }
    Ok(catalog)
}

fn parse_catalog(text: &str) -> Vec<CatalogEntry> {
    let mut catalog: Vec<CatalogEntry> = Vec::new();

    for (idx, line) in text.lines().enumerate().skip(HEADER_LINES) {
        let file_name = line.split(',').next().unwrap_or("").trim();
        if file_name.is_empty() {
            warn!("Skipping blank catalog row at line {}", idx + 1);
            continue;
        }

        let signal_name = file_name.split('.').next().unwrap_or(file_name);
        if catalog.iter().any(|entry| entry.signal_name == signal_name) {
            continue;
        }

        catalog.push(CatalogEntry {
            signal_name: signal_name.to_string(),
            file_name: file_name.to_string(),
        });
    }

    catalog
}

/// Signal names of a catalog, in catalog order
pub fn signal_names(catalog: &[CatalogEntry]) -> Vec<String> {
    catalog
        .iter()
        .map(|entry| entry.signal_name.clone())
        .collect()
}

/// Loads every catalog entry's data file from `folder` and stacks them as rows.
pub fn assemble_session(folder: &Path, catalog: &[CatalogEntry]) -> Result<Array2<f64>> {
    let mut rows: Vec<Array1<f64>> = Vec::with_capacity(catalog.len());
    for entry in catalog {
        let path = folder.join(&entry.file_name);
        rows.push(load_numeric_text(&path)?);
    }
    stack_rows(&rows)
}

fn verify_catalog_compatibility(
    expected: &[String],
    catalog: &[CatalogEntry],
    session_file: &Path,
) -> Result<()> {
    if catalog.len() != expected.len() {
        return Err(EpError::Shape(format!(
            "{} lists {} signals, first session lists {}",
            session_file.display(),
            catalog.len(),
            expected.len()
        )));
    }

    for (i, (entry, name)) in catalog.iter().zip(expected).enumerate() {
        if &entry.signal_name != name {
            return Err(EpError::Shape(format!(
                "{} signal {} is '{}', first session has '{}'",
                session_file.display(),
                i,
                entry.signal_name,
                name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Name=Doe^Jane\nID=J-740979\nDate=24/09/2024\nTime=08:59:25\nSampleRate=2000\nResolution=0.01\n";

    #[test]
    fn matches_session_file_names() {
        assert!(is_session_file_name("Session_Information_001.TXT"));
        assert!(is_session_file_name("Information.TXT"));
        assert!(!is_session_file_name("Session_Information_001.txt"));
        assert!(!is_session_file_name("Session_001.TXT"));
        assert!(!is_session_file_name("I.TXT.Information"));
    }

    #[test]
    fn parses_positional_header() {
        let header = parse_session_header(HEADER).unwrap();
        assert_eq!(header.name, "Doe^Jane");
        assert_eq!(header.id, "J-740979");
        assert_eq!(header.date, "24/09/2024");
        assert_eq!(header.time, "08:59:25");
        assert_eq!(header.sample_rate, "2000");
        assert_eq!(header.signal_resolution, "0.01");
    }

    #[test]
    fn header_with_crlf_line_endings() {
        let header = parse_session_header(&HEADER.replace('\n', "\r\n")).unwrap();
        assert_eq!(header.id, "J-740979");
        assert_eq!(header.signal_resolution, "0.01");
    }

    #[test]
    fn short_header_is_a_format_error() {
        let err = parse_session_header("Name=A\nID=B\nDate=24/09/2024\n").unwrap_err();
        assert!(matches!(err, EpError::Format(msg) if msg.contains("3 line")));
    }

    #[test]
    fn header_line_without_separator_is_a_format_error() {
        let text = HEADER.replace("SampleRate=2000", "SampleRate 2000");
        let err = parse_session_header(&text).unwrap_err();
        assert!(matches!(err, EpError::Format(msg) if msg.contains("sample_rate")));
    }

    #[test]
    fn session_start_ignores_other_header_lines() {
        let text = HEADER.replace("SampleRate=2000", "garbled").replace("Name=Doe^Jane", "");
        let start = parse_session_start(&text).unwrap();
        assert_eq!(start.to_string(), "2024-09-24 08:59:25");
        assert!(matches!(
            parse_session_start("Name=A\nID=B\n"),
            Err(EpError::Format(_))
        ));
    }

    #[test]
    fn catalog_keeps_first_file_per_signal_in_order() {
        let text = format!(
            "{}II.001,0,120000\nI.001,0,120000\nII.002,120000,240000\nV1.001,0,120000\nI.002,120000,240000\n",
            HEADER
        );
        let catalog = parse_catalog(&text);
        assert_eq!(signal_names(&catalog), vec!["II", "I", "V1"]);
        assert_eq!(catalog[0].file_name, "II.001");
        assert_eq!(catalog[1].file_name, "I.001");
        assert_eq!(parse_catalog(&text), catalog);
    }

    #[test]
    fn catalog_skips_blank_rows() {
        let text = format!("{}I.001\n\nII.001\n", HEADER);
        assert_eq!(signal_names(&parse_catalog(&text)), vec!["I", "II"]);
    }

    #[test]
    fn header_only_index_has_empty_catalog() {
        assert!(parse_catalog(HEADER).is_empty());
    }

    #[test]
    fn mismatched_session_signals_are_rejected() {
        let expected = vec!["I".to_string(), "II".to_string()];
        let swapped = vec![
            CatalogEntry { signal_name: "II".into(), file_name: "II.003".into() },
            CatalogEntry { signal_name: "I".into(), file_name: "I.003".into() },
        ];
        assert!(matches!(
            verify_catalog_compatibility(&expected, &swapped, Path::new("s2")),
            Err(EpError::Shape(_))
        ));
        assert!(matches!(
            verify_catalog_compatibility(&expected, &swapped[..1], Path::new("s2")),
            Err(EpError::Shape(_))
        ));
    }
}
