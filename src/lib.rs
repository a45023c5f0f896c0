//! Import EP and ECG recordings into one canonical shape: a metadata record
//! plus a channels-by-samples `ndarray` matrix.
//!
//! Two export formats are supported:
//!
//! - **Workmate** text exports: a directory of per-session index files and
//!   per-page, per-signal sample files, see [`read_workmate_export`].
//! - **Eko Duo** zip exports: WAV-encoded ECG leads plus a phonocardiogram,
//!   see [`read_eko_duo_export`].
//!
//! The crate logs through the [`log`] facade and installs no logger itself.

mod eko_duo;
mod reader;
pub mod types;
mod workmate;

use std::path::Path;

// Re-export types
pub use eko_duo::{
    channel_label, decode_channel, partition, read_eko_duo_export, DecodedChannel, Partition,
};
pub use reader::parse_datetime;
pub use types::*;
pub use workmate::{
    assemble_session, build_catalog, discover_sessions, extract_info, read_session_header,
    read_workmate_export, CatalogEntry, SessionHeader,
};

/// Loads a recording, choosing the reader from the path.
///
/// Directories are read as Workmate exports, `.zip` files as Eko Duo exports.
/// `.xml` files are routed to [`read_xml_ecg`], which is not implemented.
///
/// # Examples
///
/// ```no_run
/// use ep_importer::{load, Recording};
///
/// match load("exports/workmate") {
///     Ok(Recording::Workmate(rec)) => println!("Patient: {}", rec.info.patient_id),
///     Ok(Recording::EkoDuo(rec)) => println!("ECG leads: {:?}", rec.info.signal_names),
///     Err(e) => println!("Error loading export: {}", e),
/// }
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<Recording> {
    let path = path.as_ref();

    if path.is_dir() {
        return read_workmate_export(path).map(Recording::Workmate);
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("zip") => read_eko_duo_export(path).map(Recording::EkoDuo),
        Some("xml") => read_xml_ecg(path).map(|never| match never {}),
        _ => Err(EpError::Format(format!(
            "{} is neither a Workmate export directory nor a .zip or .xml file",
            path.display()
        ))),
    }
}

/// XML ECG exports.
///
/// The XML variant has no defined layout yet, so this always fails with
/// [`EpError::NotImplemented`].
pub fn read_xml_ecg<P: AsRef<Path>>(_xml_file: P) -> Result<std::convert::Infallible> {
    Err(EpError::NotImplemented("XML ECG import"))
}
