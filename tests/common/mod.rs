#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Writes a session index file: 6 header lines, then one row per data file.
pub fn write_session(
    dir: &Path,
    file_name: &str,
    id: &str,
    date: &str,
    time: &str,
    data_files: &[&str],
) -> PathBuf {
    let mut text = format!(
        "Name=Doe^Jane\nID={}\nDate={}\nTime={}\nSample Rate=2000\nResolution=0.01 mV\n",
        id, date, time
    );
    for name in data_files {
        text.push_str(&format!("{},0,1,Page\n", name));
    }
    let path = dir.join(file_name);
    fs::write(&path, text).unwrap();
    path
}

/// Writes a per-signal data file holding `samples`, one value per line.
pub fn write_samples(dir: &Path, file_name: &str, samples: &[f64]) {
    let text: String = samples.iter().map(|s| format!("{}\n", s)).collect();
    fs::write(dir.join(file_name), text).unwrap();
}

/// Samples whose value encodes signal and session, so ordering is checkable.
pub fn tagged_samples(signal: usize, session: usize, len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| (signal * 100_000 + session * 10_000 + i) as f64)
        .collect()
}

pub fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Writes a zip archive with the members in the given order.
pub fn write_archive(path: &Path, members: &[(&str, Vec<u8>)]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, bytes) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

pub fn ecg_member(label: &str) -> String {
    format!("eko_duo_2024_09_24_08_59_{}.wav", label)
}
