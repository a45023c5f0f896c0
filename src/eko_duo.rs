//! Eko Duo zip exports.
//!
//! The archive holds WAV members: several ECG leads, tagged with `ECG` in
//! their names, and exactly one phonocardiogram. Archive order of the ECG
//! members is channel order.

use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use std::time::Instant;
use zip::ZipArchive;

use crate::reader::stack_rows;
use crate::types::*;

const ECG_TAG: &str = "ECG";
// Member names look like `<7 vendor segments>_<channel label>.wav`
const LABEL_SEGMENT_OFFSET: usize = 7;
// Upper bound on pre-allocation; the declared member size is not trusted
const MAX_PREALLOC_BYTES: u64 = 64 * 1024 * 1024;

/// ECG members and the phonocardiogram member of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// ECG member names, in archive order
    pub ecg_members: Vec<String>,
    /// The single non-ECG member
    pub phono_member: String,
}

/// One decoded audio member.
#[derive(Debug, Clone)]
pub struct DecodedChannel {
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Samples; integer PCM is kept unscaled
    pub samples: Array1<f64>,
}

/// Reads an Eko Duo export archive.
///
/// All ECG members must share one sample rate and one sample count.
pub fn read_eko_duo_export<P: AsRef<Path>>(archive_path: P) -> Result<EkoDuoRecording> {
    let tic = Instant::now();
    let archive_path = archive_path.as_ref();

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let member_names = list_members(&mut archive)?;
    let partition = partition(&member_names)?;
    debug!(
        "Partitioned {}: {} ECG member(s), phonocardiogram '{}'",
        archive_path.display(),
        partition.ecg_members.len(),
        partition.phono_member
    );

    let mut sample_rate: Option<u32> = None;
    let mut rows: Vec<Array1<f64>> = Vec::with_capacity(partition.ecg_members.len());
    for member in &partition.ecg_members {
        debug!("Decoding ECG member {}", member);
        let channel = decode_channel(&read_member(&mut archive, member)?)
            .map_err(|e| annotate_decode_error(e, member))?;

        match sample_rate {
            None => sample_rate = Some(channel.sample_rate),
            Some(rate) if rate != channel.sample_rate => {
                return Err(EpError::Shape(format!(
                    "ECG member {} is sampled at {} Hz, expected {} Hz",
                    member, channel.sample_rate, rate
                )));
            }
            Some(_) => {}
        }
        rows.push(channel.samples);
    }

    let ecg_data = stack_ecg_rows(&rows, &partition.ecg_members)?;

    debug!("Decoding phonocardiogram member {}", partition.phono_member);
    let phono = decode_channel(&read_member(&mut archive, &partition.phono_member)?)
        .map_err(|e| annotate_decode_error(e, &partition.phono_member))?;

    let signal_names = channel_labels(&partition.ecg_members)?;

    let recording = EkoDuoRecording {
        info: EkoDuoInfo {
            signal_names,
            // partition guarantees at least one ECG member
            sample_rate: sample_rate.unwrap_or_default(),
            phonocardiogram_sample_rate: phono.sample_rate,
        },
        ecg_data,
        phonocardiogram: phono.samples,
    };

    info!(
        "Loaded Eko Duo export {}: {} ECG channels x {} samples at {} Hz, phonocardiogram {} samples at {} Hz in {:.1} s",
        archive_path.display(),
        recording.num_channels(),
        recording.num_samples(),
        recording.info.sample_rate,
        recording.phonocardiogram.len(),
        recording.info.phonocardiogram_sample_rate,
        tic.elapsed().as_secs_f64()
    );

    Ok(recording)
}

/// Member names in archive (central directory) order, directories excluded.
fn list_members<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let member = archive.by_index(i)?;
        if member.is_dir() {
            warn!("Ignoring directory entry {} in archive", member.name());
            continue;
        }
        names.push(member.name().to_string());
    }
    Ok(names)
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut member = archive.by_name(name)?;
    let mut bytes = Vec::with_capacity(prealloc_capacity(member.size()));
    member.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn prealloc_capacity(declared_size: u64) -> usize {
    declared_size.min(MAX_PREALLOC_BYTES) as usize
}

/// Splits archive members into ECG members and the phonocardiogram member.
///
/// A member is ECG iff its name contains `ECG`. Exactly one other member must
/// remain, and at least one ECG member must exist.
pub fn partition<S: AsRef<str>>(member_names: &[S]) -> Result<Partition> {
    let (ecg_members, others): (Vec<String>, Vec<String>) = member_names
        .iter()
        .map(|name| name.as_ref().to_string())
        .partition(|name| name.contains(ECG_TAG));

    if ecg_members.is_empty() {
        return Err(EpError::Format(format!(
            "archive has no member tagged '{}'",
            ECG_TAG
        )));
    }

    match <[String; 1]>::try_from(others) {
        Ok([phono_member]) => Ok(Partition {
            ecg_members,
            phono_member,
        }),
        Err(others) => Err(EpError::Format(format!(
            "expected exactly one phonocardiogram member, found {}: {:?}",
            others.len(),
            others
        ))),
    }
}

/// Decodes one PCM WAV member in full.
///
/// Only mono audio is accepted. Integer samples are returned as their raw
/// values; float samples are widened.
pub fn decode_channel(bytes: &[u8]) -> Result<DecodedChannel> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| EpError::Decode(format!("failed to parse WAV header: {}", e)))?;

    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(EpError::Decode(format!(
            "expected mono audio, found {} channels",
            spec.channels
        )));
    }

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EpError::Decode(format!("failed to read float samples: {}", e)))?,
        hound::SampleFormat::Int => reader
            .into_samples::<i32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EpError::Decode(format!("failed to read int samples: {}", e)))?,
    };

    Ok(DecodedChannel {
        sample_rate: spec.sample_rate,
        samples: Array1::from(samples),
    })
}

/// Recovers an ECG channel label from its member name.
///
/// The part before the first `.` is split on `_`; the first seven segments are
/// dropped and the rest rejoined with `_`.
pub fn channel_label(member_name: &str) -> Result<String> {
    let stem = member_name.split('.').next().unwrap_or(member_name);
    let segments: Vec<&str> = stem.split('_').collect();
    if segments.len() < LABEL_SEGMENT_OFFSET {
        return Err(EpError::Format(format!(
            "member name '{}' has {} '_' segment(s), expected at least {}",
            member_name,
            segments.len(),
            LABEL_SEGMENT_OFFSET
        )));
    }
    Ok(segments[LABEL_SEGMENT_OFFSET..].join("_"))
}

/// Labels for all ECG members, in member order. Labels must be unique.
fn channel_labels(members: &[String]) -> Result<Vec<String>> {
    let mut labels: Vec<String> = Vec::with_capacity(members.len());
    for (idx, member) in members.iter().enumerate() {
        let label = channel_label(member)?;
        if let Some(prev) = labels.iter().position(|l| *l == label) {
            return Err(EpError::Format(format!(
                "ECG members {} and {} both map to channel label '{}'",
                members[prev], members[idx], label
            )));
        }
        labels.push(label);
    }
    Ok(labels)
}

fn stack_ecg_rows(rows: &[Array1<f64>], members: &[String]) -> Result<Array2<f64>> {
    if let Some(first) = rows.first() {
        for (row, member) in rows.iter().zip(members).skip(1) {
            if row.len() != first.len() {
                return Err(EpError::Shape(format!(
                    "ECG member {} has {} samples, {} has {}",
                    member,
                    row.len(),
                    members[0],
                    first.len()
                )));
            }
        }
    }
    stack_rows(rows)
}

fn annotate_decode_error(err: EpError, member: &str) -> EpError {
    match err {
        EpError::Decode(msg) => EpError::Decode(format!("{}: {}", member, msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAD_I: &str = "eko_duo_2024_09_24_08_59_ECG_Lead_I.wav";

    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
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

    #[test]
    fn partitions_by_ecg_tag_in_listing_order() {
        let names = ["b_ECG_2.wav", "phono.wav", "a_ECG_1.wav", "c_ECG_3.wav"];
        let partition = partition(&names).unwrap();
        assert_eq!(
            partition.ecg_members,
            vec!["b_ECG_2.wav", "a_ECG_1.wav", "c_ECG_3.wav"]
        );
        assert_eq!(partition.phono_member, "phono.wav");
    }

    #[test]
    fn partition_requires_exactly_one_phonocardiogram() {
        assert!(matches!(
            partition(&["a_ECG.wav", "b_ECG.wav"]),
            Err(EpError::Format(_))
        ));
        assert!(matches!(
            partition(&["a_ECG.wav", "heart.wav", "lungs.wav"]),
            Err(EpError::Format(_))
        ));
        assert!(matches!(partition(&["heart.wav"]), Err(EpError::Format(_))));
    }

    #[test]
    fn ecg_tag_is_case_sensitive() {
        assert!(matches!(
            partition(&["a_ecg.wav", "heart.wav"]),
            Err(EpError::Format(_))
        ));
    }

    #[test]
    fn derives_label_after_seventh_segment() {
        assert_eq!(channel_label(LEAD_I).unwrap(), "ECG_Lead_I");
        assert_eq!(
            channel_label("a_b_c_d_e_f_g_Lead.II.wav").unwrap(),
            "Lead"
        );
        assert_eq!(channel_label(LEAD_I).unwrap(), channel_label(LEAD_I).unwrap());
    }

    #[test]
    fn short_member_name_is_a_format_error() {
        assert!(matches!(
            channel_label("a_b_c_ECG.wav"),
            Err(EpError::Format(_))
        ));
    }

    #[test]
    fn decodes_mono_pcm() {
        let decoded = decode_channel(&wav_bytes(500, 1, &[0, -3, 1200, i16::MIN])).unwrap();
        assert_eq!(decoded.sample_rate, 500);
        assert_eq!(decoded.samples.to_vec(), vec![0.0, -3.0, 1200.0, -32768.0]);
    }

    #[test]
    fn declared_member_size_is_capped() {
        assert_eq!(prealloc_capacity(1024), 1024);
        assert_eq!(prealloc_capacity(u64::MAX), MAX_PREALLOC_BYTES as usize);
    }

    #[test]
    fn decodes_float_pcm() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 4000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.0f32, 0.5, -0.25, 1.0] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_channel(&cursor.into_inner()).unwrap();
        assert_eq!(decoded.sample_rate, 4000);
        assert_eq!(decoded.samples.to_vec(), vec![0.0, 0.5, -0.25, 1.0]);
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let members = vec![
            "a_b_c_d_e_f_g_Lead_I.wav".to_string(),
            "x_y_c_d_e_f_g_Lead_I.wav".to_string(),
        ];
        match channel_labels(&members) {
            Err(EpError::Format(msg)) => {
                assert!(msg.contains(&members[0]) && msg.contains(&members[1]));
            }
            other => panic!("expected format error, got {:?}", other),
        }
        assert_eq!(
            channel_labels(&members[..1]).unwrap(),
            vec!["Lead_I".to_string()]
        );
    }

    #[test]
    fn rejects_stereo_and_garbage() {
        assert!(matches!(
            decode_channel(&wav_bytes(500, 2, &[1, 2, 3, 4])),
            Err(EpError::Decode(_))
        ));
        assert!(matches!(
            decode_channel(b"definitely not a wav file"),
            Err(EpError::Decode(_))
        ));
    }

    #[test]
    fn ecg_rows_must_share_length() {
        let rows = vec![Array1::zeros(4), Array1::zeros(3)];
        let members = vec!["x_ECG_1.wav".to_string(), "x_ECG_2.wav".to_string()];
        assert!(matches!(
            stack_ecg_rows(&rows, &members),
            Err(EpError::Shape(msg)) if msg.contains("x_ECG_2.wav")
        ));
    }
}
