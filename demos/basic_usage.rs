use ep_importer::{load, Recording};
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <workmate_export_dir | eko_duo_export.zip>", args[0]);
        std::process::exit(1);
    }

    match load(&args[1])? {
        Recording::Workmate(rec) => {
            println!("Workmate export");
            println!("Patient: {} ({})", rec.info.patient_name, rec.info.patient_id);
            println!("Recording start: {}", rec.info.recording_start);
            // Start of the last session, not the end of the data
            println!("Last session start: {}", rec.info.recording_end);
            println!("Sample rate: {}", rec.info.sample_rate);
            println!("Signal resolution: {}", rec.info.signal_resolution);
            println!("Sessions: {}", rec.source_files.len());
            if let Some(seconds) = rec.duration() {
                println!("Duration: {:.2} seconds", seconds);
            }
            print_channels(&rec.info.signal_names, rec.data.nrows(), rec.data.ncols());

            if let Some(name) = rec.info.signal_names.first() {
                let first = rec.channel(name)?;
                let preview: Vec<f64> = first.iter().take(5).copied().collect();
                println!("\nFirst 5 samples of {}: {:?}", name, preview);
            }
        }
        Recording::EkoDuo(rec) => {
            println!("Eko Duo export");
            println!("ECG sample rate: {} Hz", rec.info.sample_rate);
            println!(
                "Phonocardiogram sample rate: {} Hz",
                rec.info.phonocardiogram_sample_rate
            );
            println!("ECG duration: {:.2} seconds", rec.duration());
            println!(
                "Phonocardiogram: {} samples ({:.2} seconds)",
                rec.phonocardiogram.len(),
                rec.phonocardiogram_duration()
            );
            print_channels(&rec.info.signal_names, rec.ecg_data.nrows(), rec.ecg_data.ncols());
        }
    }

    Ok(())
}

fn print_channels(names: &[String], rows: usize, cols: usize) {
    println!("\nData shape: {} channels x {} samples", rows, cols);
    println!("Channels:");
    for (i, name) in names.iter().enumerate().take(10) {
        println!("  {}: {}", i, name);
    }
    if names.len() > 10 {
        println!("  ... and {} more", names.len() - 10);
    }
}
