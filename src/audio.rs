use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info, warn};

use crate::error::{Result, TtsError};

/// Duration in seconds of the WAV file at `path`.
pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    Ok(frames / spec.sample_rate as f64)
}

/// Write the WAV payloads to `output_path` as one file.
///
/// A single payload is written byte-for-byte. Several payloads are decoded and
/// re-encoded under the first payload's header, frames appended in order.
/// If anything fails, the partial file is removed before returning the error.
pub fn combine_wav_payloads(payloads: &[Vec<u8>], output_path: &Path) -> Result<PathBuf> {
    match payloads {
        [] => Err(TtsError::combine("no audio payloads to combine")),
        [single] => {
            fs::write(output_path, single)?;
            debug!(
                "Wrote single payload of {} bytes to {}",
                single.len(),
                output_path.display()
            );
            Ok(output_path.to_path_buf())
        }
        _ => {
            if let Err(e) = write_combined(payloads, output_path) {
                if output_path.exists() {
                    if let Err(rm) = fs::remove_file(output_path) {
                        warn!(
                            "Failed to remove partial output {}: {}",
                            output_path.display(),
                            rm
                        );
                    }
                }
                return Err(e);
            }
            info!(
                "Combined {} WAV payloads into {}",
                payloads.len(),
                output_path.display()
            );
            Ok(output_path.to_path_buf())
        }
    }
}

fn open_payload(index: usize, payload: &[u8]) -> Result<WavReader<Cursor<&[u8]>>> {
    WavReader::new(Cursor::new(payload))
        .map_err(|e| TtsError::combine(format!("payload {} is not a valid WAV file: {}", index, e)))
}

fn write_combined(payloads: &[Vec<u8>], output_path: &Path) -> Result<()> {
    let spec = open_payload(0, &payloads[0])?.spec();

    let file = BufWriter::new(File::create(output_path)?);
    let mut writer = WavWriter::new(file, spec)
        .map_err(|e| TtsError::combine(format!("cannot write WAV header: {}", e)))?;

    for (i, payload) in payloads.iter().enumerate() {
        let mut reader = open_payload(i, payload)?;
        let payload_spec = reader.spec();
        if !same_format(&spec, &payload_spec) {
            return Err(TtsError::combine(format!(
                "payload {} format {:?} does not match first payload {:?}",
                i, payload_spec, spec
            )));
        }
        copy_frames(&mut reader, &mut writer, spec.sample_format)
            .map_err(|e| TtsError::combine(format!("payload {}: {}", i, e)))?;
    }

    writer
        .finalize()
        .map_err(|e| TtsError::combine(format!("cannot finalize WAV file: {}", e)))?;
    Ok(())
}

fn same_format(a: &WavSpec, b: &WavSpec) -> bool {
    a.channels == b.channels
        && a.sample_rate == b.sample_rate
        && a.bits_per_sample == b.bits_per_sample
        && a.sample_format == b.sample_format
}

fn copy_frames<R, W>(
    reader: &mut WavReader<R>,
    writer: &mut WavWriter<W>,
    format: SampleFormat,
) -> hound::Result<()>
where
    R: std::io::Read,
    W: Write + std::io::Seek,
{
    match format {
        SampleFormat::Int => {
            for sample in reader.samples::<i32>() {
                writer.write_sample(sample?)?;
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                writer.write_sample(sample?)?;
            }
        }
    }
    Ok(())
}
