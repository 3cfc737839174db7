//! Duration probing for source files.
//!
//! Uses symphonia's demuxers to walk every packet of the default track and
//! sum their durations. Counting packets rather than trusting header
//! metadata keeps the result accurate for MP3 files without a Xing/Info
//! header, where frame counts are otherwise only estimated.

use std::io::{self, Cursor};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use thiserror::Error;

/// Errors that can occur while probing a file.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The container could not be recognised or read.
    #[error(transparent)]
    Decode(#[from] SymphoniaError),

    /// The container holds no audio track.
    #[error("no audio track found")]
    NoTrack,

    /// The track carries neither a time base nor a sample rate.
    #[error("track has no time base")]
    NoTimeBase,
}

/// Returns the playable duration of an encoded audio file, in seconds.
///
/// # Arguments
///
/// * `bytes` - The complete encoded file
/// * `extension` - Optional file extension used as a format hint
pub fn probe_duration(bytes: &[u8], extension: Option<&str>) -> Result<f64, ProbeError> {
    let source = Cursor::new(bytes.to_vec());
    let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let (track_id, time_base, n_frames) = {
        let track = format.default_track().ok_or(ProbeError::NoTrack)?;
        let params = &track.codec_params;
        let time_base = params
            .time_base
            .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
            .ok_or(ProbeError::NoTimeBase)?;
        (track.id, time_base, params.n_frames)
    };

    let mut total: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() == track_id {
                    total += packet.dur();
                }
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        }
    }

    // Fall back to header metadata for containers that report zero-length packets
    if total == 0 {
        total = n_frames.unwrap_or(0);
    }

    let time = time_base.calc_time(total);
    Ok(time.seconds as f64 + time.frac)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    /// Builds a mono 16-bit PCM WAV file of silence.
    pub(crate) fn silent_wav(sample_rate: u32, seconds: f64) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let frames = (sample_rate as f64 * seconds) as u32;
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_probe_wav_duration() {
        let wav = silent_wav(8000, 1.5);
        let duration = probe_duration(&wav, Some("wav")).unwrap();
        assert!((duration - 1.5).abs() < 0.001, "got {duration}");
    }

    #[test]
    fn test_probe_without_hint() {
        let wav = silent_wav(8000, 0.25);
        let duration = probe_duration(&wav, None).unwrap();
        assert!((duration - 0.25).abs() < 0.001, "got {duration}");
    }

    #[test]
    fn test_probe_rejects_garbage() {
        let result = probe_duration(b"definitely not audio", Some("mp3"));
        assert!(result.is_err());
    }
}
