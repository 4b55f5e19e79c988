//! Audio container decoding and encoding.
//!
//! Decoding goes through symphonia's probe, so anything it recognises (MP3,
//! WAV, raw PCM in a WAV wrapper) is accepted. Encoding produces either mono
//! MP3 through LAME or 16-bit WAV through hound.

use crate::audio::pcm::{downmix, PcmBuffer};
use crate::config::AudioFormat;
use crate::errors::CodecError;
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm, Quality};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decodes an in-memory audio file into mono PCM.
///
/// `extension` is a probe hint such as `"mp3"` or `"wav"`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the container or codec is not
/// recognised, or when no samples could be decoded.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<PcmBuffer, CodecError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CodecError::Decode("no supported audio track".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CodecError::Decode(e.to_string()))?;

    let mut samples = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(CodecError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend(downmix(buffer.samples(), spec.channels.count()));
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(CodecError::Decode("stream contained no audio".to_string()));
    }
    Ok(PcmBuffer::new(samples, sample_rate))
}

/// Reads and decodes an audio file from disk.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the file cannot be read or decoded.
pub fn decode_file(path: &Path) -> Result<PcmBuffer, CodecError> {
    let bytes = std::fs::read(path)
        .map_err(|e| CodecError::Decode(format!("{}: {e}", path.display())))?;
    let extension = path.extension().and_then(|ext| ext.to_str());
    decode_bytes(bytes, extension)
}

/// Encodes mono PCM in the requested container.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the encoder rejects its settings.
pub fn encode(pcm: &PcmBuffer, format: AudioFormat, mp3_bitrate_kbps: u32) -> Result<Vec<u8>, CodecError> {
    match format {
        AudioFormat::Mp3 => encode_mp3(pcm, mp3_bitrate_kbps),
        AudioFormat::Wav => encode_wav(pcm),
    }
}

/// Encodes mono PCM as MP3.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if LAME rejects the sample rate, bitrate
/// or input.
pub fn encode_mp3(pcm: &PcmBuffer, bitrate_kbps: u32) -> Result<Vec<u8>, CodecError> {
    let mut builder = Builder::new().ok_or_else(|| CodecError::Encode("LAME unavailable".to_string()))?;
    builder
        .set_num_channels(1)
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;
    builder
        .set_sample_rate(pcm.sample_rate)
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;
    builder
        .set_brate(bitrate(bitrate_kbps))
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;
    let mut encoder = builder
        .build()
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;

    let input = to_i16(&pcm.samples);
    let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(input.len()));
    encoder
        .encode_to_vec(MonoPcm(&input), &mut out)
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;
    encoder
        .flush_to_vec::<FlushNoGap>(&mut out)
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;
    Ok(out)
}

/// Encodes mono PCM as 16-bit WAV.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the writer fails.
pub fn encode_wav(pcm: &PcmBuffer) -> Result<Vec<u8>, CodecError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        for sample in to_i16(&pcm.samples) {
            writer
                .write_sample(sample)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CodecError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
        .collect()
}

fn bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=79 => Bitrate::Kbps64,
        80..=111 => Bitrate::Kbps96,
        112..=143 => Bitrate::Kbps128,
        144..=175 => Bitrate::Kbps160,
        176..=223 => Bitrate::Kbps192,
        224..=287 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, sample_rate: u32) -> PcmBuffer {
        let samples = (0..len)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        PcmBuffer::new(samples, sample_rate)
    }

    #[test]
    fn test_wav_decodes_back_to_same_length() {
        let pcm = tone(2400, 24_000);
        let wav = encode_wav(&pcm).unwrap();
        let decoded = decode_bytes(wav, Some("wav")).unwrap();

        assert_eq!(decoded.sample_rate, 24_000);
        assert_eq!(decoded.len(), 2400);
        assert!((decoded.peak() - pcm.peak()).abs() < 1e-3);
    }

    #[test]
    fn test_stereo_wav_is_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..100 {
                writer.write_sample(i16::MAX).unwrap();
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_bytes(cursor.into_inner(), Some("wav")).unwrap();
        assert_eq!(decoded.len(), 100);
        assert!((decoded.samples[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = decode_bytes(b"definitely not audio".to_vec(), None).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn test_mp3_encoding_produces_frames() {
        let mp3 = encode_mp3(&tone(24_000, 24_000), 128).unwrap();
        assert!(!mp3.is_empty());
    }

    #[test]
    fn test_bitrate_mapping() {
        assert!(matches!(bitrate(128), Bitrate::Kbps128));
        assert!(matches!(bitrate(10), Bitrate::Kbps64));
        assert!(matches!(bitrate(1000), Bitrate::Kbps320));
    }
}
