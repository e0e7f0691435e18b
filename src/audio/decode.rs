// Decoding of assistant audio payloads
//
// Payloads are probed as standard containers via symphonia. When the
// service is configured to send headerless PCM instead, a raw fallback
// rate may be given: unprobeable payloads are then read as mono i16 LE.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::convert::i16_to_f32;
use crate::error::PlaybackError;

/// A renderable buffer of interleaved float samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Payload decoder
#[derive(Debug, Clone, Default)]
pub struct PayloadDecoder {
    raw_pcm_sample_rate: Option<u32>,
}

impl PayloadDecoder {
    pub fn new(raw_pcm_sample_rate: Option<u32>) -> Self {
        Self { raw_pcm_sample_rate }
    }

    pub fn decode(&self, payload: &[u8]) -> Result<DecodedAudio, PlaybackError> {
        if payload.is_empty() {
            return Err(PlaybackError::Empty);
        }

        match decode_container(payload) {
            Ok(audio) => Ok(audio),
            Err(e) => match self.raw_pcm_sample_rate {
                Some(rate) => {
                    debug!("Container probe failed ({}), treating payload as raw PCM at {}Hz", e, rate);
                    decode_raw_pcm(payload, rate)
                }
                None => Err(e),
            },
        }
    }
}

/// Decode any container symphonia can probe.
pub fn decode_container(payload: &[u8]) -> Result<DecodedAudio, PlaybackError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(payload.to_vec())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(&Hint::new(), mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PlaybackError::Decode(format!("Unrecognized container: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::Decode("No supported audio track".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PlaybackError::Decode(format!("Unsupported codec: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(PlaybackError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped, the rest of the payload may still play
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(PlaybackError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(PlaybackError::Decode("Payload contains no audio".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Read headerless little-endian i16 mono PCM.
pub fn decode_raw_pcm(payload: &[u8], sample_rate: u32) -> Result<DecodedAudio, PlaybackError> {
    if payload.len() % 2 != 0 {
        return Err(PlaybackError::Decode(format!(
            "Raw PCM payload has odd length {}",
            payload.len()
        )));
    }

    let samples = payload
        .chunks_exact(2)
        .map(|b| i16_to_f32(i16::from_le_bytes([b[0], b[1]])))
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: 1,
    })
}
