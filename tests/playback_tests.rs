// Tests for payload decoding and fire-and-forget playback

mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use common::{wav_bytes, MockOutput};
use loqa_voice::audio::decode::{decode_container, decode_raw_pcm};
use loqa_voice::audio::{AudioOutput, DecodedAudio, PayloadDecoder, PlaybackPipeline, PlaybackReporter, UnavailableOutput};
use loqa_voice::error::PlaybackError;
use loqa_voice::protocol::AudioPayload;

fn collecting_reporter() -> (PlaybackReporter, Arc<Mutex<Vec<PlaybackError>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let report: PlaybackReporter = Arc::new(move |error: PlaybackError| {
        sink.lock().unwrap().push(error);
    });
    (report, errors)
}

#[test]
fn test_decode_wav_payload() {
    let payload = wav_bytes(&[0, 16384, -16384, 32767], 24000);

    let audio = PayloadDecoder::new(None).decode(&payload).unwrap();

    assert_eq!(audio.sample_rate, 24000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 4);
    assert!((audio.samples[1] - 0.5).abs() < 1e-3);
    assert!((audio.samples[2] + 0.5).abs() < 1e-3);
}

#[test]
fn test_decode_empty_payload() {
    assert_eq!(PayloadDecoder::new(None).decode(&[]), Err(PlaybackError::Empty));
    assert_eq!(PayloadDecoder::new(Some(22050)).decode(&[]), Err(PlaybackError::Empty));
}

#[test]
fn test_decode_garbage_without_fallback() {
    let result = PayloadDecoder::new(None).decode(b"this is not audio at all");
    assert!(matches!(result, Err(PlaybackError::Decode(_))));
}

#[test]
fn test_decode_raw_pcm_fallback() {
    let samples: [i16; 3] = [0, 16384, -32768];
    let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    let audio = PayloadDecoder::new(Some(22050)).decode(&payload).unwrap();

    assert_eq!(audio.sample_rate, 22050);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples, vec![0.0, 0.5, -1.0]);
}

#[test]
fn test_container_wins_over_raw_fallback() {
    let payload = wav_bytes(&[100, 200], 8000);

    let audio = PayloadDecoder::new(Some(22050)).decode(&payload).unwrap();

    assert_eq!(audio.sample_rate, 8000);
    assert_eq!(audio.samples.len(), 2);
}

#[test]
fn test_raw_pcm_rejects_odd_length() {
    assert!(matches!(decode_raw_pcm(&[1, 2, 3], 16000), Err(PlaybackError::Decode(_))));
}

#[test]
fn test_decode_container_reports_unknown_format() {
    assert!(matches!(decode_container(&[0u8; 64]), Err(PlaybackError::Decode(_))));
}

#[test]
fn test_decoded_duration() {
    let audio = DecodedAudio {
        samples: vec![0.0; 32000],
        sample_rate: 16000,
        channels: 2,
    };
    assert_eq!(audio.duration_secs(), 1.0);
}

#[test]
fn test_unavailable_output_always_fails() {
    let output = UnavailableOutput::new("no device");
    let audio = DecodedAudio {
        samples: vec![0.0],
        sample_rate: 16000,
        channels: 1,
    };

    assert_eq!(
        output.render(audio),
        Err(PlaybackError::OutputUnavailable("no device".to_string()))
    );
}

#[tokio::test]
async fn test_play_now_renders_decoded_audio() -> Result<()> {
    let output = MockOutput::new();
    let (report, errors) = collecting_reporter();
    let pipeline = PlaybackPipeline::new(PayloadDecoder::new(None), output.clone(), report);

    pipeline
        .play_now(AudioPayload(wav_bytes(&[1, 2, 3, 4, 5], 16000)))
        .await?;

    let rendered = output.rendered();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].samples.len(), 5);
    assert!(errors.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_play_reports_failures() -> Result<()> {
    let output = MockOutput::new();
    let (report, errors) = collecting_reporter();
    let pipeline = PlaybackPipeline::new(PayloadDecoder::new(None), output.clone(), report);

    pipeline.play(AudioPayload(Vec::new())).await?;
    pipeline.play(AudioPayload(b"garbage".to_vec())).await?;

    let errors = errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], PlaybackError::Empty);
    assert!(matches!(errors[1], PlaybackError::Decode(_)));
    assert!(output.rendered().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_payloads_play_independently() -> Result<()> {
    let output = MockOutput::new();
    let (report, errors) = collecting_reporter();
    let pipeline = PlaybackPipeline::new(PayloadDecoder::new(None), output.clone(), report);

    let first = pipeline.play(AudioPayload(wav_bytes(&[1; 100], 16000)));
    let second = pipeline.play(AudioPayload(wav_bytes(&[2; 50], 16000)));
    first.await?;
    second.await?;

    let mut lengths: Vec<usize> = output.rendered().iter().map(|a| a.samples.len()).collect();
    lengths.sort();
    assert_eq!(lengths, vec![50, 100]);
    assert!(errors.lock().unwrap().is_empty());

    Ok(())
}
