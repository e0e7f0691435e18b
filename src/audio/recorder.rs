use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::chunk::AudioChunk;

/// Writes every sent chunk of a session to one WAV file
pub struct UtteranceRecorder {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_count: usize,
}

impl UtteranceRecorder {
    /// Create `<output_dir>/<session_id>.wav`.
    pub fn create(output_dir: &Path, session_id: &str, sample_rate: u32) -> Result<Self> {
        fs::create_dir_all(output_dir).context("Failed to create recording directory")?;

        let path = output_dir.join(format!("{}.wav", session_id));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Recording outgoing audio to {}", path.display());

        Ok(Self {
            writer: Some(writer),
            path,
            sample_count: 0,
        })
    }

    pub fn write_chunk(&mut self, chunk: &AudioChunk) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in &chunk.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.sample_count += chunk.samples.len();
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Finalize the WAV header and close the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        info!(
            "Recording saved: {} ({} samples)",
            self.path.display(),
            self.sample_count
        );

        Ok(self.path.clone())
    }
}

impl Drop for UtteranceRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
