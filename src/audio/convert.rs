// Sample format conversion for devices that cannot open 16kHz mono directly

use rubato::{FastFixedIn, PolynomialDegree, ResampleError, Resampler, ResamplerConstructionError};

/// Input frames handed to the resampler per call
pub const RESAMPLER_CHUNK: usize = 1024;

/// Mix interleaved multi-channel audio down to mono by averaging.
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Mono resampler for a continuous stream delivered in arbitrary buffer sizes.
///
/// Input that does not fill a whole resampler chunk is kept for the next
/// call, so no frames are lost at callback boundaries and the filter phase
/// carries over.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    ratio: f64,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, ResamplerConstructionError> {
        if source_rate == target_rate {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
                ratio: 1.0,
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let inner = FastFixedIn::<f32>::new(ratio, 10., PolynomialDegree::Septic, RESAMPLER_CHUNK, 1)?;

        Ok(Self {
            inner: Some(inner),
            pending: Vec::with_capacity(RESAMPLER_CHUNK * 2),
            ratio,
        })
    }

    /// Output frames per input frame
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Input frames waiting for a full resampler chunk
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed mono samples and return everything that could be resampled.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, ResampleError> {
        let Some(resampler) = &mut self.inner else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);

        let mut output = Vec::new();
        let mut consumed = 0;
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() - consumed < needed {
                break;
            }
            let block = resampler.process(&[&self.pending[consumed..consumed + needed]], None)?;
            output.extend_from_slice(&block[0]);
            consumed += needed;
        }
        self.pending.drain(..consumed);

        Ok(output)
    }
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
