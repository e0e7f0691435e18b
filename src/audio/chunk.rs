// Fixed-size PCM chunks
//
// Capture callbacks deliver float samples in whatever buffer sizes the
// device likes. The assembler quantizes them to i16 and cuts them into
// blocks of exactly `block_size` samples.

/// Default samples per chunk (~256ms at 16kHz)
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// A fixed-length block of 16-bit mono PCM samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Chunk number within the capture (0-indexed)
    pub sequence: u64,
    /// Samples, 16-bit signed
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(sequence: u64, samples: Vec<i16>) -> Self {
        Self { sequence, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average absolute amplitude, normalized to [0, 1].
    pub fn mean_magnitude(&self) -> f32 {
        mean_magnitude(&self.samples)
    }
}

/// Convert a normalized float sample to i16.
///
/// Values outside [-1, 1] are clamped first. Positive values scale by 32767
/// and negative ones by 32768, so both ends of the i16 range are reachable.
pub fn quantize(value: f32) -> i16 {
    let v = value.clamp(-1.0, 1.0);
    if v < 0.0 {
        (v * 32768.0) as i16
    } else {
        (v * 32767.0) as i16
    }
}

pub fn mean_magnitude(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64).abs()).sum();
    let mean = sum / samples.len() as f64 / 32768.0;
    mean.clamp(0.0, 1.0) as f32
}

/// Accumulates float samples and emits full chunks
#[derive(Debug)]
pub struct BlockAssembler {
    block_size: usize,
    pending: Vec<i16>,
    next_sequence: u64,
}

impl BlockAssembler {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
            next_sequence: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples waiting for the next full block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Push samples and return every chunk completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioChunk> {
        let mut ready = Vec::new();

        for &sample in samples {
            self.pending.push(quantize(sample));

            if self.pending.len() == self.block_size {
                let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                ready.push(AudioChunk::new(self.next_sequence, block));
                self.next_sequence += 1;
            }
        }

        ready
    }
}
