pub mod backend;
pub mod capture;
pub mod chunk;
pub mod convert;
pub mod cpal_backend;
pub mod decode;
pub mod level;
pub mod output;
pub mod playback;
pub mod recorder;

pub use backend::{
    CaptureConfig, CaptureDevice, CaptureEvent, CaptureGuard, CaptureStream, ChunkSender, LevelTap,
};
pub use capture::CapturePipeline;
pub use chunk::{quantize, AudioChunk, BlockAssembler, DEFAULT_BLOCK_SIZE};
pub use convert::StreamResampler;
pub use cpal_backend::{list_input_devices, CpalMicrophone};
pub use decode::{DecodedAudio, PayloadDecoder};
pub use level::LevelMeter;
pub use output::{AudioOutput, RodioOutput, UnavailableOutput};
pub use playback::{PlaybackPipeline, PlaybackReporter};
pub use recorder::UtteranceRecorder;
