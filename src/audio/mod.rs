//! Audio framing, segmentation and rate conversion.

pub mod frame;
pub mod pcm;
pub mod resample;
pub mod vad;
pub mod wav;

pub use frame::{AudioFrame, FrameReader, FrameSource};
pub use resample::StreamingResampler;
pub use vad::{SegmentEvent, SegmentationEngine, SegmenterConfig, SpeechSegment};
pub use wav::WavFrameSource;
