//! Audio primitives: sample FIFOs, the analysis-rate resampler, and the
//! energy gate.

pub mod resample;
pub mod ring;
pub mod vad;

pub use resample::MonoResampler;
pub use ring::{PacketInfo, PacketQueue, SampleRing};
