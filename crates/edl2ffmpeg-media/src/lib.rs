// crates/edl2ffmpeg-media/src/lib.rs
//
// ffmpeg-backed implementation of the render pipeline: source decode
// (`reader`), pixel format conversion (`scale`), per-frame compositing
// (`compositor`), audio passthrough (`audio`), and the driver that ties them
// together into one encoded output (`driver`).

pub mod audio;
pub mod compositor;
pub mod driver;
mod helpers;
pub mod reader;
pub mod scale;

pub use audio::{AudioEncoderState, AudioFifo, AUDIO_RATE};
pub use driver::{EncodeOptions, TimelineDriver};
pub use reader::SourceReader;
pub use scale::ScalerCache;
