// crates/edl2ffmpeg-core/src/lib.rs
//
// EDL data model, wire schema, compiled-effect LUTs, the frame pool, and the
// render context. No `ffmpeg`/codec dependency lives here — that belongs to
// `edl2ffmpeg-media`, which depends on this crate, not the other way around.

pub mod context;
pub mod edl;
pub mod effect;
pub mod error;
pub mod frame;
pub mod helpers;
pub mod timeline;

pub use context::{Metrics, MetricsSnapshot, RenderContext, RenderSink, TracingSink};
pub use edl::{load_timeline, parse_document, Document};
pub use effect::{BitDepth, ChromaPolicy, CompiledEffect};
pub use error::EdlError;
pub use frame::{Frame, FramePool, PixelFormat};
pub use timeline::{
    compile_clip_effects, parse_source_track, Clip, EffectSource, EffectType, MediaSource, Motion, SimpleEffect,
    Source, SourceTrack, SourceTrackKind, Timeline, TrackId, TrackType,
};
