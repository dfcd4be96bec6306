// crates/edl2ffmpeg-media/src/helpers/mod.rs
//
// Internal helper modules for edl2ffmpeg-media. Not re-exported from lib.rs —
// these are decode/composite/encode implementation details.

pub mod yuv;
pub mod seek;
