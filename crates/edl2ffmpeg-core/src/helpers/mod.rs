// crates/edl2ffmpeg-core/src/helpers/mod.rs

pub mod time;
