// crates/edl2ffmpeg-media/src/scale.rs
//
// Scaler cache keyed by the full conversion shape. Building an `SwsContext`
// is not free, and a render revisits the same `(src, dst)` pair on every
// frame of a clip, so a cache avoids paying that cost per-frame.

use edl2ffmpeg_core::EdlError;
use ffmpeg_the_third::format::Pixel;
use ffmpeg_the_third::software::scaling::{context::Context as SwsContext, flag::Flags};
use std::collections::HashMap;

type ScalerKey = (Pixel, u32, u32, Pixel, u32, u32);

#[derive(Default)]
pub struct ScalerCache {
    scalers: HashMap<ScalerKey, SwsContext>,
}

impl ScalerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        src_fmt: Pixel,
        src_w: u32,
        src_h: u32,
        dst_fmt: Pixel,
        dst_w: u32,
        dst_h: u32,
    ) -> Result<&mut SwsContext, EdlError> {
        let key = (src_fmt, src_w, src_h, dst_fmt, dst_w, dst_h);
        if !self.scalers.contains_key(&key) {
            // Downscale favors sharpness (bicubic), upscale favors smoothness
            // over ringing (bilinear); same-size conversions (just a pixel
            // format change) take the cheaper bilinear path.
            let downscaling = (dst_w as u64 * dst_h as u64) < (src_w as u64 * src_h as u64);
            let flags = if downscaling { Flags::BICUBIC } else { Flags::BILINEAR };
            let sws = SwsContext::get(src_fmt, src_w, src_h, dst_fmt, dst_w, dst_h, flags)
                .map_err(|e| EdlError::convert(format!("build scaler {src_w}x{src_h} -> {dst_w}x{dst_h}: {e}")))?;
            self.scalers.insert(key, sws);
        }
        Ok(self.scalers.get_mut(&key).expect("just inserted"))
    }

    pub fn len(&self) -> usize {
        self.scalers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalers.is_empty()
    }
}
