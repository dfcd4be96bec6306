// crates/edl2ffmpeg-media/src/helpers/yuv.rs
//
// Conversion between `ffmpeg`'s strided `VideoFrame` planes and our pool's
// packed (stride-free) `Frame` planes. `Frame` already stores exactly the
// "packed YUV420P" layout this module used to build as an intermediate
// `Vec<u8>` — so these functions copy straight into/out of pool storage
// instead of allocating a scratch buffer per frame.

use edl2ffmpeg_core::Frame;
use ffmpeg_the_third::util::frame::video::Video as VideoFrame;

/// Copy a decoded/scaled `ffmpeg` YUV420P frame into a pool `Frame`'s packed
/// planes, stripping row stride padding.
pub fn copy_from_ffmpeg(dst: &mut Frame, src: &VideoFrame) {
    let w = dst.width() as usize;
    let h = dst.height() as usize;
    let uv_w = w.div_ceil(2);
    let uv_h = h.div_ceil(2);
    let dims = [(w, h), (uv_w, uv_h), (uv_w, uv_h)];

    let planes = dst.planes_mut();
    for (plane_idx, (pw, ph)) in dims.into_iter().enumerate() {
        let stride = src.stride(plane_idx);
        let raw = src.data(plane_idx);
        let plane = &mut planes[plane_idx];
        for row in 0..ph {
            plane[row * pw..row * pw + pw].copy_from_slice(&raw[row * stride..row * stride + pw]);
        }
    }
}

/// Copy a pool `Frame`'s packed planes into a (pre-allocated, correctly
/// formatted) `ffmpeg` `VideoFrame`, reinstating row stride — the inverse of
/// `copy_from_ffmpeg`. Used just before handing a composited frame to the
/// encoder.
pub fn copy_to_ffmpeg(dst: &mut VideoFrame, src: &Frame) {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let uv_w = w.div_ceil(2);
    let uv_h = h.div_ceil(2);
    let dims = [(w, h), (uv_w, uv_h), (uv_w, uv_h)];

    for (plane_idx, (pw, ph)) in dims.into_iter().enumerate() {
        let stride = dst.stride(plane_idx);
        let plane = &src.planes()[plane_idx];
        let out = dst.data_mut(plane_idx);
        for row in 0..ph {
            out[row * stride..row * stride + pw].copy_from_slice(&plane[row * pw..row * pw + pw]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edl2ffmpeg_core::{FramePool, PixelFormat, RenderContext};
    use ffmpeg_the_third::format::Pixel;

    #[test]
    fn round_trips_through_ffmpeg_stride() {
        let pool = FramePool::new(4, 2, PixelFormat::Yuv420p, 1, RenderContext::new());
        let mut frame = pool.acquire().unwrap();
        for (i, b) in frame.planes_mut()[0].iter_mut().enumerate() {
            *b = i as u8;
        }

        let mut ff = VideoFrame::new(Pixel::YUV420P, 4, 2);
        copy_to_ffmpeg(&mut ff, &frame);

        let mut back = pool.acquire().unwrap();
        copy_from_ffmpeg(&mut back, &ff);
        assert_eq!(back.planes()[0], frame.planes()[0]);
    }
}
