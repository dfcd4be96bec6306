// crates/edl2ffmpeg-media/src/compositor.rs
//
// Per-frame compositing: scale/translate/rotate a clip's decoded frame onto
// a black output canvas, apply its compiled effect LUTs, then apply the
// clip's fade multiplier. Every step reads from one `Frame` and writes a
// second — never in place — so a source frame shared across several output
// slots (the pulldown-repeat case) is never mutated out from under a sibling
// handle; `ensure_writable`-style copy-on-write in `Frame::planes_mut` is
// what makes that safe even if a caller does composite in place.
//
// All geometry is nearest-neighbor sampling over integer pixel coordinates —
// no sub-pixel filtering. Acceptable for a still-image-like transform held
// constant across a clip; a production-quality resampler would filter scale
// steps and is out of scope here.

use edl2ffmpeg_core::{effect::CompiledEffect, ChromaPolicy, EffectSource, Frame, FramePool, Motion};

/// Render a clip's `Source::Generated` color field directly into a pool frame.
pub fn composite_color(pool: &FramePool, color: EffectSource) -> Result<Frame, edl2ffmpeg_core::EdlError> {
    let mut frame = pool.acquire()?;
    let (r, g, b) = (color.color.0 as f64, color.color.1 as f64, color.color.2 as f64);
    let y = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    let u = (128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b).round().clamp(0.0, 255.0) as u8;
    let v = (128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b).round().clamp(0.0, 255.0) as u8;
    let planes = frame.planes_mut();
    planes[0].fill(y);
    planes[1].fill(u);
    planes[2].fill(v);
    Ok(frame)
}

/// Apply `motion`'s affine transform, mapping `src` onto a same-size black
/// canvas in `dst`. A no-op (identity motion) is a plain copy.
pub fn apply_motion(pool: &FramePool, src: &Frame, motion: &Motion) -> Result<Frame, edl2ffmpeg_core::EdlError> {
    if motion.is_identity() {
        return Ok(src.clone());
    }
    let mut dst = pool.acquire()?;
    let w = src.width() as i64;
    let h = src.height() as i64;
    let planes = [(w, h), (w.div_ceil(2), h.div_ceil(2)), (w.div_ceil(2), h.div_ceil(2))];

    let theta = -motion.rotate_degrees.to_radians(); // inverse rotation for dst->src mapping
    let (sin, cos) = theta.sin_cos();

    for (plane_idx, (pw, ph)) in planes.into_iter().enumerate() {
        let is_chroma = plane_idx != 0;
        let (scale_x, scale_y) = (motion.scale_x, motion.scale_y);
        let (tx, ty) = if is_chroma {
            (motion.translate_x / 2.0, motion.translate_y / 2.0)
        } else {
            (motion.translate_x, motion.translate_y)
        };
        let (cx, cy) = (pw as f64 / 2.0, ph as f64 / 2.0);

        let src_plane = &src.planes()[plane_idx];
        let dst_plane = &mut dst.planes_mut()[plane_idx];
        for y in 0..ph {
            for x in 0..pw {
                // dst pixel (x, y) relative to center, undo translate/rotate/scale
                // in reverse order to find the source sample.
                let dx = x as f64 - cx - tx;
                let dy = y as f64 - cy - ty;
                let rx = dx * cos - dy * sin;
                let ry = dx * sin + dy * cos;
                let sx = (rx / scale_x.max(1e-6) + cx).round() as i64;
                let sy = (ry / scale_y.max(1e-6) + cy).round() as i64;
                let value = if sx >= 0 && sx < pw && sy >= 0 && sy < ph {
                    src_plane[(sy * pw + sx) as usize]
                } else if is_chroma {
                    128
                } else {
                    0
                };
                dst_plane[(y * pw + x) as usize] = value;
            }
        }
    }
    Ok(dst)
}

/// Apply a clip's compiled effect chain to `frame` in place, honoring each
/// effect's `ChromaPolicy`.
pub fn apply_effects(frame: &mut Frame, effects: &[CompiledEffect]) {
    if effects.is_empty() {
        return;
    }
    let planes = frame.planes_mut();
    for effect in effects {
        for b in planes[0].iter_mut() {
            *b = effect.apply(*b as u16) as u8;
        }
        if effect.policy == ChromaPolicy::AllChannels {
            for plane in &mut planes[1..] {
                for b in plane.iter_mut() {
                    *b = effect.apply(*b as u16) as u8;
                }
            }
        }
    }
}

/// Blend `frame` toward black by `multiplier` (1.0 = unchanged, 0.0 = fully
/// black). Luma scales toward 0; chroma scales toward the neutral midpoint
/// (128) so a full fade-out is a true black frame, not a darkened-but-tinted
/// one. The multiplier is constant for the whole frame, so — matching the
/// effects path — it's compiled into two 256-entry LUTs once and then
/// applied by table lookup; no per-pixel floating-point.
pub fn apply_fade(frame: &mut Frame, multiplier: f64) {
    if multiplier >= 1.0 {
        return;
    }
    let m = multiplier.clamp(0.0, 1.0);
    let mut luma_lut = [0u8; 256];
    let mut chroma_lut = [0u8; 256];
    for i in 0..256 {
        luma_lut[i] = (i as f64 * m).round().clamp(0.0, 255.0) as u8;
        chroma_lut[i] = (128.0 + (i as f64 - 128.0) * m).round().clamp(0.0, 255.0) as u8;
    }
    let planes = frame.planes_mut();
    for b in planes[0].iter_mut() {
        *b = luma_lut[*b as usize];
    }
    for plane in &mut planes[1..] {
        for b in plane.iter_mut() {
            *b = chroma_lut[*b as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edl2ffmpeg_core::{PixelFormat, RenderContext};

    #[test]
    fn identity_motion_is_a_cheap_clone_not_a_pixel_copy() {
        let pool = FramePool::new(4, 4, PixelFormat::Yuv420p, 2, RenderContext::new());
        let src = pool.acquire().unwrap();
        let dst = apply_motion(&pool, &src, &Motion::default()).unwrap();
        assert!(dst.is_aliased());
    }

    #[test]
    fn translate_shifts_pixel_content() {
        let pool = FramePool::new(4, 4, PixelFormat::Yuv420p, 2, RenderContext::new());
        let mut src = pool.acquire().unwrap();
        src.planes_mut()[0][0] = 200; // top-left luma pixel
        let motion = Motion { translate_x: 1.0, translate_y: 0.0, ..Motion::default() };
        let dst = apply_motion(&pool, &src, &motion).unwrap();
        // Source's top-left pixel should now appear one column to the right.
        assert_eq!(dst.planes()[0][1], 200);
    }

    #[test]
    fn fade_zero_produces_neutral_chroma_black_frame() {
        let pool = FramePool::new(2, 2, PixelFormat::Yuv420p, 1, RenderContext::new());
        let mut f = pool.acquire().unwrap();
        f.planes_mut()[0].fill(200);
        f.planes_mut()[1].fill(90);
        apply_fade(&mut f, 0.0);
        assert!(f.planes()[0].iter().all(|&b| b == 0));
        assert!(f.planes()[1].iter().all(|&b| b == 128));
    }

    #[test]
    fn color_source_produces_correct_luma_for_white() {
        let pool = FramePool::new(2, 2, PixelFormat::Yuv420p, 1, RenderContext::new());
        let f = composite_color(&pool, EffectSource { color: (255, 255, 255) }).unwrap();
        assert_eq!(f.planes()[0][0], 255);
    }
}
