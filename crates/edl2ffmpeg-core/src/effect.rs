// crates/edl2ffmpeg-core/src/effect.rs
//
// Compiles a `SimpleEffect` (type + strength) into a lookup table the
// Compositor applies per-sample. LUTs are cached by the media crate keyed on
// `(EffectType, quantized strength, bit depth)` — compiling here is cheap
// enough that the cache is an optimization, not a correctness requirement.

pub const LUT8_SIZE: usize = 256;
pub const LUT10_SIZE: usize = 1024;

/// Output sample bit depth. Only 8-bit (YUV420P, the default decode target)
/// and 10-bit (YUV420P10LE sources) are supported — see spec Non-goals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Eight,
    Ten,
}

impl BitDepth {
    pub fn lut_size(self) -> usize {
        match self {
            BitDepth::Eight => LUT8_SIZE,
            BitDepth::Ten => LUT10_SIZE,
        }
    }

    pub fn max_value(self) -> u32 {
        self.lut_size() as u32 - 1
    }
}

/// Which planes a compiled effect's LUT applies to. Luma-only is the default
/// for YUV sources (brightness/contrast read as "adjust luminance", leaving
/// chroma untouched avoids unwanted hue shift); RGB sources have no separate
/// luma plane so all channels take the LUT.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromaPolicy {
    LumaOnly,
    AllChannels,
}

/// A compiled effect: a LUT plus the policy for which planes it applies to.
/// `lut[i]` gives the mapped output sample value for input sample value `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledEffect {
    pub policy: ChromaPolicy,
    pub bit_depth: BitDepth,
    pub lut: Vec<u16>,
}

impl CompiledEffect {
    /// Apply in place to a single luma/RGB sample value.
    #[inline]
    pub fn apply(&self, sample: u16) -> u16 {
        self.lut[sample as usize]
    }
}

/// Strength values within 1/256 of each other must compile to bit-identical
/// LUTs — this is the numeric stability guarantee the spec requires so the
/// LUT cache key (quantized strength) never diverges from the literal
/// strength's actual rendered output. Strength is otherwise unbounded (a
/// contrast strength > 1.0 is a legitimate "brighten the extremes" request).
pub fn quantize_strength(strength: f64) -> i32 {
    (strength * 256.0).round() as i32
}

/// `output = clamp(input * strength)`. `strength = 1.0` is identity,
/// `strength = 0.0` is black, `strength > 1.0` brightens.
pub fn compile_brightness(strength: f64, bit_depth: BitDepth) -> CompiledEffect {
    let q = quantize_strength(strength) as f64 / 256.0;
    let max = bit_depth.max_value() as f64;
    let lut = (0..bit_depth.lut_size())
        .map(|i| (i as f64 * q).round().clamp(0.0, max) as u16)
        .collect();
    CompiledEffect { policy: ChromaPolicy::LumaOnly, bit_depth, lut }
}

/// `output = clamp(mid + (input - mid) * strength)`, where `mid` is the
/// bit-depth's mid-gray level (128 for 8-bit, 512 for 10-bit). `strength =
/// 1.0` is identity, `strength = 0.0` collapses everything to mid-gray, and
/// `strength = 2.0` doubles the distance from mid-gray.
pub fn compile_contrast(strength: f64, bit_depth: BitDepth) -> CompiledEffect {
    let q = quantize_strength(strength) as f64 / 256.0;
    let max = bit_depth.max_value() as f64;
    let mid = (max + 1.0) / 2.0;
    let lut = (0..bit_depth.lut_size())
        .map(|i| ((i as f64 - mid) * q + mid).round().clamp(0.0, max) as u16)
        .collect();
    CompiledEffect { policy: ChromaPolicy::LumaOnly, bit_depth, lut }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_one_is_identity() {
        let e = compile_brightness(1.0, BitDepth::Eight);
        for i in 0..=255u16 {
            assert_eq!(e.apply(i), i);
        }
    }

    #[test]
    fn brightness_zero_is_black() {
        let e = compile_brightness(0.0, BitDepth::Eight);
        for i in 0..=255u16 {
            assert_eq!(e.apply(i), 0);
        }
    }

    #[test]
    fn brightness_above_one_brightens_and_clamps() {
        let e = compile_brightness(2.0, BitDepth::Eight);
        assert_eq!(e.apply(100), 200);
        assert_eq!(e.apply(200), 255);
    }

    #[test]
    fn contrast_one_is_identity() {
        let e = compile_contrast(1.0, BitDepth::Eight);
        for i in 0..=255u16 {
            assert_eq!(e.apply(i), i);
        }
    }

    #[test]
    fn contrast_zero_collapses_to_mid_gray() {
        let e = compile_contrast(0.0, BitDepth::Eight);
        assert_eq!(e.apply(0), 128);
        assert_eq!(e.apply(255), 128);
    }

    #[test]
    fn contrast_above_one_expressible_and_clamps() {
        // Spec sets no upper bound on strength; brightening the extremes
        // (factor > 1) must be expressible, not just darkening them.
        let e = compile_contrast(2.0, BitDepth::Eight);
        assert_eq!(e.apply(255), 255);
        assert_eq!(e.apply(0), 0);
        assert_eq!(e.apply(192), 255);
    }

    #[test]
    fn strengths_within_one_over_256_compile_identically() {
        let a = compile_brightness(0.5, BitDepth::Eight);
        let b = compile_brightness(0.5 + 1.0 / 600.0, BitDepth::Eight);
        assert_eq!(a.lut, b.lut);
    }

    #[test]
    fn ten_bit_lut_sized_and_identity_at_one() {
        let e = compile_brightness(1.0, BitDepth::Ten);
        assert_eq!(e.lut.len(), LUT10_SIZE);
        assert_eq!(e.apply(0), 0);
        assert_eq!(e.apply(1023), 1023);
    }
}
