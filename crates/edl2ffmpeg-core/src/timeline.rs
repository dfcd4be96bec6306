// crates/edl2ffmpeg-core/src/timeline.rs
//
// The validated in-memory model of an Edit Decision List. This is distinct
// from `edl::Document`, the wire schema — `edl::Document::try_into_timeline`
// is where the two meet. Nothing in this module can represent an invalid
// timeline: construction goes through `Timeline::validate`, so once you hold
// a `Timeline` its invariants (non-overlapping clips per track, non-negative
// durations, in-range references) are guaranteed.

use crate::effect::CompiledEffect;
use std::fmt;

pub type TrackId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackType {
    Video,
    Audio,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EffectType {
    Brightness,
    Contrast,
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectType::Brightness => write!(f, "brightness"),
            EffectType::Contrast => write!(f, "contrast"),
        }
    }
}

/// A single linear keyframe-free effect application: one type, one strength
/// (unbounded; see `effect.rs` for each type's identity value). Compiled
/// once per distinct `(type, quantized strength)` pair into a
/// `CompiledEffect` LUT — see `effect.rs`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimpleEffect {
    pub kind: EffectType,
    pub strength: f64,
}

/// Constant affine transform applied to a clip's frames before compositing:
/// scale, then translate, then rotate about the frame center. No keyframing —
/// a single `Motion` holds for the clip's entire duration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Motion {
    pub scale_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
    pub rotate_degrees: f64,
}

impl Default for Motion {
    fn default() -> Self {
        Motion { scale_x: 1.0, scale_y: 1.0, translate_x: 0.0, translate_y: 0.0, rotate_degrees: 0.0 }
    }
}

impl Motion {
    pub fn is_identity(&self) -> bool {
        *self == Motion::default()
    }
}

/// Which elementary stream within a source file a `MediaSource::File` reads —
/// parsed from identifiers like `"V1"`/`"A2"` in the EDL (§3's "track id").
/// Distinct from the EDL's own timeline `TrackId`: this selects a stream
/// inside the referenced file, not a lane on the output timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceTrackKind {
    Video,
    Audio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceTrack {
    pub kind: SourceTrackKind,
    /// Zero-based index among streams of `kind` in the source file (so
    /// `"V2"` is index 1: the second video stream).
    pub index: usize,
}

impl Default for SourceTrack {
    fn default() -> Self {
        SourceTrack { kind: SourceTrackKind::Video, index: 0 }
    }
}

/// Parses a source-track identifier like `"V1"` or `"A2"`: a one-letter type
/// prefix followed by a 1-based stream number.
pub fn parse_source_track(id: &str) -> Result<SourceTrack, String> {
    let mut chars = id.chars();
    let kind = match chars.next() {
        Some('V') | Some('v') => SourceTrackKind::Video,
        Some('A') | Some('a') => SourceTrackKind::Audio,
        _ => return Err(format!("invalid source track id '{id}'")),
    };
    let rest: String = chars.collect();
    let n: usize = rest.parse().map_err(|_| format!("invalid source track number in '{id}'"))?;
    if n == 0 {
        return Err(format!("source track number must be >= 1, got '{id}'"));
    }
    Ok(SourceTrack { kind, index: n - 1 })
}

/// Where a clip's video/audio data comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaSource {
    /// A demuxable file path or URI, the in-source start time the clip's
    /// first frame should be read from, and which elementary stream in that
    /// file to decode (e.g. `"V1"` for the first video stream).
    File { uri: String, in_point: f64, source_track: SourceTrack },
}

/// A synthetic, sourceless clip: a flat color field for the clip's duration.
/// Distinguished from `MediaSource` at parse time by the presence of the
/// `type` field (see `edl.rs`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectSource {
    /// RGB, each channel 0-255.
    pub color: (u8, u8, u8),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Media(MediaSource),
    Generated(EffectSource),
}

/// One clip placed on a track at `[start, start + duration)` in output-timeline
/// seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    pub track: TrackId,
    pub start: f64,
    pub duration: f64,
    pub source: Source,
    pub motion: Motion,
    pub effects: Vec<SimpleEffect>,
    /// Linear fade-in length in seconds, from the clip's start.
    pub fade_in: f64,
    /// Linear fade-out length in seconds, ending at the clip's end.
    pub fade_out: f64,
}

impl Clip {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether `t` (output-timeline seconds) falls within this clip's span.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end()
    }

    /// Source-relative time for a given point on the output timeline. Only
    /// meaningful for `Source::Media` clips; playback rate is always 1.0 (no
    /// retiming in this version — see Non-goals).
    pub fn source_time(&self, t: f64) -> f64 {
        let offset = t - self.start;
        match &self.source {
            Source::Media(MediaSource::File { in_point, .. }) => in_point + offset,
            Source::Generated(_) => offset,
        }
    }

    /// Linear fade multiplier in `[0.0, 1.0]` at output-timeline time `t`,
    /// combining fade-in and fade-out. Clips shorter than `fade_in + fade_out`
    /// still produce a sane (if steep) ramp rather than clipping to silence.
    pub fn fade_multiplier(&self, t: f64) -> f64 {
        let since_start = (t - self.start).max(0.0);
        let until_end = (self.end() - t).max(0.0);
        let mut m = 1.0;
        if self.fade_in > 0.0 {
            m = m.min((since_start / self.fade_in).clamp(0.0, 1.0));
        }
        if self.fade_out > 0.0 {
            m = m.min((until_end / self.fade_out).clamp(0.0, 1.0));
        }
        m
    }
}

/// A full, validated Edit Decision List: output framing, track layout, and
/// placed clips.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    pub width: u32,
    pub height: u32,
    /// Output frame rate. First-class `f64` so NTSC rates (29.97, 23.976)
    /// round-trip exactly rather than being truncated to an integer.
    pub fps: f64,
    pub tracks: Vec<TrackType>,
    pub clips: Vec<Clip>,
}

impl Timeline {
    /// Output duration: the latest clip end across all tracks, or 0.0 for an
    /// empty timeline.
    pub fn duration(&self) -> f64 {
        self.clips.iter().map(Clip::end).fold(0.0, f64::max)
    }

    /// Total output frame count: `floor(duration * fps)`.
    pub fn frame_count(&self) -> u64 {
        (self.duration() * self.fps).floor() as u64
    }

    /// The clip active on `track` at output-timeline time `t`, if any.
    /// Non-overlap is a validated invariant, so at most one clip can match.
    pub fn active_clip(&self, track: TrackId, t: f64) -> Option<&Clip> {
        self.clips.iter().filter(|c| c.track == track).find(|c| c.contains(t))
    }

    /// Re-checks the structural invariants a `Timeline` must uphold. Called
    /// from `TryFrom<edl::Document>`, and safe to call again after any
    /// programmatic mutation (tests construct `Timeline` values directly and
    /// call this rather than going through the wire format).
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("output dimensions must be positive, got {}x{}", self.width, self.height));
        }
        if !(self.fps > 0.0) || !self.fps.is_finite() {
            return Err(format!("fps must be a positive finite number, got {}", self.fps));
        }
        for (i, clip) in self.clips.iter().enumerate() {
            if clip.duration <= 0.0 {
                return Err(format!("clip {i}: duration must be positive, got {}", clip.duration));
            }
            if clip.start < 0.0 {
                return Err(format!("clip {i}: start must be non-negative, got {}", clip.start));
            }
            if (self.track_index(clip.track)).is_none() {
                return Err(format!("clip {i}: references unknown track {}", clip.track));
            }
            if clip.fade_in < 0.0 || clip.fade_out < 0.0 {
                return Err(format!("clip {i}: fade durations must be non-negative"));
            }
            for eff in &clip.effects {
                if !eff.strength.is_finite() {
                    return Err(format!("clip {i}: {} strength {} is not finite", eff.kind, eff.strength));
                }
            }
        }
        for track in 0..self.tracks.len() as TrackId {
            let mut on_track: Vec<&Clip> = self.clips.iter().filter(|c| c.track == track).collect();
            on_track.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());
            for pair in on_track.windows(2) {
                if pair[0].end() > pair[1].start {
                    return Err(format!(
                        "track {track}: clips overlap ([{:.3}, {:.3}) and [{:.3}, {:.3}))",
                        pair[0].start, pair[0].end(), pair[1].start, pair[1].end()
                    ));
                }
            }
        }
        Ok(())
    }

    fn track_index(&self, track: TrackId) -> Option<usize> {
        let idx = track as usize;
        if idx < self.tracks.len() { Some(idx) } else { None }
    }
}

/// Resolves a clip's `SimpleEffect` list into the compiled LUTs the
/// Compositor applies, in declaration order. Kept here (rather than on
/// `Clip`) so `effect.rs` stays the single place that knows how to build a
/// `CompiledEffect` from a `SimpleEffect`.
pub fn compile_clip_effects(clip: &Clip, bit_depth: crate::effect::BitDepth) -> Vec<CompiledEffect> {
    clip.effects
        .iter()
        .map(|e| match e.kind {
            EffectType::Brightness => crate::effect::compile_brightness(e.strength, bit_depth),
            EffectType::Contrast => crate::effect::compile_contrast(e.strength, bit_depth),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(track: TrackId, start: f64, duration: f64) -> Clip {
        Clip {
            track,
            start,
            duration,
            source: Source::Generated(EffectSource { color: (0, 0, 0) }),
            motion: Motion::default(),
            effects: vec![],
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }

    #[test]
    fn overlapping_clips_on_same_track_rejected() {
        let tl = Timeline {
            width: 640,
            height: 360,
            fps: 30.0,
            tracks: vec![TrackType::Video],
            clips: vec![clip(0, 0.0, 2.0), clip(0, 1.0, 2.0)],
        };
        assert!(tl.validate().is_err());
    }

    #[test]
    fn adjacent_clips_on_same_track_allowed() {
        let tl = Timeline {
            width: 640,
            height: 360,
            fps: 30.0,
            tracks: vec![TrackType::Video],
            clips: vec![clip(0, 0.0, 2.0), clip(0, 2.0, 2.0)],
        };
        assert!(tl.validate().is_ok());
    }

    #[test]
    fn overlap_across_different_tracks_allowed() {
        let tl = Timeline {
            width: 640,
            height: 360,
            fps: 30.0,
            tracks: vec![TrackType::Video, TrackType::Video],
            clips: vec![clip(0, 0.0, 2.0), clip(1, 0.0, 2.0)],
        };
        assert!(tl.validate().is_ok());
    }

    #[test]
    fn frame_count_floors_rather_than_rounds() {
        let tl = Timeline {
            width: 640,
            height: 360,
            fps: 30.0,
            tracks: vec![TrackType::Video],
            clips: vec![clip(0, 0.0, 1.02)],
        };
        // 1.02 * 30 = 30.6 -> floor to 30, not round to 31.
        assert_eq!(tl.frame_count(), 30);
    }

    #[test]
    fn zero_length_clip_contributes_no_frames() {
        let tl = Timeline {
            width: 640,
            height: 360,
            fps: 30.0,
            tracks: vec![TrackType::Video],
            clips: vec![],
        };
        assert_eq!(tl.frame_count(), 0);
    }

    #[test]
    fn fade_multiplier_ramps_at_both_ends() {
        let mut c = clip(0, 0.0, 4.0);
        c.fade_in = 1.0;
        c.fade_out = 1.0;
        assert_eq!(c.fade_multiplier(0.0), 0.0);
        assert_eq!(c.fade_multiplier(2.0), 1.0);
        assert_eq!(c.fade_multiplier(4.0), 0.0);
    }

    #[test]
    fn unknown_track_reference_rejected() {
        let tl = Timeline {
            width: 640,
            height: 360,
            fps: 30.0,
            tracks: vec![TrackType::Video],
            clips: vec![clip(5, 0.0, 1.0)],
        };
        assert!(tl.validate().is_err());
    }
}
