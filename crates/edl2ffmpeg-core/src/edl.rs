// crates/edl2ffmpeg-core/src/edl.rs
//
// The EDL wire schema (what `serde_json` parses directly) and its conversion
// into a validated `Timeline`. Kept separate from `timeline.rs` so the JSON
// shape can evolve (new optional fields, renamed keys) without touching the
// types the rest of the pipeline consumes.
//
// `SourceDoc` is the one place a `#[serde(untagged)]` enum would have been
// the obvious derive, but untagged enums try each variant in declaration
// order and swallow the real error on failure, which makes "what did I type
// wrong" unanswerable for a user hand-editing an EDL. Instead we look at the
// raw JSON object for a `type` key ourselves and dispatch explicitly.

use crate::error::EdlError;
use crate::timeline::{
    parse_source_track, Clip, EffectSource, EffectType, MediaSource, Motion, Source, SimpleEffect, Timeline, TrackType,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize, Debug)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub tracks: Vec<TrackDoc>,
    pub clips: Vec<ClipDoc>,
}

#[derive(Deserialize, Debug)]
pub struct TrackDoc {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Deserialize, Debug)]
pub struct ClipDoc {
    pub track: u32,
    pub start: f64,
    pub duration: f64,
    pub source: Value,
    #[serde(default)]
    pub motion: Option<MotionDoc>,
    #[serde(default)]
    pub effects: Vec<EffectDoc>,
    #[serde(default)]
    pub fade_in: f64,
    #[serde(default)]
    pub fade_out: f64,
}

#[derive(Deserialize, Debug)]
pub struct MotionDoc {
    #[serde(default = "one")]
    pub scale_x: f64,
    #[serde(default = "one")]
    pub scale_y: f64,
    #[serde(default)]
    pub translate_x: f64,
    #[serde(default)]
    pub translate_y: f64,
    #[serde(default)]
    pub rotate_degrees: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Deserialize, Debug)]
pub struct EffectDoc {
    #[serde(rename = "type")]
    pub kind: String,
    pub strength: f64,
}

#[derive(Deserialize, Debug)]
struct FileSourceDoc {
    uri: String,
    #[serde(default)]
    in_point: f64,
    #[serde(default = "default_source_track")]
    track: String,
}

fn default_source_track() -> String {
    "V1".to_string()
}

#[derive(Deserialize, Debug)]
struct EffectSourceDoc {
    /// `[r, g, b]`, each 0-255.
    color: [u8; 3],
}

/// Parse raw JSON text into a `Document`, with the JSON path of the first
/// error included where `serde_json` gives one.
pub fn parse_document(text: &str) -> Result<Document, EdlError> {
    serde_json::from_str(text).map_err(|e| EdlError::config("$", e.to_string()))
}

/// Parse and fully validate, producing a render-ready `Timeline`.
pub fn load_timeline(text: &str) -> Result<Timeline, EdlError> {
    let doc = parse_document(text)?;
    doc.try_into()
}

fn parse_source(path: &str, value: &Value) -> Result<Source, EdlError> {
    let obj = value
        .as_object()
        .ok_or_else(|| EdlError::config(path, "source must be a JSON object"))?;
    if obj.contains_key("type") {
        let es: EffectSourceDoc = serde_json::from_value(value.clone())
            .map_err(|e| EdlError::config(path, format!("generated source: {e}")))?;
        Ok(Source::Generated(EffectSource { color: (es.color[0], es.color[1], es.color[2]) }))
    } else {
        let fs: FileSourceDoc = serde_json::from_value(value.clone())
            .map_err(|e| EdlError::config(path, format!("media source: {e}")))?;
        let source_track = parse_source_track(&fs.track)
            .map_err(|m| EdlError::config(format!("{path}.track"), m))?;
        Ok(Source::Media(MediaSource::File { uri: fs.uri, in_point: fs.in_point, source_track }))
    }
}

fn parse_effect_type(path: &str, s: &str) -> Result<EffectType, EdlError> {
    match s {
        "brightness" => Ok(EffectType::Brightness),
        "contrast" => Ok(EffectType::Contrast),
        other => Err(EdlError::config(path, format!("unknown effect type '{other}'"))),
    }
}

fn parse_track_type(path: &str, s: &str) -> Result<TrackType, EdlError> {
    match s {
        "video" => Ok(TrackType::Video),
        "audio" => Ok(TrackType::Audio),
        other => Err(EdlError::config(path, format!("unknown track type '{other}'"))),
    }
}

impl TryFrom<Document> for Timeline {
    type Error = EdlError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let tracks = doc
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| parse_track_type(&format!("$.tracks[{i}].type"), &t.kind))
            .collect::<Result<Vec<_>, _>>()?;

        let clips = doc
            .clips
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let source = parse_source(&format!("$.clips[{i}].source"), &c.source)?;
                let motion = c
                    .motion
                    .as_ref()
                    .map(|m| Motion {
                        scale_x: m.scale_x,
                        scale_y: m.scale_y,
                        translate_x: m.translate_x,
                        translate_y: m.translate_y,
                        rotate_degrees: m.rotate_degrees,
                    })
                    .unwrap_or_default();
                let effects = c
                    .effects
                    .iter()
                    .enumerate()
                    .map(|(j, e)| {
                        Ok(SimpleEffect {
                            kind: parse_effect_type(&format!("$.clips[{i}].effects[{j}].type"), &e.kind)?,
                            strength: e.strength,
                        })
                    })
                    .collect::<Result<Vec<_>, EdlError>>()?;
                Ok(Clip {
                    track: c.track,
                    start: c.start,
                    duration: c.duration,
                    source,
                    motion,
                    effects,
                    fade_in: c.fade_in,
                    fade_out: c.fade_out,
                })
            })
            .collect::<Result<Vec<_>, EdlError>>()?;

        let timeline = Timeline { width: doc.width, height: doc.height, fps: doc.fps, tracks, clips };
        timeline.validate().map_err(|m| EdlError::config("$", m))?;
        Ok(timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "width": 640, "height": 360, "fps": 30,
            "tracks": [{"type": "video"}],
            "clips": [
                {
                    "track": 0, "start": 0.0, "duration": 2.0,
                    "source": {"uri": "file:///a.mp4", "in_point": 1.5},
                    "effects": [{"type": "brightness", "strength": 0.2}]
                },
                {
                    "track": 0, "start": 2.0, "duration": 1.0,
                    "source": {"type": "color", "color": [0, 0, 0]}
                }
            ]
        }"#
    }

    #[test]
    fn parses_media_and_generated_sources() {
        let tl = load_timeline(sample()).unwrap();
        assert_eq!(tl.clips.len(), 2);
        match &tl.clips[0].source {
            Source::Media(MediaSource::File { uri, in_point, .. }) => {
                assert_eq!(uri, "file:///a.mp4");
                assert_eq!(*in_point, 1.5);
            }
            other => panic!("expected media source, got {other:?}"),
        }
        match &tl.clips[1].source {
            Source::Generated(EffectSource { color }) => assert_eq!(*color, (0, 0, 0)),
            other => panic!("expected generated source, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_effect_type() {
        let bad = sample().replace("brightness", "sepia");
        assert!(load_timeline(&bad).is_err());
    }

    #[test]
    fn rejects_malformed_json_with_path_hint() {
        let err = load_timeline("{not json").unwrap_err();
        assert!(matches!(err, EdlError::Config { .. }));
    }

    #[test]
    fn missing_type_key_dispatches_to_media_source() {
        let doc = r#"{"uri": "x.mp4"}"#;
        let v: Value = serde_json::from_str(doc).unwrap();
        let s = parse_source("$.test", &v).unwrap();
        assert!(matches!(s, Source::Media(_)));
    }
}
