// crates/edl2ffmpeg-core/src/helpers/time.rs
//
// Shared time-formatting utilities for progress logging and diagnostics.

/// Format a duration in seconds as `HH:MM:SS:FF` at the given `fps`.
///
/// Used by the Timeline Driver's stage-progress log lines, where frame-level
/// precision matters and the frame rate is whatever the output timeline uses
/// (not a fixed 30 fps).
///
/// ```
/// use edl2ffmpeg_core::helpers::time::format_timecode;
/// assert_eq!(format_timecode(0.0, 30.0),   "00:00:00:00");
/// assert_eq!(format_timecode(61.5, 30.0),  "00:01:01:15");
/// ```
pub fn format_timecode(s: f64, fps: f64) -> String {
    let fps = fps.max(1.0);
    let total_frames = (s * fps).round() as u64;
    let frames_per_sec = fps.round().max(1.0) as u64;
    let sc_total = total_frames / frames_per_sec;
    let fr = total_frames % frames_per_sec;
    let h = sc_total / 3600;
    let m = (sc_total % 3600) / 60;
    let sc = sc_total % 60;
    format!("{h:02}:{m:02}:{sc:02}:{fr:02}")
}

/// Format a duration in seconds as a compact human-readable string.
///
/// | Range         | Format       | Example   |
/// |---------------|--------------|-----------|
/// | ≥ 3600 s      | `H:MM:SS`    | `1:04:35` |
/// | ≥ 60 s        | `M:SS`       | `3:07`    |
/// | < 60 s        | `S.Xs`       | `4.2s`    |
///
/// ```
/// use edl2ffmpeg_core::helpers::time::format_duration;
/// assert_eq!(format_duration(4.2),    "4.2s");
/// assert_eq!(format_duration(187.0),  "3:07");
/// assert_eq!(format_duration(3875.0), "1:04:35");
/// ```
pub fn format_duration(secs: f64) -> String {
    if secs >= 3600.0 {
        format!(
            "{}:{:02}:{:02}",
            secs as u64 / 3600,
            (secs as u64 % 3600) / 60,
            secs as u64 % 60,
        )
    } else if secs >= 60.0 {
        format!("{}:{:02}", secs as u64 / 60, secs as u64 % 60)
    } else {
        format!("{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timecode_wraps_hours() {
        assert_eq!(format_timecode(3599.0, 30.0), "00:59:59:00");
        assert_eq!(format_timecode(3600.0, 30.0), "01:00:00:00");
    }

    #[test]
    fn timecode_handles_fractional_fps() {
        // 23.976 fps: 1 second should still land near frame 24, not panic.
        let tc = format_timecode(1.0, 23.976);
        assert!(tc.starts_with("00:00:01:") || tc.starts_with("00:00:00:"));
    }
}
