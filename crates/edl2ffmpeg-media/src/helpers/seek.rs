// crates/edl2ffmpeg-media/src/helpers/seek.rs
//
// Seek helper wrapping ffmpeg's avformat seek with consistent soft-fail
// behaviour. All seeks route through here rather than duplicating the
// guard + log pattern at every call site; the caller decides hard-error vs
// soft-fail.
//
// # Why backward seek (`..=seek_ts`)
// A forward seek (`seek_ts..`) lands on the keyframe AT OR AFTER `target_secs`.
// When `target_secs` falls mid-GOP, that forward keyframe may be several
// seconds away, so every source frame between `target_secs` and the keyframe
// is missing from the decode stream — the frame-rate conversion interprets the
// gap as slow motion and repeats the first available frame, producing a
// visible freeze.
//
// A backward seek lands on the keyframe BEFORE `target_secs`. The caller
// discards the resulting pre-roll frames by PTS, so the first emitted frame
// is still correctly at `target_secs`.
//
// # Why skip at 0.0
// `avformat_seek_file(max_ts=0)` can return EPERM on some platforms when
// called on a freshly-opened context. The demuxer starts at position 0 by
// default, so skipping the seek entirely is both correct and avoids the call.
use edl2ffmpeg_core::RenderContext;
use ffmpeg_the_third as ffmpeg;

/// Seek `ictx` to `target_secs` seconds from the start of the file.
///
/// Returns `true` if the seek succeeded (or was skipped because the target is
/// 0). Returns `false` if the seek failed — the demuxer decodes from wherever
/// it currently is, and the caller's PTS-based frame filtering skips pre-roll
/// frames correctly.
pub fn seek_to_secs(
    ictx: &mut ffmpeg::format::context::Input,
    target_secs: f64,
    label: &str,
    ctx: &RenderContext,
) -> bool {
    if target_secs <= 0.0 {
        return true;
    }

    let seek_ts = (target_secs * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    match ictx.seek(seek_ts, ..=seek_ts) {
        Ok(()) => true,
        Err(e) => {
            ctx.warn(format!(
                "{label}: seek soft-failed at {target_secs:.3}s ({e}) — decoding from \
                 current position, PTS filter will discard pre-roll"
            ));
            false
        }
    }
}
