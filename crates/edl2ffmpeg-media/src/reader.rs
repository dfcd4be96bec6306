// crates/edl2ffmpeg-media/src/reader.rs
//
// SourceReader: a persistent per-clip decoder, so the Timeline Driver can
// pull consecutive output frames from the same clip without reopening the
// file or reseeking on every call. Grounded on the teacher's `LiveDecoder`
// (stateful per-clip decode for scrubbing/playback) — the same open-once,
// seek-on-jump, decode-forward-otherwise shape, but producing pool `Frame`s
// in YUV420P instead of RGBA scratch buffers for preview.

use crate::helpers::{seek::seek_to_secs, yuv::copy_from_ffmpeg};
use crate::scale::ScalerCache;
use edl2ffmpeg_core::{EdlError, Frame, FramePool, RenderContext, SourceTrack, SourceTrackKind};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;

/// How many consecutive decode failures (bad packets, decoder errors) a
/// source tolerates before the render aborts with a `Source` error. A
/// transient glitch recovers; a truly broken stream gives up rather than
/// spinning forever.
const MAX_CONSECUTIVE_FAILURES: u32 = 16;

pub struct SourceReader {
    uri: String,
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::video::Video,
    video_idx: usize,
    display_w: u32,
    display_h: u32,
    /// Source-time seconds of the last frame decoded, used to decide whether
    /// the next requested time is a forward read (no seek needed) or a jump
    /// (seek required). `None` before the first decode.
    last_emitted_at: Option<f64>,
}

impl SourceReader {
    pub fn open(uri: &str, source_track: SourceTrack, ctx: &RenderContext) -> Result<Self, EdlError> {
        if source_track.kind != SourceTrackKind::Video {
            return Err(EdlError::source(uri, "video reader requested for a non-video source track"));
        }
        let ictx = input(uri).map_err(|e| EdlError::source(uri, format!("open failed: {e}")))?;
        let video_idx = ictx
            .streams()
            .filter(|s| s.parameters().medium() == Type::Video)
            .nth(source_track.index)
            .ok_or_else(|| EdlError::source(uri, format!("no video stream at index {}", source_track.index)))?
            .index();

        let (display_w, display_h) = {
            let stream = ictx.stream(video_idx).unwrap();
            let params = stream.parameters();
            (params.width(), params.height())
        };
        if display_w == 0 || display_h == 0 {
            return Err(EdlError::source(uri, "video stream has zero dimensions"));
        }

        // Re-open for decoder construction: `Parameters` borrows from the
        // stream, and building the decoder context from it while also
        // iterating packets on the same `Input` runs into a borrow conflict.
        let ictx2 = input(uri).map_err(|e| EdlError::source(uri, format!("reopen failed: {e}")))?;
        let stream2 = ictx2.stream(video_idx).unwrap();
        let dec_ctx = ffmpeg::codec::context::Context::from_parameters(stream2.parameters())
            .map_err(|e| EdlError::source(uri, format!("decoder params: {e}")))?;
        let decoder = dec_ctx
            .decoder()
            .video()
            .map_err(|e| EdlError::source(uri, format!("open decoder: {e}")))?;

        ctx.stage("decode", format!("opened '{uri}' ({display_w}x{display_h})"));
        Ok(SourceReader { uri: uri.to_string(), ictx, decoder, video_idx, display_w, display_h, last_emitted_at: None })
    }

    pub fn display_dims(&self) -> (u32, u32) {
        (self.display_w, self.display_h)
    }

    /// Decode the frame at `source_time` (seconds into this source), scaled
    /// to `(out_w, out_h)` YUV420P and written into a pool frame.
    ///
    /// Forward requests close to the last emitted time decode sequentially;
    /// anything else triggers a keyframe-aligned backward seek followed by a
    /// burn-through of the pre-roll (decode without scaling/alloc until the
    /// target PTS is reached).
    pub fn decode_at(
        &mut self,
        source_time: f64,
        out_w: u32,
        out_h: u32,
        pool: &FramePool,
        scalers: &mut ScalerCache,
        ctx: &RenderContext,
    ) -> Result<Frame, EdlError> {
        let needs_seek = match self.last_emitted_at {
            Some(last) => source_time < last || source_time - last > 1.0,
            None => true,
        };
        if needs_seek {
            seek_to_secs(&mut self.ictx, source_time, &self.uri, ctx);
        }

        let tb = self.ictx.stream(self.video_idx).unwrap().time_base();
        let target_pts = (source_time * f64::from(tb).recip()) as i64;
        let half_frame_secs = 1.0 / 240.0; // generous slop vs. an output frame boundary

        let mut consecutive_failures = 0u32;
        loop {
            let packet = match self.next_video_packet() {
                Some(p) => p,
                None => {
                    // EOF: hold the last decoded content by re-emitting black
                    // would hide real problems, so this is a hard source error.
                    return Err(EdlError::source(&self.uri, format!("no frame available at {source_time:.3}s")));
                }
            };
            if self.decoder.send_packet(&packet).is_err() {
                consecutive_failures += 1;
                ctx.metrics.decode_retries.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if consecutive_failures > MAX_CONSECUTIVE_FAILURES {
                    return Err(EdlError::source(&self.uri, "too many consecutive decode failures"));
                }
                continue;
            }
            let mut decoded = ffmpeg::util::frame::video::Video::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.pts().unwrap_or(target_pts);
                let pts_secs = pts as f64 * f64::from(tb);
                if needs_seek && pts_secs < source_time - half_frame_secs {
                    // Burn-through: discard pre-roll without scaling.
                    continue;
                }

                let scaler = scalers.get_or_create(decoded.format(), self.display_w, self.display_h, Pixel::YUV420P, out_w, out_h)?;
                let mut scaled = ffmpeg::util::frame::video::Video::empty();
                scaler
                    .run(&decoded, &mut scaled)
                    .map_err(|e| EdlError::convert(format!("scale frame from '{}': {e}", self.uri)))?;

                let mut frame = pool.acquire()?;
                copy_from_ffmpeg(&mut frame, &scaled);
                self.last_emitted_at = Some(pts_secs);
                return Ok(frame);
            }
        }
    }

    fn next_video_packet(&mut self) -> Option<ffmpeg::Packet> {
        for result in self.ictx.packets() {
            let (stream, packet) = match result {
                Ok(pair) => pair,
                Err(_) => continue,
            };
            if stream.index() == self.video_idx {
                return Some(packet);
            }
        }
        None
    }
}
