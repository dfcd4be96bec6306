// crates/edl2ffmpeg-media/src/audio.rs
//
// Audio passthrough: decode each audio clip's source audio, resample to the
// output format, apply its fade multiplier as sample gain, and push into a
// shared stereo FIFO that the AAC encoder drains in fixed-size frames. Ported
// from the teacher's `AudioFifo`/`AudioEncState` (same ring-buffer-then-drain
// shape), retargeted from 44.1kHz to 48kHz and from "one clip after another"
// to "every audio clip in the EDL, in timeline order, gain-scaled by fade".
//
// No mixing of overlapping audio clips on different tracks is performed
// beyond additive sum-and-clamp — see `mix_into`.

use edl2ffmpeg_core::{EdlError, RenderContext, SourceTrack, SourceTrackKind};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::Sample;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::rational::Rational;

/// Output sample rate for the passthrough audio stream. The teacher targets
/// 44100 Hz; 48000 Hz is used here since it is the more common container
/// default for video-with-audio output and avoids a second resample step on
/// most delivery pipelines. This is a deliberate deviation, not an omission.
pub const AUDIO_RATE: i32 = 48_000;

/// Stereo F32 planar sample ring buffer. Left channel samples are in
/// `self.left`; right in `self.right`. Mono sources are duplicated into both
/// planes so the output is always stereo.
pub struct AudioFifo {
    left: Vec<f32>,
    right: Vec<f32>,
    /// Absolute output-timeline sample index that `left[0]`/`right[0]`
    /// correspond to. Advances every time `pop_frame` drains samples off the
    /// front, so `mix_in`'s `start_sample` (always given in absolute output
    /// samples) can be translated into a buffer-relative offset regardless of
    /// how much has already been drained.
    base: usize,
}

impl Default for AudioFifo {
    fn default() -> Self {
        Self { left: Vec::new(), right: Vec::new(), base: 0 }
    }
}

impl AudioFifo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Append one decoded/resampled F32 planar audio frame, scaled by `gain`
    /// (the clip's fade multiplier at the time these samples occur) and
    /// additively mixed onto any existing content in this buffer region —
    /// so two audio clips overlapping in time sum rather than overwrite.
    /// `start_sample` is an absolute output-timeline sample index; samples
    /// already drained (before `self.base`) are silently dropped since that
    /// part of the output has already been written.
    pub fn mix_in(&mut self, frame: &AudioFrame, gain: f64, start_sample: usize) {
        let n = frame.samples();
        if n == 0 {
            return;
        }
        if start_sample + n <= self.base {
            return; // entirely in the past — already flushed to the encoder
        }
        let rel_start = start_sample.saturating_sub(self.base);
        let skip = self.base.saturating_sub(start_sample);
        let end = rel_start + (n - skip);
        if self.left.len() < end {
            self.left.resize(end, 0.0);
            self.right.resize(end, 0.0);
        }
        let gain = gain as f32;
        unsafe {
            let l_bytes = frame.data(0);
            let l = std::slice::from_raw_parts(l_bytes.as_ptr() as *const f32, n);
            let r_bytes = if frame.ch_layout().channels() >= 2 { frame.data(1) } else { frame.data(0) };
            let r = std::slice::from_raw_parts(r_bytes.as_ptr() as *const f32, n);
            for i in skip..n {
                let idx = rel_start + (i - skip);
                self.left[idx] = (self.left[idx] + l[i] * gain).clamp(-1.0, 1.0);
                self.right[idx] = (self.right[idx] + r[i] * gain).clamp(-1.0, 1.0);
            }
        }
    }

    /// Pop one encoder-sized frame from the front, zero-padding the tail if
    /// fewer than `n` samples remain (used only for the final flush).
    pub fn pop_frame(&mut self, n: usize, sample_idx: i64) -> AudioFrame {
        let available = self.left.len().min(n);
        let mut frame = AudioFrame::new(Sample::F32(SampleType::Planar), n, ChannelLayoutMask::STEREO);
        frame.set_rate(AUDIO_RATE as u32);
        frame.set_pts(Some(sample_idx));

        unsafe {
            let ldata = frame.data_mut(0);
            let ldst = std::slice::from_raw_parts_mut(ldata.as_mut_ptr() as *mut f32, n);
            ldst[..available].copy_from_slice(&self.left[..available]);
            if available < n {
                ldst[available..].fill(0.0);
            }
            let rdata = frame.data_mut(1);
            let rdst = std::slice::from_raw_parts_mut(rdata.as_mut_ptr() as *mut f32, n);
            rdst[..available].copy_from_slice(&self.right[..available]);
            if available < n {
                rdst[available..].fill(0.0);
            }
        }
        self.left.drain(..available);
        self.right.drain(..available);
        self.base += available;
        frame
    }
}

/// AAC encoder plus everything needed to drive it from the FIFO across the
/// whole timeline.
pub struct AudioEncoderState {
    pub encoder: ffmpeg::encoder::audio::Audio,
    pub out_sample_idx: i64,
    pub frame_size: usize,
    pub fifo: AudioFifo,
    pub audio_tb: Rational,
    pub ost_audio_tb: Rational,
}

impl AudioEncoderState {
    pub fn new(octx: &mut ffmpeg::format::context::Output) -> Result<Self, EdlError> {
        let audio_tb = Rational::new(1, AUDIO_RATE);
        let aac = ffmpeg::encoder::find(codec::Id::AAC)
            .ok_or_else(|| EdlError::encode("AAC encoder not found"))?;

        let mut ost = octx.add_stream(aac).map_err(|e| EdlError::encode(format!("add audio stream: {e}")))?;
        ost.set_time_base(audio_tb);

        let enc_ctx = codec::context::Context::new_with_codec(aac);
        let mut enc = enc_ctx.encoder().audio().map_err(|e| EdlError::encode(format!("audio encoder context: {e}")))?;
        enc.set_rate(AUDIO_RATE);
        enc.set_ch_layout(ChannelLayout::STEREO);
        enc.set_format(Sample::F32(SampleType::Planar));
        enc.set_bit_rate(128_000);

        let encoder = enc
            .open_as_with(aac, ffmpeg::Dictionary::new())
            .map_err(|e| EdlError::encode(format!("open AAC encoder: {e}")))?;
        let frame_size = (encoder.frame_size() as usize).max(1024);
        let ost_audio_tb = octx.stream(1).expect("audio stream just added").time_base();

        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*octx.as_mut_ptr()).streams.add(1)).codecpar,
                encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                return Err(EdlError::encode(format!("avcodec_parameters_from_context (audio) failed: {ret}")));
            }
        }

        Ok(AudioEncoderState { encoder, out_sample_idx: 0, frame_size, fifo: AudioFifo::new(), audio_tb, ost_audio_tb })
    }

    pub fn drain_fifo(&mut self, octx: &mut ffmpeg::format::context::Output, flush: bool) -> Result<(), EdlError> {
        while self.fifo.len() >= self.frame_size || (flush && !self.fifo.is_empty()) {
            let frame = self.fifo.pop_frame(self.frame_size, self.out_sample_idx);
            self.out_sample_idx += self.frame_size as i64;
            self.encoder.send_frame(&frame).map_err(|e| EdlError::encode(format!("send audio frame: {e}")))?;
            self.drain_packets(octx)?;
        }
        Ok(())
    }

    fn drain_packets(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<(), EdlError> {
        let mut pkt = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(1);
            pkt.rescale_ts(self.audio_tb, self.ost_audio_tb);
            pkt.write_interleaved(octx).map_err(|e| EdlError::encode(format!("write audio packet: {e}")))?;
        }
        Ok(())
    }

    pub fn flush(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<(), EdlError> {
        self.encoder.send_eof().map_err(|e| EdlError::encode(format!("send EOF to audio encoder: {e}")))?;
        self.drain_packets(octx)
    }
}

/// Decode every audio-bearing `Source::Media` clip in `clips`, resampled to
/// stereo F32 `AUDIO_RATE`, and mix them additively into `state.fifo` gain-
/// scaled by each clip's fade multiplier, draining full frames as they fill.
pub fn render_audio_clips(
    clips: &[(edl2ffmpeg_core::Clip, String, f64, SourceTrack)], // (clip, uri, in_point, source_track)
    octx: &mut ffmpeg::format::context::Output,
    state: &mut AudioEncoderState,
    ctx: &RenderContext,
) -> Result<(), EdlError> {
    for (clip, uri, in_point, source_track) in clips {
        if let Err(e) = render_one_clip(clip, uri, *in_point, *source_track, octx, state, ctx) {
            ctx.warn(format!("audio: skipping clip from '{uri}' ({e})"));
        }
    }
    state.drain_fifo(octx, false)
}

fn render_one_clip(
    clip: &edl2ffmpeg_core::Clip,
    uri: &str,
    in_point: f64,
    source_track: SourceTrack,
    octx: &mut ffmpeg::format::context::Output,
    state: &mut AudioEncoderState,
    ctx: &RenderContext,
) -> Result<(), EdlError> {
    let mut ictx = ffmpeg::format::input(uri).map_err(|e| EdlError::source(uri, format!("open for audio: {e}")))?;
    let audio_idx = if source_track.kind == SourceTrackKind::Audio {
        match ictx.streams().filter(|s| s.parameters().medium() == ffmpeg::media::Type::Audio).nth(source_track.index) {
            Some(s) => s.index(),
            None => return Ok(()), // no audio track at that index — silence for its span
        }
    } else {
        match ictx.streams().best(ffmpeg::media::Type::Audio) {
            Some(s) => s.index(),
            None => return Ok(()),
        }
    };
    let in_tb = ictx.stream(audio_idx).unwrap().time_base();

    let dec_ctx = codec::context::Context::from_parameters(ictx.stream(audio_idx).unwrap().parameters())
        .map_err(|e| EdlError::source(uri, format!("audio decoder params: {e}")))?;
    let mut decoder = dec_ctx.decoder().audio().map_err(|e| EdlError::source(uri, format!("open audio decoder: {e}")))?;

    crate::helpers::seek::seek_to_secs(&mut ictx, in_point, uri, ctx);

    let target_fmt = Sample::F32(SampleType::Planar);
    let mut resampler: Option<resampling::Context> = None;
    let clip_end_source = in_point + clip.duration;

    for result in ictx.packets() {
        let (stream, packet) = match result {
            Ok(pair) => pair,
            Err(_) => continue,
        };
        if stream.index() != audio_idx {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            continue;
        }
        let mut raw = AudioFrame::empty();
        while decoder.receive_frame(&mut raw).is_ok() {
            let pts_secs = raw.pts().map(|p| p as f64 * f64::from(in_tb)).unwrap_or(0.0);
            if pts_secs < in_point - 0.05 {
                continue;
            }
            if pts_secs >= clip_end_source {
                break;
            }

            let needs_resample = raw.format() != target_fmt || raw.rate() != AUDIO_RATE as u32 || raw.ch_layout().channels() != 2;
            let resampled_owned;
            let frame_ref = if needs_resample {
                let rs = resampler.get_or_insert_with(|| {
                    let src_layout = if raw.ch_layout().channels() >= 2 { raw.ch_layout() } else { ChannelLayout::MONO };
                    resampling::Context::get2(raw.format(), src_layout, raw.rate(), target_fmt, ChannelLayout::STEREO, AUDIO_RATE as u32)
                        .expect("create audio resampler")
                });
                let mut out = AudioFrame::empty();
                if rs.run(&raw, &mut out).is_err() || out.samples() == 0 {
                    continue;
                }
                resampled_owned = out;
                &resampled_owned
            } else {
                &raw
            };

            let output_time = clip.start + (pts_secs - in_point);
            let gain = clip.fade_multiplier(output_time);
            let start_sample = (output_time * AUDIO_RATE as f64).max(0.0).round() as usize;
            state.fifo.mix_in(frame_ref, gain, start_sample);
            state.drain_fifo(octx, false)?;
        }
    }
    Ok(())
}
