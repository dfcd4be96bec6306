// crates/edl2ffmpeg-core/src/frame.rs
//
// Frame pool and the `Frame` handle it hands out. Grounded on the aliasing
// rule the spec states for frame lifecycle: a frame handed to more than one
// consumer (the 3:2 pulldown repeat case, where one decoded source frame
// backs several output frame slots) must not let a write through one handle
// corrupt what another handle observes. The pool itself never aliases two
// *distinct* slots; aliasing only happens when a caller clones a `Frame`
// on purpose (the repeat case), and `Frame::planes_mut` is the single choke
// point that turns "more than one owner" into a private copy before handing
// out a mutable view.

use crate::error::EdlError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuv420p,
    Yuv420p10le,
    Rgb24,
}

impl PixelFormat {
    /// Plane count for this format (3 for planar YUV, 1 for packed RGB).
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yuv420p | PixelFormat::Yuv420p10le => 3,
            PixelFormat::Rgb24 => 1,
        }
    }

    fn bytes_per_sample(self) -> usize {
        match self {
            PixelFormat::Yuv420p10le => 2,
            PixelFormat::Yuv420p | PixelFormat::Rgb24 => 1,
        }
    }

    /// `(width, height)` of each plane given the frame's luma dimensions.
    fn plane_dims(self, width: u32, height: u32) -> Vec<(u32, u32)> {
        match self {
            PixelFormat::Yuv420p | PixelFormat::Yuv420p10le => {
                let cw = width.div_ceil(2);
                let ch = height.div_ceil(2);
                vec![(width, height), (cw, ch), (cw, ch)]
            }
            PixelFormat::Rgb24 => vec![(width * 3, height)],
        }
    }
}

/// Packed (not strided) plane storage — no padding between rows. The media
/// crate is responsible for stripping/reinstating `ffmpeg`'s line stride when
/// moving data in or out of a `Frame`.
#[derive(Clone)]
struct FrameData {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Vec<u8>>,
    pts: i64,
    /// Monotonically increasing identity assigned at `acquire()`, distinct
    /// from `pts`: two frames can share a `pts` (the 3:2 pulldown repeat
    /// case) but never a `seq`. Diagnostic/ordering use only.
    seq: u64,
}

impl FrameData {
    fn blank(width: u32, height: u32, format: PixelFormat, seq: u64) -> Self {
        let planes = format
            .plane_dims(width, height)
            .into_iter()
            .map(|(w, h)| vec![0u8; w as usize * h as usize * format.bytes_per_sample()])
            .collect();
        FrameData { width, height, format, planes, pts: 0, seq }
    }
}

/// A handle to pooled pixel storage. Cheap to `clone()` (an `Arc` bump) —
/// deliberately so, for the frame-repeat case — but any mutable access goes
/// through `ensure_writable`, which performs a private deep copy the moment
/// more than one handle is observed to reference the same storage.
#[derive(Clone)]
pub struct Frame {
    data: Arc<FrameData>,
    pool: Option<Arc<PoolInner>>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.data.width
    }

    pub fn height(&self) -> u32 {
        self.data.height
    }

    pub fn format(&self) -> PixelFormat {
        self.data.format
    }

    pub fn pts(&self) -> i64 {
        self.data.pts
    }

    /// This frame's pool-assigned sequence number (see `FrameData::seq`).
    pub fn seq(&self) -> u64 {
        self.data.seq
    }

    pub fn set_pts(&mut self, pts: i64) {
        // Timestamp metadata, not pixel data — not worth forcing a copy for.
        Arc::make_mut(&mut self.data).pts = pts;
    }

    pub fn planes(&self) -> &[Vec<u8>] {
        &self.data.planes
    }

    /// Returns a mutable view of this frame's planes, performing a private
    /// copy first if this handle is not the sole owner of its storage. This
    /// is the enforcement point for the "aliased frame forces a copy"
    /// invariant: two `Frame` values that share an `Arc` are indistinguishable
    /// from the caller's perspective until one of them calls this, at which
    /// point they silently diverge.
    pub fn planes_mut(&mut self) -> &mut [Vec<u8>] {
        &mut Arc::make_mut(&mut self.data).planes
    }

    /// Whether this handle currently shares storage with another `Frame`.
    /// Exposed for metrics/testing; not required for correctness since
    /// `planes_mut` copy-on-writes regardless.
    pub fn is_aliased(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            // Sole remaining owner: the backing storage can be recycled in
            // place, no allocation or copy needed.
            if let Some(data) = Arc::get_mut(&mut self.data) {
                pool.recycle(std::mem::replace(data, FrameData::empty()));
            }
        }
    }
}

impl FrameData {
    fn empty() -> Self {
        FrameData { width: 0, height: 0, format: PixelFormat::Rgb24, planes: Vec::new(), pts: 0, seq: 0 }
    }
}

struct PoolInner {
    free: Mutex<Vec<FrameData>>,
    width: u32,
    height: u32,
    format: PixelFormat,
    max_free: usize,
    metrics: Arc<crate::context::Metrics>,
    next_seq: AtomicU64,
}

impl PoolInner {
    fn recycle(&self, data: FrameData) {
        if (data.width, data.height, data.format) != (self.width, self.height, self.format) {
            return;
        }
        let mut free = self.free.lock().unwrap();
        if free.len() < self.max_free {
            free.push(data);
            self.metrics.pool_recycles.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

/// Allocates and recycles frame storage of one fixed `(width, height, format)`
/// shape. Over-subscription (more live frames than `capacity`) is allowed —
/// it just means allocation rather than reuse, logged once the free list
/// empties out so a caller sizing the pool too small finds out.
pub struct FramePool {
    inner: Arc<PoolInner>,
    ctx: crate::context::RenderContext,
    warned_oversubscribed: Mutex<bool>,
}

impl FramePool {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        capacity: usize,
        ctx: crate::context::RenderContext,
    ) -> Self {
        FramePool {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(capacity)),
                width,
                height,
                format,
                max_free: capacity,
                metrics: ctx.metrics.clone(),
                next_seq: AtomicU64::new(0),
            }),
            ctx,
            warned_oversubscribed: Mutex::new(false),
        }
    }

    /// Acquire a frame, reusing pooled storage if available. The returned
    /// frame's pixel contents are unspecified (stale from a previous use) —
    /// callers always write every plane before reading.
    pub fn acquire(&self) -> Result<Frame, EdlError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let reused = self.inner.free.lock().unwrap().pop();
        let mut data = match reused {
            Some(d) => d,
            None => {
                let mut warned = self.warned_oversubscribed.lock().unwrap();
                if !*warned {
                    self.ctx.warn(format!(
                        "frame pool ({}x{}) exhausted free list, allocating beyond capacity {}",
                        self.inner.width, self.inner.height, self.inner.max_free
                    ));
                    *warned = true;
                }
                self.ctx.metrics.pool_allocations.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                FrameData::blank(self.inner.width, self.inner.height, self.inner.format, seq)
            }
        };
        data.seq = seq;
        Ok(Frame { data: Arc::new(data), pool: Some(self.inner.clone()) })
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RenderContext;

    #[test]
    fn cloned_frame_write_does_not_corrupt_original() {
        let pool = FramePool::new(4, 4, PixelFormat::Rgb24, 2, RenderContext::new());
        let mut a = pool.acquire().unwrap();
        a.planes_mut()[0][0] = 10;
        let mut b = a.clone();
        assert!(b.is_aliased());
        b.planes_mut()[0][0] = 20;
        assert_eq!(a.planes()[0][0], 10);
        assert_eq!(b.planes()[0][0], 20);
    }

    #[test]
    fn recycled_storage_is_reused() {
        let pool = FramePool::new(4, 4, PixelFormat::Rgb24, 2, RenderContext::new());
        {
            let _f = pool.acquire().unwrap();
        }
        assert_eq!(pool.inner.free.lock().unwrap().len(), 1);
        let _f2 = pool.acquire().unwrap();
        assert_eq!(pool.inner.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn yuv420p_plane_dims_round_up_odd_dimensions() {
        let dims = PixelFormat::Yuv420p.plane_dims(5, 5);
        assert_eq!(dims, vec![(5, 5), (3, 3), (3, 3)]);
    }
}
