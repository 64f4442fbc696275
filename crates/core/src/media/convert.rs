//! Camera frame to encoder picture conversion.
//!
//! The converter reformats semi-planar camera output (NV21 on Android, NV12
//! on most V4L2 devices) or planar I420 into the I420 layout the encoder
//! consumes, resampling bilinearly when the camera resolution differs from
//! the stream resolution.
//!
//! Building a [`Scaler`] precomputes the per-column and per-row sample
//! positions for both luma and chroma. That work happens once per session:
//! source and destination geometry are fixed for the converter's lifetime,
//! and a call with different geometry is rejected rather than silently
//! rebuilding the tables.

use crate::error::{Error, Result};

use super::format::{PixelFormat, chroma_dimensions};
use super::picture::Picture;

/// Geometry a [`Scaler`] is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalerKey {
    pub src_format: PixelFormat,
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
}

/// Per-axis sample table: source index and 8-bit weight toward `index + 1`.
#[derive(Debug)]
struct Axis {
    index: Vec<u32>,
    frac: Vec<u8>,
    last: usize,
}

impl Axis {
    /// Center-aligned mapping of `dst_len` output samples onto `src_len` inputs.
    fn new(src_len: usize, dst_len: usize) -> Self {
        let mut index = Vec::with_capacity(dst_len);
        let mut frac = Vec::with_capacity(dst_len);
        let last = src_len - 1;

        for d in 0..dst_len {
            // 16.16 fixed point: (d + 0.5) * src / dst - 0.5
            let pos = ((2 * d + 1) as u64 * src_len as u64 * 65536) / (2 * dst_len as u64);
            let pos = pos.saturating_sub(32768);
            let mut i = (pos >> 16) as usize;
            let mut f = ((pos >> 8) & 0xff) as u8;
            if i >= last {
                i = last;
                f = 0;
            }
            index.push(i as u32);
            frac.push(f);
        }

        Self { index, frac, last }
    }
}

/// Where one source plane lives inside the raw frame.
#[derive(Debug, Clone, Copy)]
struct PlaneRef {
    offset: usize,
    stride: usize,
    step: usize,
}

/// Precomputed resampling context for one [`ScalerKey`].
#[derive(Debug)]
pub struct Scaler {
    key: ScalerKey,
    luma_x: Axis,
    luma_y: Axis,
    chroma_x: Axis,
    chroma_y: Axis,
}

impl Scaler {
    pub fn new(key: ScalerKey) -> Self {
        let (scw, sch) = chroma_dimensions(key.src_width, key.src_height);
        let (dcw, dch) = chroma_dimensions(key.dst_width, key.dst_height);

        tracing::debug!(
            src_format = %key.src_format,
            src = format_args!("{}x{}", key.src_width, key.src_height),
            dst = format_args!("{}x{}", key.dst_width, key.dst_height),
            "scaler created"
        );

        Self {
            luma_x: Axis::new(key.src_width as usize, key.dst_width as usize),
            luma_y: Axis::new(key.src_height as usize, key.dst_height as usize),
            chroma_x: Axis::new(scw, dcw),
            chroma_y: Axis::new(sch, dch),
            key,
        }
    }

    pub fn key(&self) -> ScalerKey {
        self.key
    }

    fn is_identity(&self) -> bool {
        self.key.src_width == self.key.dst_width && self.key.src_height == self.key.dst_height
    }

    /// Locate the Y, U and V planes of a raw source frame.
    fn source_planes(&self) -> (PlaneRef, PlaneRef, PlaneRef) {
        let w = self.key.src_width as usize;
        let luma = w * self.key.src_height as usize;
        let (cw, ch) = chroma_dimensions(self.key.src_width, self.key.src_height);
        let y = PlaneRef {
            offset: 0,
            stride: w,
            step: 1,
        };

        let semi = |u_first: bool| {
            let u = PlaneRef {
                offset: luma + if u_first { 0 } else { 1 },
                stride: cw * 2,
                step: 2,
            };
            let v = PlaneRef {
                offset: luma + if u_first { 1 } else { 0 },
                ..u
            };
            (u, v)
        };

        let (u, v) = match self.key.src_format {
            PixelFormat::Nv12 => semi(true),
            PixelFormat::Nv21 => semi(false),
            PixelFormat::I420 => (
                PlaneRef {
                    offset: luma,
                    stride: cw,
                    step: 1,
                },
                PlaneRef {
                    offset: luma + cw * ch,
                    stride: cw,
                    step: 1,
                },
            ),
        };
        (y, u, v)
    }

    /// Resample `src` into `dst`. Caller has validated sizes.
    fn run(&self, src: &[u8], dst: &mut Picture) {
        let (sy, su, sv) = self.source_planes();
        let dst_w = self.key.dst_width as usize;
        let (dcw, _) = chroma_dimensions(self.key.dst_width, self.key.dst_height);
        let identity = self.is_identity();
        let (y, u, v) = dst.planes_mut();

        if identity {
            copy_plane(src, sy, y, dst_w);
            copy_plane(src, su, u, dcw);
            copy_plane(src, sv, v, dcw);
        } else {
            scale_plane(src, sy, &self.luma_x, &self.luma_y, y, dst_w);
            scale_plane(src, su, &self.chroma_x, &self.chroma_y, u, dcw);
            scale_plane(src, sv, &self.chroma_x, &self.chroma_y, v, dcw);
        }
    }
}

fn copy_plane(src: &[u8], plane: PlaneRef, dst: &mut [u8], width: usize) {
    for (row, out) in dst.chunks_exact_mut(width).enumerate() {
        let base = plane.offset + row * plane.stride;
        if plane.step == 1 {
            out.copy_from_slice(&src[base..base + width]);
        } else {
            for (col, px) in out.iter_mut().enumerate() {
                *px = src[base + col * plane.step];
            }
        }
    }
}

fn scale_plane(src: &[u8], plane: PlaneRef, xs: &Axis, ys: &Axis, dst: &mut [u8], width: usize) {
    for (row, out) in dst.chunks_exact_mut(width).enumerate() {
        let y0 = ys.index[row] as usize;
        let y1 = (y0 + 1).min(ys.last);
        let fy = ys.frac[row] as u32;
        let r0 = plane.offset + y0 * plane.stride;
        let r1 = plane.offset + y1 * plane.stride;

        for (col, px) in out.iter_mut().enumerate() {
            let x0 = xs.index[col] as usize;
            let x1 = (x0 + 1).min(xs.last);
            let fx = xs.frac[col] as u32;

            let a = src[r0 + x0 * plane.step] as u32;
            let b = src[r0 + x1 * plane.step] as u32;
            let c = src[r1 + x0 * plane.step] as u32;
            let d = src[r1 + x1 * plane.step] as u32;

            let top = a * (256 - fx) + b * fx;
            let bottom = c * (256 - fx) + d * fx;
            *px = ((top * (256 - fy) + bottom * fy + 32768) >> 16) as u8;
        }
    }
}

/// Converts camera frames into the session's picture buffer.
///
/// Owns its [`Scaler`], created on the first call. Each session has its own
/// converter, so several sessions with different geometry can coexist.
#[derive(Debug, Default)]
pub struct PixelConverter {
    scaler: Option<Scaler>,
}

impl PixelConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached scaler's geometry, once the first frame has been converted.
    pub fn key(&self) -> Option<ScalerKey> {
        self.scaler.as_ref().map(Scaler::key)
    }

    /// Convert one raw frame into `dst`.
    ///
    /// Either `dst` is fully overwritten or an error is returned and `dst`
    /// is left untouched:
    ///
    /// - [`Error::Conversion`] if the source buffer is too short for its
    ///   declared format and dimensions.
    /// - [`Error::Configuration`] if the geometry differs from the first
    ///   call.
    pub fn convert(
        &mut self,
        src: &[u8],
        src_format: PixelFormat,
        src_width: u32,
        src_height: u32,
        dst: &mut Picture,
    ) -> Result<()> {
        if src_width == 0 || src_height == 0 {
            return Err(Error::Conversion(format!(
                "empty source frame {src_width}x{src_height}"
            )));
        }

        let needed = src_format.frame_size(src_width, src_height);
        if src.len() < needed {
            return Err(Error::Conversion(format!(
                "{src_format} {src_width}x{src_height} frame needs {needed} bytes, got {}",
                src.len()
            )));
        }

        let key = ScalerKey {
            src_format,
            src_width,
            src_height,
            dst_width: dst.width(),
            dst_height: dst.height(),
        };

        let scaler = self.scaler.get_or_insert_with(|| Scaler::new(key));
        if scaler.key != key {
            return Err(Error::Configuration(format!(
                "frame geometry changed mid-stream: {:?} -> {:?}",
                scaler.key, key
            )));
        }

        scaler.run(src, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a w×h NV21 frame with constant Y, U and V.
    fn nv21(w: u32, h: u32, y: u8, u: u8, v: u8) -> Vec<u8> {
        let mut buf = vec![y; (w * h) as usize];
        let (cw, ch) = chroma_dimensions(w, h);
        for _ in 0..cw * ch {
            buf.push(v);
            buf.push(u);
        }
        buf
    }

    #[test]
    fn nv21_same_size_deinterleaves() {
        let src = nv21(4, 4, 16, 100, 200);
        let mut dst = Picture::alloc(PixelFormat::I420, 4, 4).unwrap();
        let mut conv = PixelConverter::new();
        conv.convert(&src, PixelFormat::Nv21, 4, 4, &mut dst).unwrap();

        assert!(dst.y_plane().iter().all(|&p| p == 16));
        assert!(dst.u_plane().iter().all(|&p| p == 100));
        assert!(dst.v_plane().iter().all(|&p| p == 200));
    }

    #[test]
    fn nv12_chroma_order() {
        let mut src = vec![50u8; 4];
        src.extend_from_slice(&[10, 20]); // U, V
        let mut dst = Picture::alloc(PixelFormat::I420, 2, 2).unwrap();
        PixelConverter::new()
            .convert(&src, PixelFormat::Nv12, 2, 2, &mut dst)
            .unwrap();
        assert_eq!(dst.u_plane(), &[10]);
        assert_eq!(dst.v_plane(), &[20]);
    }

    #[test]
    fn downscale_preserves_flat_color() {
        let src = nv21(64, 48, 90, 60, 30);
        let mut dst = Picture::alloc(PixelFormat::I420, 32, 24).unwrap();
        PixelConverter::new()
            .convert(&src, PixelFormat::Nv21, 64, 48, &mut dst)
            .unwrap();
        assert!(dst.y_plane().iter().all(|&p| p == 90));
        assert!(dst.u_plane().iter().all(|&p| p == 60));
        assert!(dst.v_plane().iter().all(|&p| p == 30));
    }

    #[test]
    fn upscale_interpolates_between_columns() {
        // 2x2 luma: left column 0, right column 200
        let src: Vec<u8> = vec![0, 200, 0, 200, 128, 128, 128, 128, 128, 128];
        let mut dst = Picture::alloc(PixelFormat::I420, 4, 2).unwrap();
        PixelConverter::new()
            .convert(&src[..], PixelFormat::I420, 2, 2, &mut dst)
            .unwrap();
        let row = &dst.y_plane()[..4];
        assert_eq!(row[0], 0);
        assert_eq!(row[3], 200);
        assert!(row[1] > 0 && row[1] < row[2] && row[2] < 200, "{row:?}");
    }

    #[test]
    fn short_source_is_a_conversion_error_and_leaves_dst() {
        let src = vec![7u8; 10];
        let mut dst = Picture::alloc(PixelFormat::I420, 4, 4).unwrap();
        let err = PixelConverter::new()
            .convert(&src, PixelFormat::Nv21, 4, 4, &mut dst)
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
        assert!(dst.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn geometry_change_is_rejected() {
        let mut conv = PixelConverter::new();
        let mut dst = Picture::alloc(PixelFormat::I420, 4, 4).unwrap();
        conv.convert(&nv21(4, 4, 1, 2, 3), PixelFormat::Nv21, 4, 4, &mut dst)
            .unwrap();
        let err = conv
            .convert(&nv21(8, 8, 1, 2, 3), PixelFormat::Nv21, 8, 8, &mut dst)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(conv.key().unwrap().src_width, 4);
    }

    #[test]
    fn axis_identity_has_no_weights() {
        let axis = Axis::new(5, 5);
        assert_eq!(axis.index, vec![0, 1, 2, 3, 4]);
        assert!(axis.frac.iter().all(|&f| f == 0));
    }
}
