use crate::error::{Error, Result};

use super::format::{PixelFormat, chroma_dimensions};

/// A reusable I420 picture buffer.
///
/// One contiguous allocation holds the Y, U and V planes back to back with
/// tight strides. The buffer is sized once for the stream's output
/// dimensions and never resized; a session that needs a different size
/// must be torn down and recreated.
#[derive(Debug)]
pub struct Picture {
    data: Vec<u8>,
    width: u32,
    height: u32,
    u_offset: usize,
    v_offset: usize,
}

impl Picture {
    /// Allocate a zeroed picture.
    ///
    /// Allocation failure is reported as [`Error::Allocation`] instead of
    /// aborting the process.
    pub fn alloc(format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        if format != PixelFormat::I420 {
            return Err(Error::Configuration(format!(
                "picture buffers are I420, got {format}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(Error::Configuration(format!(
                "picture dimensions must be non-zero, got {width}x{height}"
            )));
        }

        let size = format.frame_size(width, height);
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Error::Allocation { bytes: size })?;
        data.resize(size, 0);

        let luma = width as usize * height as usize;
        let (cw, ch) = chroma_dimensions(width, height);

        tracing::debug!(width, height, bytes = size, "picture buffer allocated");

        Ok(Self {
            data,
            width,
            height,
            u_offset: luma,
            v_offset: luma + cw * ch,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::I420
    }

    /// Row strides of the Y, U and V planes.
    pub fn strides(&self) -> (usize, usize, usize) {
        let (cw, _) = chroma_dimensions(self.width, self.height);
        (self.width as usize, cw, cw)
    }

    pub fn y_plane(&self) -> &[u8] {
        &self.data[..self.u_offset]
    }

    pub fn u_plane(&self) -> &[u8] {
        &self.data[self.u_offset..self.v_offset]
    }

    pub fn v_plane(&self) -> &[u8] {
        &self.data[self.v_offset..]
    }

    /// Mutable access to all three planes at once.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let (y, chroma) = self.data.split_at_mut(self.u_offset);
        let (u, v) = chroma.split_at_mut(self.v_offset - self.u_offset);
        (y, u, v)
    }

    /// The whole buffer, planes in Y, U, V order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_layout() {
        let pic = Picture::alloc(PixelFormat::I420, 640, 480).unwrap();
        assert_eq!(pic.y_plane().len(), 640 * 480);
        assert_eq!(pic.u_plane().len(), 320 * 240);
        assert_eq!(pic.v_plane().len(), 320 * 240);
        assert_eq!(pic.strides(), (640, 320, 320));
        assert_eq!(pic.as_bytes().len(), 460_800);
    }

    #[test]
    fn planes_mut_are_disjoint() {
        let mut pic = Picture::alloc(PixelFormat::I420, 4, 2).unwrap();
        {
            let (y, u, v) = pic.planes_mut();
            y.fill(1);
            u.fill(2);
            v.fill(3);
        }
        assert_eq!(pic.as_bytes(), &[1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn rejects_semi_planar_and_empty() {
        assert!(matches!(
            Picture::alloc(PixelFormat::Nv21, 4, 4),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Picture::alloc(PixelFormat::I420, 0, 4),
            Err(Error::Configuration(_))
        ));
    }
}
