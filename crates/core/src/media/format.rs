use std::fmt;

/// Raw picture layouts understood by the converter and encoder.
///
/// All supported formats are 8-bit 4:2:0, so a `w×h` picture always carries
/// `w*h` luma samples and `2 * ceil(w/2) * ceil(h/2)` chroma samples; they
/// only differ in how chroma is laid out.
///
/// ```text
/// I420 : YYYY.... UU.. VV..          (three planes)
/// NV12 : YYYY.... UVUV....           (Y plane + interleaved Cb/Cr)
/// NV21 : YYYY.... VUVU....           (Y plane + interleaved Cr/Cb, Android camera default)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar Y, U, V (a.k.a. YUV420P). The encoder input format.
    I420,
    /// Semi-planar, Cb before Cr.
    Nv12,
    /// Semi-planar, Cr before Cb.
    Nv21,
}

impl PixelFormat {
    /// Bytes needed for one tightly packed `width × height` picture.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_dimensions(width, height);
        w * h + 2 * cw * ch
    }

    /// Map an Android `ImageFormat` constant to a pixel format.
    ///
    /// Only NV21 (`ImageFormat.NV21 = 0x11`), the guaranteed preview format,
    /// is recognized.
    pub fn from_android_image_format(code: i32) -> Option<Self> {
        match code {
            0x11 => Some(Self::Nv21),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I420 => "I420",
            Self::Nv12 => "NV12",
            Self::Nv21 => "NV21",
        };
        f.write_str(name)
    }
}

/// Dimensions of one chroma plane for a 4:2:0 picture.
pub fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}
