use crate::error::{Error, Result};
use crate::media::PixelFormat;
use crate::time::{RTP_VIDEO_CLOCK, Rational};

/// Default stream title advertised in SDP `s=`.
pub const DEFAULT_TITLE: &str = "camrtp feed";

/// Dynamic RTP payload type used for H.264 (RFC 3551 §6).
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// Video codec carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
}

impl Codec {
    /// Encoding name for the SDP `a=rtpmap` attribute.
    pub fn rtp_name(&self) -> &'static str {
        match self {
            Self::H264 => "H264",
        }
    }
}

/// Immutable description of the single outbound video stream.
///
/// Built once per stream configuration and shared read-only (behind an
/// `Arc`) with every session, encoder and muxer derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    codec: Codec,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    frame_rate: u32,
    bit_rate: u32,
    codec_time_base: Rational,
    time_base: Rational,
    payload_type: u8,
    title: String,
}

impl StreamDescriptor {
    pub fn builder() -> StreamDescriptorBuilder {
        StreamDescriptorBuilder::default()
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Pixel format the encoder is opened with.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frames per second.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Target bit rate in bits per second.
    pub fn bit_rate(&self) -> u32 {
        self.bit_rate
    }

    /// Encoder time base, `1 / frame_rate`.
    pub fn codec_time_base(&self) -> Rational {
        self.codec_time_base
    }

    /// Time base of the output RTP stream.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Default for StreamDescriptor {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            pixel_format: PixelFormat::I420,
            width: 640,
            height: 480,
            frame_rate: 24,
            bit_rate: 800_000,
            codec_time_base: Rational::new(1, 24),
            time_base: RTP_VIDEO_CLOCK,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// Validating builder for [`StreamDescriptor`].
///
/// Starts from the default 640×480 / 24 fps / 800 kbit/s H.264 stream.
#[derive(Debug, Clone, Default)]
pub struct StreamDescriptorBuilder {
    inner: StreamDescriptor,
}

impl StreamDescriptorBuilder {
    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.inner.width = width;
        self.inner.height = height;
        self
    }

    /// Sets the frame rate and the matching `1/fps` codec time base.
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.inner.frame_rate = fps;
        self.inner.codec_time_base = Rational::new(1, fps.min(i32::MAX as u32) as i32);
        self
    }

    pub fn bit_rate(mut self, bps: u32) -> Self {
        self.inner.bit_rate = bps;
        self
    }

    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.inner.pixel_format = format;
        self
    }

    pub fn time_base(mut self, time_base: Rational) -> Self {
        self.inner.time_base = time_base;
        self
    }

    pub fn payload_type(mut self, pt: u8) -> Self {
        self.inner.payload_type = pt;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.inner.title = title.into();
        self
    }

    /// Validate and freeze the descriptor.
    ///
    /// Rejects zero or odd dimensions (4:2:0 chroma needs even sizes), a
    /// zero frame rate, a non-positive time base, a non-I420 encoder format,
    /// and payload types outside the 7-bit dynamic range 96–127.
    pub fn build(self) -> Result<StreamDescriptor> {
        let d = self.inner;

        if d.width == 0 || d.height == 0 || d.width % 2 != 0 || d.height % 2 != 0 {
            return Err(Error::Configuration(format!(
                "dimensions must be non-zero and even, got {}x{}",
                d.width, d.height
            )));
        }
        if d.frame_rate == 0 || !d.codec_time_base.is_valid_time_base() {
            return Err(Error::Configuration("frame rate must be positive".into()));
        }
        if !d.time_base.is_valid_time_base() {
            return Err(Error::Configuration(format!(
                "invalid output time base {}",
                d.time_base
            )));
        }
        if d.pixel_format != PixelFormat::I420 {
            return Err(Error::Configuration(format!(
                "encoder input must be I420, got {}",
                d.pixel_format
            )));
        }
        if !(96..=127).contains(&d.payload_type) {
            return Err(Error::Configuration(format!(
                "payload type {} outside dynamic range 96-127",
                d.payload_type
            )));
        }

        tracing::debug!(
            codec = ?d.codec,
            width = d.width,
            height = d.height,
            fps = d.frame_rate,
            bit_rate = d.bit_rate,
            time_base = %d.time_base,
            "stream descriptor created"
        );

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_legacy_stream() {
        let d = StreamDescriptor::builder().build().unwrap();
        assert_eq!((d.width(), d.height()), (640, 480));
        assert_eq!(d.frame_rate(), 24);
        assert_eq!(d.bit_rate(), 800_000);
        assert_eq!(d.codec_time_base(), Rational::new(1, 24));
        assert_eq!(d.time_base(), RTP_VIDEO_CLOCK);
        assert_eq!(d.title(), DEFAULT_TITLE);
    }

    #[test]
    fn frame_rate_sets_codec_time_base() {
        let d = StreamDescriptor::builder().frame_rate(30).build().unwrap();
        assert_eq!(d.codec_time_base(), Rational::new(1, 30));
    }

    #[test]
    fn rejects_odd_dimensions() {
        let err = StreamDescriptor::builder()
            .dimensions(641, 480)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_zero_frame_rate() {
        assert!(StreamDescriptor::builder().frame_rate(0).build().is_err());
    }

    #[test]
    fn rejects_semi_planar_encoder_input() {
        assert!(
            StreamDescriptor::builder()
                .pixel_format(PixelFormat::Nv21)
                .build()
                .is_err()
        );
    }

    #[test]
    fn rejects_static_payload_type() {
        assert!(StreamDescriptor::builder().payload_type(26).build().is_err());
    }
}
