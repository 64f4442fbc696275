//! H.264 backend on Cisco's OpenH264.
//!
//! OpenH264 emits Annex B byte streams with SPS/PPS in front of every IDR,
//! which is what the RTP packetizer expects. It never reorders frames, but
//! rate control may skip a picture; skipped pictures surface as
//! `Ok(None)`.

use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType, UsageType};
use openh264::formats::YUVSlices;

use super::{EncodedPicture, VideoEncoder};
use crate::error::{EncodeErrorKind, Error, Result};
use crate::media::Picture;
use crate::stream::StreamDescriptor;

pub struct OpenH264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
}

impl OpenH264Encoder {
    pub fn new(descriptor: &StreamDescriptor) -> Result<Self> {
        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(descriptor.bit_rate()))
            .max_frame_rate(FrameRate::from_hz(descriptor.frame_rate() as f32))
            .skip_frames(true)
            .usage_type(UsageType::CameraVideoRealTime);

        let encoder = Encoder::with_api_config(openh264::OpenH264API::from_source(), config)
            .map_err(|e| Error::Encode(EncodeErrorKind::Codec(format!("openh264 init: {e:?}"))))?;

        tracing::info!(
            width = descriptor.width(),
            height = descriptor.height(),
            bit_rate = descriptor.bit_rate(),
            fps = descriptor.frame_rate(),
            "OpenH264 encoder created"
        );

        Ok(Self {
            encoder,
            width: descriptor.width(),
            height: descriptor.height(),
        })
    }
}

impl VideoEncoder for OpenH264Encoder {
    fn encode(
        &mut self,
        picture: &Picture,
        _pts: i64,
        out: &mut [u8],
    ) -> Result<Option<EncodedPicture>> {
        let yuv = YUVSlices::new(
            (picture.y_plane(), picture.u_plane(), picture.v_plane()),
            (self.width as usize, self.height as usize),
            picture.strides(),
        );

        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| Error::Encode(EncodeErrorKind::Codec(format!("{e:?}"))))?;

        let frame_type = bitstream.frame_type();
        if matches!(frame_type, FrameType::Skip | FrameType::Invalid) {
            tracing::trace!(?frame_type, "OpenH264 produced no output");
            return Ok(None);
        }

        let data = bitstream.to_vec();
        if data.len() > out.len() {
            return Err(Error::Encode(EncodeErrorKind::BufferOverflow {
                needed: data.len(),
                capacity: out.len(),
            }));
        }
        out[..data.len()].copy_from_slice(&data);

        Ok(Some(EncodedPicture {
            size: data.len(),
            key_frame: matches!(frame_type, FrameType::IDR | FrameType::I),
        }))
    }

    fn force_key_frame(&mut self) {
        self.encoder.force_intra_frame();
    }

    fn name(&self) -> &'static str {
        "openh264"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::PixelFormat;

    #[test]
    fn first_picture_is_an_idr_with_parameter_sets() {
        let desc = StreamDescriptor::builder()
            .dimensions(64, 64)
            .build()
            .unwrap();
        let mut enc = OpenH264Encoder::new(&desc).unwrap();
        let mut pic = Picture::alloc(PixelFormat::I420, 64, 64).unwrap();
        {
            let (y, u, v) = pic.planes_mut();
            y.fill(100);
            u.fill(128);
            v.fill(128);
        }
        let mut out = vec![0u8; 200_000];

        let encoded = enc.encode(&pic, 0, &mut out).unwrap().unwrap();
        assert!(encoded.key_frame);
        let data = &out[..encoded.size];
        assert!(data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1]));
        // SPS (type 7) appears before the first slice.
        let start = if data[2] == 1 { 3 } else { 4 };
        assert_eq!(data[start] & 0x1F, 7);
    }
}
