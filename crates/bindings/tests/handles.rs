use std::net::UdpSocket;
use std::time::Duration;

use camrtp::codec::EncodedPicture;
use camrtp::{FrameOutcome, Picture, PixelFormat, RtpUrl, StreamDescriptor, VideoEncoder};
use camrtp_bindings::{BindingError, Bindings};

/// One tiny IDR per picture.
struct IdrEncoder;

impl VideoEncoder for IdrEncoder {
    fn encode(
        &mut self,
        _: &Picture,
        _: i64,
        out: &mut [u8],
    ) -> camrtp::Result<Option<EncodedPicture>> {
        out[..6].copy_from_slice(&[0, 0, 0, 1, 0x65, 0x88]);
        Ok(Some(EncodedPicture {
            size: 6,
            key_frame: true,
        }))
    }

    fn name(&self) -> &'static str {
        "idr"
    }
}

fn receiver() -> UdpSocket {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    sock
}

#[test]
fn session_lifecycle_through_handles() {
    let rx = receiver();
    let port = rx.local_addr().unwrap().port();

    let bindings = Bindings::new();
    let config = bindings.register_stream_config(
        StreamDescriptor::builder()
            .dimensions(32, 24)
            .build()
            .unwrap(),
    );
    let info = bindings
        .create_session_with_encoder(config, RtpUrl::new("127.0.0.1", port), 0, Box::new(IdrEncoder))
        .unwrap();
    assert_ne!(info.rtp_port, 0);
    assert_ne!(info.rtcp_port, 0);

    // The config can go away; the session holds its own reference.
    bindings.destroy_stream_config(config).unwrap();

    let frame = vec![0x40; PixelFormat::Nv21.frame_size(32, 24)];
    let outcome = bindings
        .submit_android_frame(info.handle, &frame, 41_667, 0x11, 32, 24)
        .unwrap();
    assert!(matches!(outcome, FrameOutcome::Sent(_)));

    let mut buf = [0u8; 1500];
    let n = rx.recv(&mut buf).unwrap();
    assert_eq!(buf[1] & 0x7F, 96);
    assert_eq!(&buf[12..n], &[0x65, 0x88]);

    let stats = bindings.session_stats(info.handle).unwrap();
    assert_eq!(stats.frames, 1);

    assert!(bindings.close_session(info.handle).unwrap());
    assert!(!bindings.close_session(info.handle).unwrap());
    assert!(matches!(
        bindings.submit_frame(info.handle, &frame, 83_333, PixelFormat::Nv21, 32, 24),
        Err(BindingError::Core(camrtp::Error::SessionClosed))
    ));

    bindings.destroy_session(info.handle).unwrap();
    assert!(matches!(
        bindings.close_session(info.handle),
        Err(BindingError::InvalidHandle(_))
    ));
}

#[test]
fn unsupported_android_format_is_a_configuration_error() {
    let rx = receiver();
    let port = rx.local_addr().unwrap().port();

    let bindings = Bindings::new();
    let config = bindings.create_stream_config();
    let info = bindings
        .create_session_with_encoder(config, RtpUrl::new("127.0.0.1", port), 0, Box::new(IdrEncoder))
        .unwrap();

    // ImageFormat.YUY2
    let err = bindings
        .submit_android_frame(info.handle, &[0u8; 16], 0, 0x14, 4, 2)
        .unwrap_err();
    assert!(matches!(
        err,
        BindingError::Core(camrtp::Error::Configuration(_))
    ));
}
