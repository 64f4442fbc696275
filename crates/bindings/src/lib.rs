//! Handle-based surface over `camrtp` for foreign callers.
//!
//! Callers across a language boundary hold integers, not Rust values.
//! [`Bindings`] keeps every stream configuration and output session in a
//! generational [`HandleTable`] and hands out [`Handle`]s. A stale or
//! forged handle resolves to [`BindingError::InvalidHandle`], never to
//! another object's memory.
//!
//! ```no_run
//! use camrtp_bindings::Bindings;
//! use camrtp::PixelFormat;
//!
//! let bindings = Bindings::new();
//! let config = bindings.create_stream_config();
//! let info = bindings.create_session(config, "192.168.1.20", 5004, 0)?;
//! let frame = vec![0u8; PixelFormat::Nv21.frame_size(640, 480)];
//! bindings.submit_frame(info.handle, &frame, 41_667, PixelFormat::Nv21, 640, 480)?;
//! bindings.close_session(info.handle)?;
//! # Ok::<(), camrtp_bindings::BindingError>(())
//! ```

pub mod handle;

use std::sync::Arc;

use parking_lot::Mutex;

use camrtp::{
    FrameOutcome, OutputSession, PixelFormat, RtpUrl, SessionBuilder, StreamDescriptor,
    TransportStats, VideoEncoder,
};

pub use handle::{Handle, HandleTable};

pub type ConfigHandle = Handle<Arc<StreamDescriptor>>;
pub type SessionHandle = Handle<SharedSession>;

type SharedSession = Arc<Mutex<OutputSession>>;

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// The handle was never issued, or its object was already destroyed.
    #[error("invalid handle {0:#x}")]
    InvalidHandle(u64),

    #[error(transparent)]
    Core(#[from] camrtp::Error),
}

pub type Result<T> = std::result::Result<T, BindingError>;

/// What a caller needs to know about a freshly opened session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub handle: SessionHandle,
    pub rtp_port: u16,
    pub rtcp_port: u16,
}

/// Registry of stream configurations and output sessions.
///
/// Each table sits behind its own `parking_lot::Mutex`; a session's frame
/// path additionally holds that session's lock, so calls on one session
/// are serialized while different sessions proceed independently.
#[derive(Default)]
pub struct Bindings {
    configs: Mutex<HandleTable<Arc<StreamDescriptor>>>,
    sessions: Mutex<HandleTable<SharedSession>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default 640×480 / 24 fps / 800 kbit/s H.264 stream.
    pub fn create_stream_config(&self) -> ConfigHandle {
        self.register_stream_config(StreamDescriptor::default())
    }

    pub fn register_stream_config(&self, descriptor: StreamDescriptor) -> ConfigHandle {
        let handle = self.configs.lock().insert(Arc::new(descriptor));
        tracing::debug!(handle = ?handle, "stream config created");
        handle
    }

    /// SDP for a stream built from `config`, addressed to `host:port`.
    pub fn stream_config_sdp(&self, config: ConfigHandle, host: &str, port: u16) -> Result<String> {
        let descriptor = self.config(config)?;
        let destination = host
            .parse()
            .map_err(|_| camrtp::Error::Configuration(format!("not an IP address: {host}")))?;
        let media = camrtp::sdp::MediaDescription::from_descriptor(&descriptor, port);
        Ok(camrtp::sdp::session_description(
            descriptor.title(),
            &[media],
            destination,
        ))
    }

    /// Forget a stream configuration. Sessions already opened from it keep
    /// their own reference and are unaffected.
    pub fn destroy_stream_config(&self, config: ConfigHandle) -> Result<()> {
        self.configs
            .lock()
            .remove(config)
            .map(drop)
            .ok_or(BindingError::InvalidHandle(config.to_raw()))
    }

    /// Open a session streaming to `rtp://host:port`.
    ///
    /// `now_us` seeds the session clock, so the first frame's duration is
    /// measured from the moment the session was requested.
    pub fn create_session(
        &self,
        config: ConfigHandle,
        host: &str,
        port: u16,
        now_us: i64,
    ) -> Result<SessionInfo> {
        self.create_session_with_url(config, RtpUrl::new(host, port), now_us)
    }

    pub fn create_session_with_url(
        &self,
        config: ConfigHandle,
        url: RtpUrl,
        now_us: i64,
    ) -> Result<SessionInfo> {
        let descriptor = self.config(config)?;
        self.register_session(SessionBuilder::new(descriptor, url).start_time_us(now_us))
    }

    /// Open a session that compresses with `encoder` instead of the
    /// compiled-in backend (e.g. a platform hardware codec).
    pub fn create_session_with_encoder(
        &self,
        config: ConfigHandle,
        url: RtpUrl,
        now_us: i64,
        encoder: Box<dyn VideoEncoder>,
    ) -> Result<SessionInfo> {
        let descriptor = self.config(config)?;
        self.register_session(
            SessionBuilder::new(descriptor, url)
                .start_time_us(now_us)
                .encoder(encoder),
        )
    }

    fn register_session(&self, builder: SessionBuilder) -> Result<SessionInfo> {
        let session = builder.open()?;

        let rtp_port = session.local_rtp_port();
        let rtcp_port = session.local_rtcp_port();
        let handle = self.sessions.lock().insert(Arc::new(Mutex::new(session)));

        tracing::info!(handle = ?handle, rtp_port, rtcp_port, "session registered");

        Ok(SessionInfo {
            handle,
            rtp_port,
            rtcp_port,
        })
    }

    pub fn submit_frame(
        &self,
        session: SessionHandle,
        data: &[u8],
        frame_time_us: i64,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<FrameOutcome> {
        let shared = self.session(session)?;
        let mut guard = shared.lock();
        Ok(guard.submit_frame(data, frame_time_us, format, width, height)?)
    }

    /// [`submit_frame`](Self::submit_frame) with the format given as an
    /// Android `ImageFormat` constant (`NV21 = 0x11`).
    pub fn submit_android_frame(
        &self,
        session: SessionHandle,
        data: &[u8],
        frame_time_us: i64,
        image_format: i32,
        width: u32,
        height: u32,
    ) -> Result<FrameOutcome> {
        let format = PixelFormat::from_android_image_format(image_format).ok_or_else(|| {
            camrtp::Error::Configuration(format!("unsupported image format {image_format:#x}"))
        })?;
        self.submit_frame(session, data, frame_time_us, format, width, height)
    }

    /// Close a session. Returns `Ok(false)` if it was already closed.
    ///
    /// The handle stays valid for [`session_stats`](Self::session_stats)
    /// until [`destroy_session`](Self::destroy_session).
    pub fn close_session(&self, session: SessionHandle) -> Result<bool> {
        let shared = self.session(session)?;
        let closed = shared.lock().close();
        Ok(closed)
    }

    /// Close if needed and release the handle.
    pub fn destroy_session(&self, session: SessionHandle) -> Result<()> {
        let shared = self
            .sessions
            .lock()
            .remove(session)
            .ok_or(BindingError::InvalidHandle(session.to_raw()))?;
        shared.lock().close();
        Ok(())
    }

    pub fn session_stats(&self, session: SessionHandle) -> Result<TransportStats> {
        Ok(self.session(session)?.lock().stats().clone())
    }

    pub fn session_sdp(&self, session: SessionHandle) -> Result<String> {
        Ok(self.session(session)?.lock().sdp())
    }

    pub fn request_key_frame(&self, session: SessionHandle) -> Result<()> {
        self.session(session)?.lock().request_key_frame();
        Ok(())
    }

    fn config(&self, config: ConfigHandle) -> Result<Arc<StreamDescriptor>> {
        self.configs
            .lock()
            .get(config)
            .cloned()
            .ok_or(BindingError::InvalidHandle(config.to_raw()))
    }

    fn session(&self, session: SessionHandle) -> Result<SharedSession> {
        self.sessions
            .lock()
            .get(session)
            .cloned()
            .ok_or(BindingError::InvalidHandle(session.to_raw()))
    }
}

impl Drop for Bindings {
    fn drop(&mut self) {
        let sessions = self.sessions.get_mut().drain();
        if !sessions.is_empty() {
            tracing::debug!(count = sessions.len(), "closing sessions left open");
        }
        for session in sessions {
            session.lock().close();
        }
    }
}
