//! Raw picture handling: pixel formats, picture buffers, and conversion.
//!
//! Camera frames enter the pipeline here. A [`PixelConverter`] reformats
//! each frame into the session's [`Picture`], which the encoder then reads.

pub mod convert;
pub mod format;
pub mod picture;

pub use convert::PixelConverter;
pub use format::PixelFormat;
pub use picture::Picture;
