//! drm-still - put one raw frame on a display through legacy DRM/KMS
//!
//! No compositor, no GPU, no page flipping: a single CPU-mapped dumb buffer is
//! attached to the first usable output and stays there until the session is
//! dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   DisplaySession                     │
//! │   open → resolve → allocate → write → commit → close │
//! └──────────────────────────────────────────────────────┘
//!        │                 │                  │
//! ┌─────────────┐  ┌───────────────┐  ┌──────────────┐
//! │  resolver   │  │    buffer     │  │    writer    │
//! │ (connector, │  │ (dumb buffer, │  │ (raw bytes → │
//! │  CRTC, mode)│  │  fb, mapping) │  │   mapping)   │
//! └─────────────┘  └───────────────┘  └──────────────┘
//!        │                 │
//! ┌──────────────────────────────────────────────────────┐
//! │        KmsDevice (Card: /dev/dri/card* ioctls)       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use drm_still::{DisplaySession, OutputConfig};
//!
//! let mut session = DisplaySession::open(&OutputConfig::default())?;
//! session.clear(0xFF);
//! session.draw_image("frame.raw")?;
//! // ... the frame stays up until the session goes away
//! session.close();
//! ```

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod ioctl;
pub mod resolver;
pub mod session;
pub mod source;
pub mod writer;

pub use buffer::PixelBuffer;
pub use config::OutputConfig;
pub use device::{Card, KmsDevice};
pub use error::Error;
pub use format::PixelFormat;
pub use session::{DisplaySession, SessionState};

pub type Result<T> = std::result::Result<T, Error>;
