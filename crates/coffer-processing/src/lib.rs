//! Coffer Processing Library
//!
//! Preview rendering for the thumbnail pipeline: images are decoded and resampled
//! in-process, videos have a single frame captured with ffmpeg. Every preview is a
//! JPEG of a fixed width.

pub mod config;
pub mod image;
pub mod kind;
pub mod renderer;
pub mod video;

pub use config::ThumbnailRenderConfig;
pub use kind::MediaKind;
pub use renderer::{MediaThumbnailRenderer, ThumbnailRenderer};
