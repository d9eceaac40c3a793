//! Playlist generation module
//!
//! This module handles live HLS playlist generation:
//! - Master playlist (serving/master.m3u8) referencing audio, subtitle, and
//!   video tracks
//! - Media playlists (video/audio/subtitle) advertising a shared
//!   `#EXT-X-MEDIA-SEQUENCE` and sliding window of segments (§4.6)

pub mod master;
pub mod media;

pub use master::{render_master_playlist, write_master_playlist};
pub use media::{render_media_playlist, write_media_playlist};
