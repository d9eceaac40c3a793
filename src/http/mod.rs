//! HTTP server module
//!
//! Serves the published HLS presentation (§6): the master playlist, per-track
//! media playlists, media segments, and WebVTT subtitle files, all read-only
//! and all CORS-enabled, plus `/health` and `/metrics`.

pub mod handlers;
pub mod routes;

pub use routes::create_router;
