//! Grid-aligned territory painting for shared tabletop scenes.
//!
//! Brush strokes are captured per client, committed as entries of a shared
//! per-scene history log, and written by a single authority GM. Every client
//! replays the log onto its own compositing surface.

pub mod logging;
pub mod overlay;
