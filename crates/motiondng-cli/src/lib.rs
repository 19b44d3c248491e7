//! Shared utilities for the motiondng CLI.

pub mod options;

pub use options::{build_render_settings, parse_frame_range, RenderOptionArgs};
