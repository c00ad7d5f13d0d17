//! Built-in programs of the two passes.
//!
//! - `geometry` writes the G-buffer (standard and animated water variants)
//! - `lighting` shades the G-buffer onto the visible target

pub mod geometry;
pub mod lighting;
