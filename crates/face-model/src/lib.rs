//! talkpic Face Model
//!
//! Defines the core data contracts for an animation session:
//! - **Regions:** Fractional mouth/eye anchor rectangles chosen by the user
//! - **Detection:** Landmark-derived mouth geometry in image pixel space
//! - **Geometry:** Surface sizes, the letterbox fit transform, ellipses
//! - **Scene:** On-disk manifest tying an image, a track, and anchors together
//!
//! Anchor regions are stored as fractions of the rendering surface so they
//! stay valid across surface resizes.

pub mod detection;
pub mod geometry;
pub mod region;
pub mod scene;

pub use detection::*;
pub use geometry::*;
pub use region::*;
pub use scene::*;
