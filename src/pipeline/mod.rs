//! Pipeline stages for routing scanned images.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets a stage be swapped (e.g. another
//! recognizer) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ geometry ──▶ normalize ──▶ recognize ──▶ label ──▶ route
//! (snapshot) (crop box)  (binary mask)  (text lines)  (name)   (move)
//!
//!                         ── barrier: every image attempted ──
//!
//! group
//! (prefix → files)
//! ```
//!
//! 1. [`scan`]      — list the source folder once, before anything moves
//! 2. [`geometry`]  — derive the label band from the image height
//! 3. [`normalize`] — crop, grey and threshold to a binary mask
//! 4. [`recognize`] — run the text recognizer; the only external process
//! 5. [`label`]     — pick the first two- or three-word line
//! 6. [`route`]     — create `<source>/<label>/` and move the scan there
//! 7. [`group`]     — after routing, bucket folder contents by first letter

pub mod geometry;
pub mod group;
pub mod label;
pub mod normalize;
pub mod recognize;
pub mod route;
pub mod scan;
