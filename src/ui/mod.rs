//! Presentation models handed to the caller's renderer
//!
//! Nothing here draws anything; the view produces these values and the page
//! decides how they look.

pub mod overlay;
pub mod popup;
