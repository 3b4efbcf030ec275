//! Console-facing command surface.
//!
//! Thin orchestration over the domain modules: each handler normalizes its
//! payload (object form with camelCase/snake_case aliases, or a bare string
//! shorthand), then delegates with the caller's [`Identity`]. No state
//! lives here.
//!
//! [`Identity`]: crate::scope::Identity

pub mod deposits;
pub mod network;
pub mod reports;
pub mod sales;
