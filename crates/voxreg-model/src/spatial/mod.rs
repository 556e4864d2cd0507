//! Spatial transforms: resizing, warping and velocity integration.
//!
//! # Module Structure
//!
//! ```text
//! spatial/
//! ├── resize.rs       - Shape-targeted separable linear resize
//! ├── warp.rs         - Displacement-field warping
//! └── integration.rs  - Scaling-and-squaring velocity integration
//! ```

pub mod integration;
pub mod resize;
pub mod warp;

pub use integration::{integrate_velocity, IntDvf, DEFAULT_INTEGRATION_STEPS};
pub use resize::{linear_resize_matrix, resize, resize_volume};
pub use warp::{warp, Warping};
