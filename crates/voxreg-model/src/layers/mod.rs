//! Building blocks shared by the backbones.
//!
//! # Module Structure
//!
//! ```text
//! layers/
//! ├── conv.rs     - ConvBlock, ResidualBlock
//! ├── down.rs     - DownSampleBlock (returns pooled and skip)
//! ├── up.rs       - UpSampleBlock with shape-targeted resize
//! └── extract.rs  - ResizeProject output head
//! ```

pub mod conv;
pub mod down;
pub mod extract;
pub mod up;

pub use conv::{ConvBlock, ConvBlockConfig, ResidualBlock, ResidualBlockConfig};
pub use down::{DownSampleBlock, DownSampleBlockConfig};
pub use extract::{ResizeProject, ResizeProjectConfig};
pub use up::{SkipFusion, UpSampleBlock, UpSampleBlockConfig};
