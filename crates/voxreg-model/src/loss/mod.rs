//! Loss functions.
//!
//! # Module Structure
//!
//! ```text
//! loss/
//! ├── image.rs   - lncc, gncc, ssd
//! ├── deform.rs  - bending energy, gradient norms
//! └── label.rs   - dice, jaccard, cross-entropy, mean-squared
//! ```

pub mod deform;
pub mod image;
pub mod label;

pub use deform::{bending_energy, gradient_l1_norm, gradient_l2_norm, local_displacement_energy};
pub use image::{global_ncc_loss, image_similarity_loss, local_ncc_loss, ssd_loss};
pub use label::{
    cross_entropy_loss, dice_loss, dice_score, jaccard_index, jaccard_loss, label_similarity_loss,
    mean_squared_loss,
};
