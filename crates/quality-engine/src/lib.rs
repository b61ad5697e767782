pub mod propagate;
pub mod scoring;
pub mod types;

pub use propagate::propagate_to_derived;
pub use scoring::score;
pub use types::{QualityLevel, QualityReport};
