pub mod evaluator;
pub mod registry;
pub mod types;

pub use evaluator::IndicatorEvaluator;
pub use registry::{IndicatorCalculator, IndicatorRegistry};
pub use types::{warmup_bars, IndicatorConfig, IndicatorValue};
