/// Least-squares trend fit and forecast
pub mod estimator;

pub use estimator::{fit, TrendEstimator, TrendResult};
