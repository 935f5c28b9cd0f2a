//! Row-level transforms applied between load and write.
//!
//! Stages are polars lazy plans: each one takes a [`LazyFrame`] and extends
//! it, and [`resample::resample`] collects the final plan with the engine the
//! caller picks. Whole-frame statistics such as the outlier quartiles are
//! collected from the same plan before the stages that need them.
//!
//! [`LazyFrame`]: polars::prelude::LazyFrame

pub mod aggregate;
pub mod diff;
pub mod filter;
pub mod outliers;
pub mod resample;

pub use aggregate::Aggregation;
pub use resample::Frequency;
