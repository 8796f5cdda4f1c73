//! Data model, time alignment and the benchmark/metric pipeline for
//! transaction cost analysis.
//!
//! The crate is storage-agnostic: market and trade data arrive through the
//! [`source::DataSource`] trait, are aligned with [`alignment`], and are
//! pushed through an ordered [`pipeline::Pipeline`].

pub mod alignment;
pub mod calendar;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod series;
pub mod source;
pub mod tz;

pub use errors::{ErrorClass, TcaError};
