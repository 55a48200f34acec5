//! Error types surfaced by the training API.
//!
//! Only configuration and input problems are recoverable and reported to
//! the caller. Running out of the node budget during a split is handled
//! locally by turning the offending node into a leaf, and broken internal
//! invariants panic: they are programming errors, not runtime conditions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    /// The dataset does not conform to what the selected cost function
    /// needs: empty features, mismatched column lengths, class weights of
    /// the wrong length, floating labels under a classification cost, and
    /// the like.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested configuration cannot be honored. Today this means
    /// entropy cost with class weights that no integer multiplier up to
    /// 100 approximates within the float error.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, TrainError>;
