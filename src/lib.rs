//! thicket: parallel training of decision-tree ensembles over tabular
//! data that mixes continuous and categorical features.

mod cost;
mod error;
mod split;
mod stored;

pub mod constants;
pub mod utils;

pub mod core;
pub mod predict;
pub mod train;

pub use crate::core::column::{FeatureColumn, FeatureKind, LabelColumn};
pub use crate::core::dataset::{Dataset, MetaData};
pub use crate::cost::CostFunction;
pub use crate::error::{Result, TrainError};
pub use crate::predict::{PredictFilter, TreePredictor};
pub use crate::split::SplitKind;
pub use crate::stored::{CellInfo, StoredTree};
pub use crate::train::{ForestTrainer, TreeParams, TreeTrainer};
