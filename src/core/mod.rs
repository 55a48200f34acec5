pub mod column;
pub mod dataset;
pub(crate) mod node;
pub(crate) mod stats;
pub(crate) mod subset;

pub use column::{FeatureColumn, FeatureKind, LabelColumn};
pub use dataset::{Dataset, MetaData};
