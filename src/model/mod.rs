pub mod feature_row;
pub mod observation;

pub use feature_row::{design_matrix, FeatureRow};
pub use observation::{Observation, ObservationTable};
