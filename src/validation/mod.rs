pub mod metrics;
pub mod walk_forward;

pub use metrics::{mean_absolute_error, r2_score};
pub use walk_forward::{walk_forward_folds, CvSummary, Fold, FoldScore, WalkForwardValidator};
