pub mod engineer;
pub mod schema;

pub use engineer::engineer;
pub use schema::{
    lag_column_name, FeatureSchema, DAILY_RETURN, DEFAULT_LAGS, DEFAULT_PREDICTORS, TARGET_RETURN,
};
