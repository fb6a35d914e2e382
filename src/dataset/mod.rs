//! Dataset ingestion and the shared feature schema.

pub mod loader;
pub mod matrix;
pub mod schema;

pub use loader::load_features;
pub use matrix::FeatureMatrix;
pub use schema::EXCLUDED_COLUMNS;
