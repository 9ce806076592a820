pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod converter;
pub mod csv_loader;
pub mod label_encoder;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod sequence;
pub mod split;
pub mod training;
pub mod types;
