pub mod arn;
pub mod config;
pub mod manifest;
pub mod types;

pub use arn::Arn;
pub use config::{AdsConfig, parse_duration};
pub use manifest::Manifest;
pub use types::*;
