pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{CdecClient, CsvBackend};
pub use config::{LocalStorage, ToolkitConfig};
pub use domain::model::{Table, TableFormat, TidyFrame};
pub use utils::error::{CalSimError, Result};
