pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub mod args;

#[cfg(feature = "cli")]
pub use args::{Cli, Command, PartArgs, StatKind, StoreArgs, WindowArgs};
pub use cli::LocalStorage;
pub use toml_config::ToolkitConfig;
