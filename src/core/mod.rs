//! Table processing and analysis. Everything here is synchronous and works on
//! owned frames; stores are reached through `domain::ports::DssBackend`.

pub mod compare;
pub mod dependencies;
pub mod export;
pub mod io;
pub mod plot;
#[cfg(feature = "plot")]
pub mod render;
pub mod selection;
pub mod stats;
pub mod transform;
pub mod units;

pub use crate::domain::ports::{BatchExecutor, DssBackend, DssStore, Storage};
pub use crate::utils::error::Result;
