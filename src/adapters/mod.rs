// Adapters layer: concrete implementations for external systems (DSS record store, CDEC web service).

pub mod cdec;
pub mod csv_store;

pub use cdec::{CdecClient, CdecQuery, CdecRecord, DurationCode};
pub use csv_store::{CsvBackend, CsvStore};
