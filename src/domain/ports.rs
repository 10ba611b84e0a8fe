use crate::domain::model::RegularSeries;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::path::Path;

/// File-level artifact storage (reports, exports, fetched data).
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// An open handle on one DSS file.
///
/// Values cross this boundary with DSS sentinels (`-901`) for missing data;
/// conversion to `Option<f64>` happens in `core::io`.
pub trait DssStore {
    /// Pathnames of every record in the file.
    fn catalog(&self) -> Result<Vec<String>>;

    /// Read `count` regular values of `pathname` starting at `start`.
    fn read_regular(
        &self,
        pathname: &str,
        start: NaiveDateTime,
        count: usize,
    ) -> Result<RegularSeries>;

    fn write_regular(&mut self, pathname: &str, series: &RegularSeries) -> Result<()>;

    /// Flush and release the handle.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Opens DSS files; the binary format itself lives behind this seam.
pub trait DssBackend: Send + Sync {
    type Store: DssStore;

    /// Open an existing file, or an empty one that will be created on close.
    fn open(&self, path: &Path) -> Result<Self::Store>;

    /// File extensions this backend understands.
    fn extensions(&self) -> &'static [&'static str];
}

/// Launches WRIMS batch programs.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    /// Run `program` with `cwd` as working directory and return its exit code.
    async fn execute(&self, program: &Path, cwd: &Path) -> Result<i32>;
}
