use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalSimError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Invalid glob pattern: {0}")]
    GlobPatternError(#[from] glob::PatternError),

    #[error("Directory walk failed: {0}")]
    GlobError(#[from] glob::GlobError),

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Table format error: {message}")]
    FormatError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("File {} does not exist", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Record {pathname} not found in {}", path.display())]
    RecordNotFound { pathname: String, path: PathBuf },

    #[error("No pathnames returned from provided filter criteria ({})", path.display())]
    NoMatch { path: PathBuf },

    #[error("External process error: {message}")]
    ProcessError { message: String },

    #[error("Plot error: {message}")]
    PlotError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CalSimError {
    pub fn format(message: impl Into<String>) -> Self {
        CalSimError::FormatError {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CalSimError::ValidationError {
            message: message.into(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CalSimError::NoMatch { .. } => ErrorSeverity::Low,
            CalSimError::HttpError(_) | CalSimError::ProcessError { .. } => ErrorSeverity::Medium,
            CalSimError::IoError(_) | CalSimError::ZipError(_) | CalSimError::GlobError(_) => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            CalSimError::HttpError(_) => "Check network access and the CDEC endpoint, then retry",
            CalSimError::InvalidConfigValueError { .. }
            | CalSimError::MissingConfigError { .. } => {
                "Review the TOML configuration file and command line options"
            }
            CalSimError::FileNotFound { .. } => "Verify the file path (absolute or relative)",
            CalSimError::NoMatch { .. } | CalSimError::RecordNotFound { .. } => {
                "Relax the pathname part filters or use --contains for substring matching"
            }
            CalSimError::FormatError { .. } | CalSimError::ValidationError { .. } => {
                "Remove duplicate records and make sure all pathname parts are provided"
            }
            CalSimError::ProcessError { .. } => {
                "Check the WRIMS installation directory and batch files"
            }
            CalSimError::PatternError(_) | CalSimError::GlobPatternError(_) => {
                "Escape special characters in the filter values"
            }
            CalSimError::PlotError { .. } => "Reduce the number of variables or check the output path",
            _ => "Check file permissions and available disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            CalSimError::HttpError(_) => format!("Could not reach the data service: {}", self),
            CalSimError::IoError(e) => format!("File system problem: {}", e),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CalSimError>;
