use crate::utils::error::{CalSimError, Result};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(CalSimError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// Extension check is case-insensitive; DSS tooling on Windows happily mixes
/// `.DSS` and `.dss`.
pub fn validate_file_extension(field_name: &str, path: &Path, allowed: &[&str]) -> Result<()> {
    let allowed_set: HashSet<String> = allowed.iter().map(|e| e.to_lowercase()).collect();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some(extension) if allowed_set.contains(&extension.to_lowercase()) => Ok(()),
        Some(extension) => Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.display().to_string(),
            reason: format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed.join(", ")
            ),
        }),
        None => Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.display().to_string(),
            reason: "File has no extension or invalid filename".to_string(),
        }),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(CalSimError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_one_of(field_name: &str, value: &str, options: &[&str]) -> Result<()> {
    if options.iter().any(|o| o.eq_ignore_ascii_case(value)) {
        return Ok(());
    }
    Err(CalSimError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: format!("Valid options: {}", options.join(", ")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("cdec.base_url", "https://cdec.water.ca.gov").is_ok());
        assert!(validate_url("cdec.base_url", "http://cdec.water.ca.gov").is_ok());
        assert!(validate_url("cdec.base_url", "").is_err());
        assert!(validate_url("cdec.base_url", "invalid-url").is_err());
        assert!(validate_url("cdec.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("wrims.memory_mb", 4096, 64, 8192).is_ok());
        assert!(validate_range("wrims.memory_mb", 9000, 64, 8192).is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("store", Path::new("DV.CSV"), &["csv"]).is_ok());
        assert!(validate_file_extension("store", Path::new("DV.dss"), &["csv"]).is_err());
        assert!(validate_file_extension("store", Path::new("DV"), &["csv"]).is_err());
    }

    #[test]
    fn test_validate_one_of() {
        assert!(validate_one_of("wrims.solver", "cbc", &["XA", "CBC"]).is_ok());
        assert!(validate_one_of("wrims.solver", "gurobi", &["XA", "CBC"]).is_err());
    }
}
