use crate::adapters::cdec::CDEC_JSON_URL;
use crate::app::run::{CycleOutput, Solver, WrimsSettings, MAX_MEMORY_MB};
use crate::utils::error::{CalSimError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_path, validate_range, validate_url, Validate,
};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings file for the `calsim` CLI. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolkitConfig {
    pub wrims: Option<WrimsConfig>,
    pub read: Option<ReadConfig>,
    pub cdec: Option<CdecConfig>,
    pub package: Option<PackageConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WrimsConfig {
    pub directory: Option<String>,
    pub solver: Option<String>,
    pub memory_mb: Option<u32>,
    pub cycles: Option<bool>,
    pub cycle_list: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CdecConfig {
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Git executable, `git` on the PATH when unset.
    pub git: Option<String>,
    pub stamp_version: Option<bool>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl ToolkitConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CalSimError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => CalSimError::IoError(e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| CalSimError::InvalidConfigValueError {
            field: "toml_parsing".to_string(),
            value: String::new(),
            reason: format!("TOML parsing error: {}", e),
        })
    }

    /// Replace `${VAR}` with the environment value; unknown variables stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")?;
        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });
        Ok(result.into_owned())
    }

    pub fn wrims_directory(&self) -> Option<&str> {
        self.wrims.as_ref().and_then(|w| w.directory.as_deref())
    }

    pub fn wrims_settings(&self) -> Result<WrimsSettings> {
        let defaults = WrimsSettings::default();
        let Some(wrims) = &self.wrims else {
            return Ok(defaults);
        };
        let solver = match &wrims.solver {
            Some(s) => s.parse::<Solver>()?,
            None => defaults.solver,
        };
        let cycles = CycleOutput::from_flags(
            wrims.cycles.unwrap_or(false),
            wrims.cycle_list.as_deref().unwrap_or(&[]),
        );
        Ok(WrimsSettings::new(
            solver,
            wrims.memory_mb.unwrap_or(defaults.memory_mb),
            cycles,
        ))
    }

    pub fn read_window(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        self.read
            .as_ref()
            .map(|r| (r.start_date, r.end_date))
            .unwrap_or((None, None))
    }

    pub fn cdec_base_url(&self) -> &str {
        self.cdec
            .as_ref()
            .and_then(|c| c.base_url.as_deref())
            .unwrap_or(CDEC_JSON_URL)
    }

    pub fn cdec_timeout_seconds(&self) -> Option<u64> {
        self.cdec.as_ref().and_then(|c| c.timeout_seconds)
    }

    pub fn package_suffix(&self) -> Option<&str> {
        self.package.as_ref().and_then(|p| p.suffix.as_deref())
    }

    /// Git executable for version stamping, `None` when stamping is off.
    pub fn package_git(&self) -> Option<String> {
        let package = self.package.as_ref();
        if package.and_then(|p| p.stamp_version) == Some(false) {
            return None;
        }
        Some(
            package
                .and_then(|p| p.git.clone())
                .unwrap_or_else(|| "git".to_string()),
        )
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl Validate for ToolkitConfig {
    fn validate(&self) -> Result<()> {
        if let Some(wrims) = &self.wrims {
            if let Some(dir) = &wrims.directory {
                validate_path("wrims.directory", dir)?;
            }
            if let Some(solver) = &wrims.solver {
                validate_one_of("wrims.solver", solver, &["XA", "CBC"])?;
            }
            if let Some(memory) = wrims.memory_mb {
                validate_range("wrims.memory_mb", memory, 64, MAX_MEMORY_MB)?;
            }
        }

        if let (Some(start), Some(end)) = self.read_window() {
            if start > end {
                return Err(CalSimError::InvalidConfigValueError {
                    field: "read.start_date".to_string(),
                    value: start.to_string(),
                    reason: format!("Start date is after end date {}", end),
                });
            }
        }

        validate_url("cdec.base_url", self.cdec_base_url())?;
        if let Some(timeout) = self.cdec_timeout_seconds() {
            validate_range("cdec.timeout_seconds", timeout, 1, 3600)?;
        }
        if let Some(suffix) = self.package_suffix() {
            validate_non_empty_string("package.suffix", suffix)?;
        }
        if let Some(git) = self.package.as_ref().and_then(|p| p.git.as_deref()) {
            validate_path("package.git", git)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[wrims]
directory = "C:/WRIMS2"
solver = "xa"
memory_mb = 2048
cycles = true
cycle_list = [1, 2]

[read]
start_date = "1921-10-31"
end_date = "2015-09-30"

[cdec]
timeout_seconds = 30

[monitoring]
enabled = true
"#;

        let config = ToolkitConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.wrims_directory(), Some("C:/WRIMS2"));
        assert_eq!(
            config.wrims_settings().unwrap().render(),
            "XA\n2048\ntrue\nfalse\n'1, 2'"
        );
        assert_eq!(config.cdec_base_url(), CDEC_JSON_URL);
        assert!(config.monitoring_enabled());
        assert_eq!(config.package_git().as_deref(), Some("git"));
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = ToolkitConfig::from_toml_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.wrims_settings().unwrap(), WrimsSettings::default());
        assert!(!config.monitoring_enabled());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CALSIM_TEST_WRIMS_DIR", "/opt/wrims");

        let config = ToolkitConfig::from_toml_str(
            r#"
[wrims]
directory = "${CALSIM_TEST_WRIMS_DIR}"
"#,
        )
        .unwrap();
        assert_eq!(config.wrims_directory(), Some("/opt/wrims"));

        std::env::remove_var("CALSIM_TEST_WRIMS_DIR");
    }

    #[test]
    fn test_config_validation() {
        let bad_memory = ToolkitConfig::from_toml_str("[wrims]\nmemory_mb = 16384\n").unwrap();
        assert!(bad_memory.validate().is_err());

        let bad_url = ToolkitConfig::from_toml_str("[cdec]\nbase_url = \"ftp://cdec\"\n").unwrap();
        assert!(bad_url.validate().is_err());

        let bad_window = ToolkitConfig::from_toml_str(
            "[read]\nstart_date = \"2000-01-01\"\nend_date = \"1999-01-01\"\n",
        )
        .unwrap();
        assert!(bad_window.validate().is_err());

        let blank_suffix = ToolkitConfig::from_toml_str("[package]\nsuffix = \"  \"\n").unwrap();
        assert!(blank_suffix.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[package]\nsuffix = \"DWR_CalSim3\"\nstamp_version = false\n")
            .unwrap();

        let config = ToolkitConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.package_suffix(), Some("DWR_CalSim3"));
        assert_eq!(config.package_git(), None);
    }
}
