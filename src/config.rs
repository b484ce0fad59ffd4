use std::path::Path;

use serde::{Deserialize, Serialize};

/// Page size used by `get_all_holds` when the caller asks for limit 0.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

pub const DEFAULT_BOND_DENOM: &str = "stake";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("default_page_limit must be positive")]
    ZeroPageLimit,
    #[error("bond_denom: {0}")]
    BondDenom(#[from] crate::coin::CoinsParseError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HoldConfig {
    pub default_page_limit: u64,
    pub bond_denom: String,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            default_page_limit: DEFAULT_PAGE_LIMIT,
            bond_denom: DEFAULT_BOND_DENOM.to_string(),
        }
    }
}

impl HoldConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let cfg: HoldConfig =
            serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse { path: display, source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_limit == 0 {
            return Err(ConfigError::ZeroPageLimit);
        }
        crate::coin::validate_denom(&self.bond_denom)?;
        Ok(())
    }
}
