use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};
use crate::filter::FilesetFilters;
use crate::ware::DEFAULT_WARE_TYPE;

/// defaults for pack and unpack, stored as TOML
///
/// ```toml
/// ware_type = "tar"
///
/// [pack]
/// mtime = "@0"
///
/// [unpack]
/// uid = "keep"
/// sticky = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ware type reported when packing
    pub ware_type: String,
    /// filters applied when packing; empty fields mean the pack defaults
    pub pack: FilesetFilters,
    /// filters applied when unpacking; empty fields mean the unpack defaults
    pub unpack: FilesetFilters,
}

impl Config {
    /// load config from file; filters that cannot apply are rejected here
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path.display())?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path.display())?;
        Ok(())
    }

    /// check both filter sets without applying them
    pub fn validate(&self) -> Result<()> {
        self.pack.for_pack()?;
        self.unpack.for_unpack()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ware_type: DEFAULT_WARE_TYPE.to_string(),
            pack: FilesetFilters::default(),
            unpack: FilesetFilters::default(),
        }
    }
}
