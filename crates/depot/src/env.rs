use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use home::home_dir;

/// Locations of the client's durable state.
///
/// ```text
/// root (DEPOT_ROOT or ~/.depot)
/// ├── config.toml
/// ├── account.config
/// ├── depot.config
/// └── manifests/
/// ```
#[derive(Debug, Clone)]
pub struct DepotEnv {
    root: PathBuf,
}

impl DepotEnv {
    pub const ROOT_VAR: &str = "DEPOT_ROOT";

    pub fn new() -> Result<Self> {
        let root = match env::var_os(Self::ROOT_VAR) {
            Some(root) => PathBuf::from(root),
            None => home_dir().context("Failed to get home directory")?.join(".depot"),
        };
        Ok(Self::from_root(root))
    }

    pub fn from_root(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    pub fn config_file(&self) -> PathBuf { self.root.join("config.toml") }

    pub fn account_settings_path(&self) -> PathBuf { self.root.join("account.config") }

    pub fn installed_path(&self) -> PathBuf { self.root.join("depot.config") }

    pub fn manifest_dir(&self) -> PathBuf { self.root.join("manifests") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_root() {
        let env = DepotEnv::from_root("/var/lib/depot");
        assert_eq!(env.account_settings_path(), Path::new("/var/lib/depot/account.config"));
        assert_eq!(env.installed_path(), Path::new("/var/lib/depot/depot.config"));
        assert_eq!(env.manifest_dir(), Path::new("/var/lib/depot/manifests"));
        assert_eq!(env.config_file(), Path::new("/var/lib/depot/config.toml"));
    }

    #[test]
    fn test_root_from_environment() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(DepotEnv::ROOT_VAR, "/srv/depot");
            let env = DepotEnv::new().map_err(|e| e.to_string())?;
            assert_eq!(env.root(), Path::new("/srv/depot"));
            Ok(())
        });
    }
}
