//! Layered configuration loading
//!
//! Sources, lowest priority first: serialized defaults, the YAML file, then
//! environment variables prefixed with the upper-cased service name. Nested
//! keys use `__` (e.g. `PLCSRV_LINK__HOST`).

use std::path::{Path, PathBuf};

use errors::{VulcanError, VulcanResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

/// Default config file location for a service: `config/<service>.yaml`
pub fn default_config_path(service: &str) -> PathBuf {
    PathBuf::from("config").join(format!("{}.yaml", service))
}

/// Environment prefix for a service: `PLCSRV_`, `RECIPESRV_`
pub fn env_prefix(service: &str) -> String {
    format!("{}_", service.to_uppercase())
}

/// Build the provider chain without extracting
pub fn figment_for<T>(service: &str, path: &Path) -> Figment
where
    T: Default + Serialize,
{
    let mut figment = Figment::new().merge(Serialized::defaults(T::default()));

    if path.exists() {
        info!("Loading configuration from {}", path.display());
        figment = figment.merge(Yaml::file(path));
    } else {
        warn!("Config file {} not found, using defaults", path.display());
    }

    figment.merge(Env::prefixed(&env_prefix(service)).split("__"))
}

/// Load a service configuration
///
/// `path` overrides the default `config/<service>.yaml` location.
pub fn load_config<T>(service: &str, path: Option<&Path>) -> VulcanResult<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_config_path(service));

    figment_for::<T>(service, &path)
        .extract()
        .map_err(|e| VulcanError::Configuration(format!("Failed to load configuration: {}", e)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Sample {
        link: SampleLink,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct SampleLink {
        host: String,
        port: u16,
    }

    impl Default for SampleLink {
        fn default() -> Self {
            Self {
                host: "127.0.0.1".to_string(),
                port: 502,
            }
        }
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Sample =
            load_config("cfgtest_missing", Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "link:\n  port: 1502").unwrap();

        let cfg: Sample = load_config("cfgtest_yaml", Some(file.path())).unwrap();
        assert_eq!(cfg.link.port, 1502);
        assert_eq!(cfg.link.host, "127.0.0.1");
    }

    #[test]
    fn test_env_overrides_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "link:\n  host: plc.local").unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("CFGTEST_ENV_LINK__HOST", "10.0.0.5");
            let cfg: Sample = load_config("cfgtest_env", Some(file.path())).unwrap();
            assert_eq!(cfg.link.host, "10.0.0.5");
            Ok(())
        });
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix("plcsrv"), "PLCSRV_");
        assert_eq!(
            default_config_path("recipesrv"),
            PathBuf::from("config/recipesrv.yaml")
        );
    }
}
