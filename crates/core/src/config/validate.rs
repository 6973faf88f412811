use std::collections::HashSet;

use super::{types::Config, types::ProvidersConfig, ConfigError};
use crate::builder::recipe_for;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Deploy target is set when deploy is enabled
/// - Enabled providers have a compiler, and a converter when their recipe
///   converts
/// - Download directories are distinct and never double as working directories
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.deploy.enabled && config.deploy.target_dir.is_none() {
        return Err(ConfigError::ValidationError(
            "deploy.target_dir is required when deploy is enabled".to_string(),
        ));
    }

    let mut download_dirs = HashSet::new();
    for (provider, provider_config) in config.providers.enabled() {
        if provider_config.compiler_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "providers.{}.compiler_path cannot be empty",
                ProvidersConfig::key(provider)
            )));
        }

        if recipe_for(provider).converts() && provider_config.converter_path.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "providers.{}.converter_path is required",
                ProvidersConfig::key(provider)
            )));
        }

        if provider_config.working_dir == provider_config.download_dir {
            return Err(ConfigError::ValidationError(format!(
                "providers.{}: working_dir must differ from download_dir",
                ProvidersConfig::key(provider)
            )));
        }

        if !download_dirs.insert(provider_config.download_dir.clone()) {
            return Err(ConfigError::ValidationError(format!(
                "providers.{}.download_dir is shared with another provider",
                ProvidersConfig::key(provider)
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProviderConfig;
    use crate::config::ServerConfig;
    use crate::provider::Provider;
    use std::path::PathBuf;

    fn parascript() -> ProviderConfig {
        ProviderConfig::new("/data/parascript", "/opt/ps/compile")
    }

    #[test]
    fn test_validate_valid_config() {
        let mut config = Config::default();
        config.providers.set(Provider::Parascript, parascript());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_deploy_requires_target() {
        let mut config = Config::default();
        config.deploy.enabled = true;
        assert!(validate_config(&config).is_err());

        config.deploy.target_dir = Some(PathBuf::from("/srv/app"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_converter_required_for_smartmatch() {
        let mut config = Config::default();
        config
            .providers
            .set(Provider::SmartMatch, ProviderConfig::new("/data/sm", "/opt/sm/compile"));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("converter_path"));
    }

    #[test]
    fn test_validate_disabled_provider_is_not_checked() {
        let mut config = Config::default();
        let mut sm = ProviderConfig::new("/data/sm", "");
        sm.enabled = false;
        config.providers.set(Provider::SmartMatch, sm);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_shared_download_dir_fails() {
        let mut config = Config::default();
        config.providers.set(Provider::Parascript, parascript());
        let mut rm = ProviderConfig::new("/data/parascript", "/opt/rm/compile");
        rm.converter_path = Some("/opt/rm/convert".into());
        config.providers.set(Provider::RoyalMail, rm);

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("providers.royal_mail.download_dir"));
    }

    #[test]
    fn test_validate_working_dir_equal_to_download_dir_fails() {
        let mut config = Config::default();
        let mut ps = parascript();
        ps.working_dir = ps.download_dir.clone();
        config.providers.set(Provider::Parascript, ps);
        assert!(validate_config(&config).is_err());
    }
}
