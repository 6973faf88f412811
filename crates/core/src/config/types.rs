use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::builder::{BuilderConfig, DeployConfig, ProviderConfig};
use crate::orchestrator::LifecycleConfig;
use crate::process::ProcessConfig;
use crate::provider::Provider;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Config {
    /// Number of enabled providers.
    pub fn enabled_count(&self) -> usize {
        self.providers.enabled().count()
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dirforge.db")
}

/// Pipeline settings per provider. A provider without a section is disabled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub smart_match: Option<ProviderConfig>,
    #[serde(default)]
    pub parascript: Option<ProviderConfig>,
    #[serde(default)]
    pub royal_mail: Option<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> Option<&ProviderConfig> {
        match provider {
            Provider::SmartMatch => self.smart_match.as_ref(),
            Provider::Parascript => self.parascript.as_ref(),
            Provider::RoyalMail => self.royal_mail.as_ref(),
        }
    }

    pub fn set(&mut self, provider: Provider, config: ProviderConfig) {
        let slot = match provider {
            Provider::SmartMatch => &mut self.smart_match,
            Provider::Parascript => &mut self.parascript,
            Provider::RoyalMail => &mut self.royal_mail,
        };
        *slot = Some(config);
    }

    /// Section name of a provider, e.g. `royal_mail`.
    pub fn key(provider: Provider) -> &'static str {
        match provider {
            Provider::SmartMatch => "smart_match",
            Provider::Parascript => "parascript",
            Provider::RoyalMail => "royal_mail",
        }
    }

    /// Configs of providers that are present and enabled.
    pub fn enabled(&self) -> impl Iterator<Item = (Provider, &ProviderConfig)> + '_ {
        Provider::ALL
            .into_iter()
            .filter_map(|p| self.get(p).filter(|c| c.enabled).map(|c| (p, c)))
    }
}

/// Sanitized config for API responses (tool arguments hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub deploy: DeployConfig,
    pub builder: BuilderConfig,
    pub lifecycle: LifecycleConfig,
    pub providers: Vec<SanitizedProviderConfig>,
}

/// Sanitized provider config (argument templates may carry license keys)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub provider: Provider,
    pub enabled: bool,
    pub download_dir: PathBuf,
    pub converter_configured: bool,
    pub compiler_path: PathBuf,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            deploy: config.deploy.clone(),
            builder: config.builder.clone(),
            lifecycle: config.lifecycle.clone(),
            providers: Provider::ALL
                .into_iter()
                .filter_map(|p| {
                    config.providers.get(p).map(|c| SanitizedProviderConfig {
                        provider: p,
                        enabled: c.enabled,
                        download_dir: c.download_dir.clone(),
                        converter_configured: c.converter_path.is_some(),
                        compiler_path: c.compiler_path.clone(),
                        timeout_secs: c.timeout_secs,
                    })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "dirforge.db");
        assert!(!config.deploy.enabled);
        assert_eq!(config.builder.poll_interval_secs, 0);
        assert_eq!(config.enabled_count(), 0);
    }

    #[test]
    fn test_deserialize_providers() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[providers.smart_match]
download_dir = "/data/smartmatch"
converter_path = "/opt/sm/convert"
compiler_path = "/opt/sm/compile"

[providers.royal_mail]
enabled = false
download_dir = "/data/royalmail"
converter_path = "/opt/rm/convert"
compiler_path = "/opt/rm/compile"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(config.providers.get(Provider::SmartMatch).is_some());
        assert!(config.providers.get(Provider::Parascript).is_none());

        let enabled: Vec<_> = config.providers.enabled().map(|(p, _)| p).collect();
        assert_eq!(enabled, vec![Provider::SmartMatch]);
    }

    #[test]
    fn test_sanitized_config_hides_arguments() {
        let mut config = Config::default();
        let mut provider = ProviderConfig::new("/data/ps", "/opt/ps/compile");
        provider.compiler_args = "--license SECRET {input} {output}".to_string();
        config.providers.set(Provider::Parascript, provider);

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.providers.len(), 1);
        assert_eq!(sanitized.providers[0].provider, Provider::Parascript);
        assert!(!sanitized.providers[0].converter_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("SECRET"));
    }
}
