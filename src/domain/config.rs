use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the base domain in
/// [`Config::cert_path_template`].
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

/// Error loading or saving a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this configuration.
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// The configuration could not be serialized.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// The file could not be written.
    #[error("Failed to write config file {}: {source}", path.display())]
    Write {
        /// Path that was written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Settings that control where hosts, webroots and certificates live, when a
/// certificate is due for renewal, and how issuance and reloads are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Directory with one entry per configured host (e.g.
    /// `/etc/nginx/sites-enabled`).
    pub sites_directory: PathBuf,

    /// Directory holding one webroot per host, named after the host.
    pub webroot_base: PathBuf,

    /// Path of the certificate for a base domain, with `{domain}` standing
    /// in for the base domain.
    pub cert_path_template: String,

    /// Certificates expiring within this many days are renewed.
    pub renewal_threshold_days: u32,

    /// Certificate issuance client to invoke.
    pub issuance_binary: PathBuf,

    /// Arguments appended after the generated issuance arguments.
    pub extra_issuance_args: Vec<String>,

    /// Service manager invoked as `<reload_binary> reload <service>`.
    pub reload_binary: PathBuf,

    /// Services to reload after a successful issuance.
    pub reload_services: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites_directory: default_sites_directory(),
            webroot_base: default_webroot_base(),
            cert_path_template: default_cert_path_template(),
            renewal_threshold_days: default_renewal_threshold_days(),
            issuance_binary: default_issuance_binary(),
            extra_issuance_args: Vec::new(),
            reload_binary: default_reload_binary(),
            reload_services: default_reload_services(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The renewal threshold as a duration.
    #[must_use]
    pub fn renewal_threshold(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.renewal_threshold_days))
    }

    /// The expected webroot directory for a host.
    #[must_use]
    pub fn webroot_for(&self, host: &str) -> PathBuf {
        self.webroot_base.join(host)
    }
}

fn default_sites_directory() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled")
}

fn default_webroot_base() -> PathBuf {
    PathBuf::from("/var/www")
}

fn default_cert_path_template() -> String {
    "/etc/letsencrypt/live/{domain}/cert.pem".to_string()
}

const fn default_renewal_threshold_days() -> u32 {
    30
}

fn default_issuance_binary() -> PathBuf {
    PathBuf::from("certbot")
}

fn default_reload_binary() -> PathBuf {
    PathBuf::from("systemctl")
}

fn default_reload_services() -> Vec<String> {
    vec!["nginx".to_string()]
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_sites_directory")]
        sites_directory: PathBuf,

        #[serde(default = "default_webroot_base")]
        webroot_base: PathBuf,

        #[serde(default = "default_cert_path_template")]
        cert_path_template: String,

        #[serde(default = "default_renewal_threshold_days")]
        renewal_threshold_days: u32,

        #[serde(default = "default_issuance_binary")]
        issuance_binary: PathBuf,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extra_issuance_args: Vec<String>,

        #[serde(default = "default_reload_binary")]
        reload_binary: PathBuf,

        /// An empty list disables reloading.
        #[serde(default = "default_reload_services")]
        reload_services: Vec<String>,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                sites_directory,
                webroot_base,
                cert_path_template,
                renewal_threshold_days,
                issuance_binary,
                extra_issuance_args,
                reload_binary,
                reload_services,
            } => Self {
                sites_directory,
                webroot_base,
                cert_path_template,
                renewal_threshold_days,
                issuance_binary,
                extra_issuance_args,
                reload_binary,
                reload_services,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            sites_directory: config.sites_directory,
            webroot_base: config.webroot_base,
            cert_path_template: config.cert_path_template,
            renewal_threshold_days: config.renewal_threshold_days,
            issuance_binary: config.issuance_binary,
            extra_issuance_args: config.extra_issuance_args,
            reload_binary: config.reload_binary,
            reload_services: config.reload_services,
        }
    }
}
