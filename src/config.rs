use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Environment variables consulted when the matching credential flag is unset.
pub const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "AZURE_CLIENT_SECRET";

/// Raw settings as they arrive from the command line or the config file.
/// Everything is optional here; `Config::resolve` decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub zone_name: Option<String>,
    pub record_name: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Settings {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Validated configuration. The four identifying fields are guaranteed
/// present; credentials are resolved separately because they may come from
/// the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub subscription_id: String,
    pub resource_group: String,
    pub zone_name: String,
    pub record_name: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// Service principal credentials, resolved and non-empty.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    /// Build the effective configuration. When a config file is given its
    /// contents replace all flag values; otherwise the flags are used as-is.
    /// Missing required fields are reported together in one error.
    pub fn resolve<P: AsRef<Path>>(flags: Settings, config_file: Option<P>) -> Result<Self> {
        let settings = match config_file {
            Some(path) => Settings::load(path)?,
            None => flags,
        };
        Self::validate(settings)
    }

    fn validate(settings: Settings) -> Result<Self> {
        let mut missing = Vec::new();
        if is_unset(&settings.resource_group) {
            missing.push("resource group (--resource-group)");
        }
        if is_unset(&settings.zone_name) {
            missing.push("zone name (--zone)");
        }
        if is_unset(&settings.record_name) {
            missing.push("record name (--record)");
        }
        if is_unset(&settings.subscription_id) {
            missing.push("subscription ID (--subscription-id)");
        }
        if !missing.is_empty() {
            bail!("Missing required settings: {}", missing.join(", "));
        }

        Ok(Self {
            subscription_id: settings.subscription_id.unwrap_or_default(),
            resource_group: settings.resource_group.unwrap_or_default(),
            zone_name: settings.zone_name.unwrap_or_default(),
            record_name: settings.record_name.unwrap_or_default(),
            tenant_id: settings.tenant_id,
            client_id: settings.client_id,
            client_secret: settings.client_secret,
        })
    }

    /// Resolve the service principal credentials, falling back to the
    /// AZURE_* environment variables for any that were not given explicitly.
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            tenant_id: require(self.tenant_id.as_deref(), "--tenant-id", TENANT_ID_VAR)?,
            client_id: require(self.client_id.as_deref(), "--client-id", CLIENT_ID_VAR)?,
            client_secret: require(
                self.client_secret.as_deref(),
                "--client-secret",
                CLIENT_SECRET_VAR,
            )?,
        })
    }
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// Explicit non-empty value wins, otherwise the named environment variable.
fn from_flag_or_env(explicit: Option<&str>, var: &str) -> Option<String> {
    match explicit {
        Some(value) if !value.is_empty() => Some(value.to_string()),
        _ => env::var(var).ok().filter(|value| !value.is_empty()),
    }
}

fn require(explicit: Option<&str>, flag: &str, var: &str) -> Result<String> {
    from_flag_or_env(explicit, var)
        .with_context(|| format!("Missing credential: set {} or {}", flag, var))
}
