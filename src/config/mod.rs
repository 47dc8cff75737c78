use crate::error::{Result, SweepError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub log_level: String,

    #[serde(default)]
    pub sweep: SweepDefaults,
}

/// Defaults applied to `sweep` when the command line does not override them
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweepDefaults {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub include_personal_sites: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for SweepDefaults {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            include_personal_sites: false,
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "permsweep", "permsweep").ok_or_else(|| {
            SweepError::ConfigError("Failed to determine config directory".into())
        })?;

        Self::with_dir(project_dirs.config_dir().to_path_buf())
    }

    /// Use an explicit configuration directory
    pub fn with_dir(config_dir: PathBuf) -> Result<Self> {
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    /// Load main config
    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save main config
    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| SweepError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    /// Load all tenants
    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;

        #[derive(Deserialize)]
        struct TenantsFile {
            #[serde(default)]
            tenants: Vec<TenantConfig>,
        }

        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    /// Save all tenants
    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let contents = toml::to_string_pretty(&TenantsFile { tenants })
            .map_err(|e| SweepError::ConfigError(format!("Failed to serialize tenants: {}", e)))?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or replace a tenant
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| !t.name.eq_ignore_ascii_case(&tenant.name));
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SweepError::TenantNotFound(name.to_string()))
    }

    pub fn get_active_tenant(&self) -> Result<Option<TenantConfig>> {
        match self.load_config()?.current_tenant {
            Some(tenant_name) => Ok(Some(self.get_tenant(&tenant_name)?)),
            None => Ok(None),
        }
    }

    /// Resolve the tenant to operate on: an explicit name wins over the active tenant
    pub fn resolve_tenant(&self, name: Option<&str>) -> Result<TenantConfig> {
        match name {
            Some(name) => self.get_tenant_or_env(name),
            None => self.get_active_tenant()?.ok_or_else(|| {
                SweepError::ConfigError(
                    "No active tenant. Run 'permsweep tenant switch <name>' or pass --tenant."
                        .into(),
                )
            }),
        }
    }

    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        let tenant = self.get_tenant(tenant_name)?;

        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant.name);
        self.save_config(&config)
    }

    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        let original_len = tenants.len();
        tenants.retain(|t| !t.name.eq_ignore_ascii_case(tenant_name));

        if tenants.len() == original_len {
            return Err(SweepError::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;

        let mut config = self.load_config()?;
        if config
            .current_tenant
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(tenant_name))
        {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    /// Load a tenant from `<name>.env` (or `.env`) in the config directory
    ///
    /// ```text
    /// TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_SECRET=your-secret-here
    /// ```
    pub fn load_env_file(&self, name: &str) -> Result<Option<TenantConfig>> {
        let env_path = self.config_dir.join(format!("{}.env", name.to_lowercase()));
        let fallback_path = self.config_dir.join(".env");

        let path = if env_path.exists() {
            env_path
        } else if fallback_path.exists() {
            fallback_path
        } else {
            return Ok(None);
        };

        let contents = fs::read_to_string(&path)?;
        let vars: HashMap<String, String> = contents
            .lines()
            .filter_map(parse_env_line)
            .collect();

        Ok(Self::vars_to_tenant(name, &vars).map(|mut tenant| {
            tenant.name = name.to_string();
            tenant
        }))
    }

    /// Load all tenants from a sectioned `tenants.env`
    ///
    /// ```text
    /// [CONTOSO]
    /// NAME=Contoso Ltd
    /// TENANT_ID=...
    /// CLIENT_ID=...
    /// CLIENT_SECRET=...
    /// ```
    pub fn load_tenants_env(&self) -> Result<Vec<TenantConfig>> {
        let env_path = self.config_dir.join("tenants.env");

        if !env_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&env_path)?;
        Ok(parse_tenants_env(&contents))
    }

    fn vars_to_tenant(section: &str, vars: &HashMap<String, String>) -> Option<TenantConfig> {
        let tenant_id = vars.get("TENANT_ID")?;
        let client_id = vars.get("CLIENT_ID")?;

        Some(TenantConfig {
            name: section.to_uppercase(),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            client_secret: vars.get("CLIENT_SECRET").cloned(),
            description: vars.get("NAME").or_else(|| vars.get("DESCRIPTION")).cloned(),
        })
    }

    /// Get tenant by name, falling back to env files and persisting what was found
    pub fn get_tenant_or_env(&self, name: &str) -> Result<TenantConfig> {
        if let Ok(tenant) = self.get_tenant(name) {
            return Ok(tenant);
        }

        if let Some(tenant) = self
            .load_tenants_env()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
        {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        if let Some(tenant) = self.load_env_file(name)? {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        Err(SweepError::TenantNotFound(name.to_string()))
    }
}

/// Parse one `KEY=VALUE` line; keys are upper-cased and surrounding quotes stripped
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    let value = if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    };

    Some((key.trim().to_uppercase(), value.to_string()))
}

fn parse_tenants_env(contents: &str) -> Vec<TenantConfig> {
    let mut tenants = Vec::new();
    let mut current_section: Option<String> = None;
    let mut current_vars: HashMap<String, String> = HashMap::new();

    for line in contents.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            if let Some(section) = current_section.take() {
                tenants.extend(ConfigManager::vars_to_tenant(&section, &current_vars));
            }
            current_section = Some(trimmed[1..trimmed.len() - 1].to_string());
            current_vars.clear();
            continue;
        }

        if let Some((key, value)) = parse_env_line(trimmed) {
            current_vars.insert(key, value);
        }
    }

    if let Some(section) = current_section {
        tenants.extend(ConfigManager::vars_to_tenant(&section, &current_vars));
    }

    tenants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path().join("permsweep")).unwrap();
        (dir, manager)
    }

    fn tenant(name: &str) -> TenantConfig {
        TenantConfig {
            name: name.to_string(),
            tenant_id: "tid".into(),
            client_id: "cid".into(),
            client_secret: Some("secret".into()),
            description: None,
        }
    }

    #[test]
    fn test_default_config_when_missing() {
        let (_dir, manager) = manager();
        let config = manager.load_config().unwrap();
        assert!(config.current_tenant.is_none());
        assert_eq!(config.sweep.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_tenants_file_ignores_retired_keys() {
        let (_dir, manager) = manager();
        fs::write(
            manager.config_dir().join("tenants.toml"),
            "[[tenants]]\nname = \"contoso\"\ntenant_id = \"t\"\nclient_id = \"c\"\nsharepoint_host = \"contoso.sharepoint.com\"\n",
        )
        .unwrap();

        let tenants = manager.load_tenants().unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].name, "contoso");
    }

    #[test]
    fn test_sweep_defaults_partial_table() {
        let config: Config = toml::from_str("[sweep]\nconcurrency = 4\n").unwrap();
        assert_eq!(config.sweep.concurrency, 4);
        assert!(!config.sweep.include_personal_sites);
        assert_eq!(config.sweep.request_timeout_secs, 60);
    }

    #[test]
    fn test_add_switch_remove_tenant() {
        let (_dir, manager) = manager();
        manager.add_tenant(tenant("contoso")).unwrap();
        manager.add_tenant(tenant("fabrikam")).unwrap();
        manager.add_tenant(tenant("CONTOSO")).unwrap();
        assert_eq!(manager.load_tenants().unwrap().len(), 2);

        manager.set_active_tenant("fabrikam").unwrap();
        assert_eq!(
            manager.get_active_tenant().unwrap().unwrap().name,
            "fabrikam"
        );

        manager.remove_tenant("fabrikam").unwrap();
        assert!(manager.get_active_tenant().unwrap().is_none());
        assert!(matches!(
            manager.remove_tenant("fabrikam"),
            Err(SweepError::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_tenant_without_active() {
        let (_dir, manager) = manager();
        assert!(matches!(
            manager.resolve_tenant(None),
            Err(SweepError::ConfigError(_))
        ));
    }

    #[test]
    fn test_parse_tenants_env() {
        let contents = r#"
# managed clients
[CONTOSO]
NAME=Contoso Ltd
TENANT_ID="t-1"
CLIENT_ID=c-1
CLIENT_SECRET='s-1'

[BROKEN]
NAME=Missing ids
"#;
        let tenants = parse_tenants_env(contents);
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].name, "CONTOSO");
        assert_eq!(tenants[0].tenant_id, "t-1");
        assert_eq!(tenants[0].client_secret.as_deref(), Some("s-1"));
        assert_eq!(tenants[0].description.as_deref(), Some("Contoso Ltd"));
    }

    #[test]
    fn test_get_tenant_from_env_file_is_persisted() {
        let (_dir, manager) = manager();
        fs::write(
            manager.config_dir().join("acme.env"),
            "TENANT_ID=t-2\nCLIENT_ID=c-2\n",
        )
        .unwrap();

        let tenant = manager.get_tenant_or_env("acme").unwrap();
        assert_eq!(tenant.name, "acme");
        assert!(tenant.client_secret.is_none());
        assert_eq!(manager.get_tenant("acme").unwrap(), tenant);
    }
}
