use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Real collaborators backed by the host filesystem and pm2.
    #[default]
    Local,
    /// Logging stand-ins for every host-level step. Routing and certificates
    /// are skipped.
    Fake,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_apps_dir")]
    pub apps_dir: PathBuf,
    #[serde(default = "default_builds_dir")]
    pub builds_dir: PathBuf,
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,
    /// Build directory copied by the installer (`{builds_dir}/{app_type}`).
    #[serde(default = "default_app_type")]
    pub app_type: String,
    #[serde(default = "default_port_range")]
    pub port_range: [u16; 2],
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_true")]
    pub reconcile_ports: bool,
    #[serde(default = "default_fake_step_delay_ms")]
    pub fake_step_delay_ms: u64,
    pub api_key: Option<String>,
    #[serde(default)]
    pub seed_domains: Vec<String>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub certs: CertsConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HealthConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutingBackend {
    #[default]
    Nginx,
    Caddy,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default)]
    pub backend: RoutingBackend,
    #[serde(default = "default_sites_available")]
    pub sites_available: PathBuf,
    #[serde(default = "default_sites_enabled")]
    pub sites_enabled: PathBuf,
    #[serde(default = "default_nginx_test")]
    pub test_command: String,
    #[serde(default = "default_nginx_reload")]
    pub reload_command: String,
    #[serde(default = "default_caddy_api")]
    pub caddy_api_url: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            backend: RoutingBackend::default(),
            sites_available: default_sites_available(),
            sites_enabled: default_sites_enabled(),
            test_command: default_nginx_test(),
            reload_command: default_nginx_reload(),
            caddy_api_url: default_caddy_api(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CertsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_acme_bin")]
    pub acme_bin: PathBuf,
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,
    #[serde(default = "default_webroot")]
    pub webroot: PathBuf,
}

impl Default for CertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            acme_bin: default_acme_bin(),
            cert_dir: default_cert_dir(),
            webroot: default_webroot(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_initial_delay_mins")]
    pub initial_delay_mins: u64,
    #[serde(default = "default_interval_mins")]
    pub interval_mins: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl BackupConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_mins * 60)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_mins.max(1) * 60)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_backup_dir(),
            initial_delay_mins: default_initial_delay_mins(),
            interval_mins: default_interval_mins(),
            retention_days: default_retention_days(),
        }
    }
}

// Default functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/tenants.db")
}
fn default_apps_dir() -> PathBuf {
    PathBuf::from("/var/www")
}
fn default_builds_dir() -> PathBuf {
    PathBuf::from("/var/www/builds")
}
fn default_status_dir() -> PathBuf {
    PathBuf::from("/var/www/status")
}
fn default_app_type() -> String {
    "node".into()
}
fn default_port_range() -> [u16; 2] {
    crate::tenant::allocator::DEFAULT_PORT_RANGE
}
fn default_worker_count() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_fake_step_delay_ms() -> u64 {
    800
}
fn default_max_attempts() -> u32 {
    5
}
fn default_delay_ms() -> u64 {
    2000
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_sites_available() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-available")
}
fn default_sites_enabled() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled")
}
fn default_nginx_test() -> String {
    "nginx -t".into()
}
fn default_nginx_reload() -> String {
    "systemctl reload nginx".into()
}
fn default_caddy_api() -> String {
    "http://localhost:2019".into()
}
fn default_acme_bin() -> PathBuf {
    PathBuf::from("/root/.acme.sh/acme.sh")
}
fn default_cert_dir() -> PathBuf {
    PathBuf::from("/etc/letsencrypt/tenants")
}
fn default_webroot() -> PathBuf {
    PathBuf::from("/var/www/letsencrypt")
}
fn default_backup_dir() -> PathBuf {
    PathBuf::from("data/backups")
}
fn default_initial_delay_mins() -> u64 {
    5
}
fn default_interval_mins() -> u64 {
    60
}
fn default_retention_days() -> u64 {
    7
}

/// Load config from TOML file with env var overrides.
pub fn load(path: &str) -> anyhow::Result<PlatformConfig> {
    let content = if std::path::Path::new(path).exists() {
        std::fs::read_to_string(path)?
    } else {
        tracing::warn!("Config file not found at {}, using defaults", path);
        String::new()
    };

    let mut config: PlatformConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn apply_env_overrides(
    config: &mut PlatformConfig,
    var: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = var("TENANTFORGE_HOST") {
        config.host = v;
    }
    if let Some(v) = var("TENANTFORGE_PORT") {
        config.port = v.parse()?;
    }
    if let Some(v) = var("TENANTFORGE_DB_PATH") {
        config.database_path = PathBuf::from(v);
    }
    if let Some(v) = var("PROVISIONING_API_KEY") {
        config.api_key = Some(v);
    }
    if let Some(v) = var("ALERT_WEBHOOK_URL") {
        config.alerts.webhook_url = Some(v);
    }
    if let Some(v) = var("ALERT_WEBHOOK_SECRET") {
        config.alerts.webhook_secret = Some(v);
    }
    Ok(())
}
