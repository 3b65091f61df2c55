use crate::tenant::traits::{CommandExecutor, RoutingConfigService};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tera::Tera;
use uuid::Uuid;

const SITE_TEMPLATE: &str = "nginx_site.conf";

const SITE_TEMPLATE_SRC: &str = r#"# tenant: {{ domain }}
server {
    listen 80;
    listen [::]:80;
    server_name {{ domain }};

    location /.well-known/acme-challenge/ {
        root {{ webroot }};
    }

    location / {
        return 301 https://$server_name$request_uri;
    }
}

server {
    listen 443 ssl http2;
    listen [::]:443 ssl http2;
    server_name {{ domain }};

    ssl_certificate {{ ssl_certificate }};
    ssl_certificate_key {{ ssl_certificate_key }};
    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_ciphers HIGH:!aNULL:!MD5;
    ssl_prefer_server_ciphers on;

    location / {
        proxy_pass http://127.0.0.1:{{ port }};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_http_version 1.1;
        proxy_buffering off;
        proxy_request_buffering off;
    }

    location /health {
        proxy_pass http://127.0.0.1:{{ port }}/;
        access_log off;
    }
}
"#;

/// Snakeoil pair shipped by Debian/Ubuntu; used until ACME issues a real one.
pub const FALLBACK_CERT: &str = "/etc/ssl/certs/ssl-cert-snakeoil.pem";
pub const FALLBACK_KEY: &str = "/etc/ssl/private/ssl-cert-snakeoil.key";

static PROXY_PORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"proxy_pass http://127\.0\.0\.1:(\d+);").expect("static regex"));

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct NginxSettings {
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub webroot: PathBuf,
    pub test_command: String,
    pub reload_command: String,
}

/// Writes one server block per tenant, links it into `sites-enabled`, then
/// validates and reloads nginx.
pub struct NginxRouting {
    settings: NginxSettings,
    executor: Arc<dyn CommandExecutor>,
    tera: Tera,
}

/// `shop.example.com` -> `shop_example_com.conf`
pub fn site_file_name(domain: &str) -> String {
    format!("{}.conf", domain.replace('.', "_"))
}

impl NginxRouting {
    pub fn new(settings: NginxSettings, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(SITE_TEMPLATE, SITE_TEMPLATE_SRC)?;
        Ok(Self {
            settings,
            executor,
            tera,
        })
    }

    pub fn render(&self, domain: &str, port: u16, tls: Option<&TlsPaths>) -> Result<String> {
        let (cert, key) = match tls {
            Some(t) => (
                t.certificate.to_string_lossy().into_owned(),
                t.key.to_string_lossy().into_owned(),
            ),
            None => (FALLBACK_CERT.to_string(), FALLBACK_KEY.to_string()),
        };
        let mut ctx = tera::Context::new();
        ctx.insert("domain", domain);
        ctx.insert("port", &port);
        ctx.insert("webroot", &self.settings.webroot.to_string_lossy());
        ctx.insert("ssl_certificate", &cert);
        ctx.insert("ssl_certificate_key", &key);
        Ok(self.tera.render(SITE_TEMPLATE, &ctx)?)
    }

    fn site_path(&self, domain: &str) -> PathBuf {
        self.settings.sites_available.join(site_file_name(domain))
    }

    /// Write (or overwrite) the site file and make sure it is enabled.
    pub async fn write_site(&self, domain: &str, port: u16, tls: Option<&TlsPaths>) -> Result<PathBuf> {
        let conf = self.render(domain, port, tls)?;
        let path = self.site_path(domain);
        tokio::fs::create_dir_all(&self.settings.sites_available).await?;
        tokio::fs::write(&path, conf)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("nginx: config written to {}", path.display());

        if let Err(e) = self.enable(&path).await {
            tracing::warn!("nginx: failed to enable {}: {}", path.display(), e);
        }
        Ok(path)
    }

    async fn enable(&self, site: &Path) -> Result<()> {
        let link = self.settings.sites_enabled.join(site_file_name_of(site));
        tokio::fs::create_dir_all(&self.settings.sites_enabled).await?;
        match tokio::fs::remove_file(&link).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::symlink(site, &link).await?;
        Ok(())
    }

    /// `nginx -t`, then reload. A failed test aborts before reloading.
    pub async fn reload(&self) -> Result<()> {
        self.executor
            .execute(&self.settings.test_command, None)
            .await
            .context("nginx config test failed")?;
        self.executor
            .execute(&self.settings.reload_command, None)
            .await
            .context("nginx reload failed")?;
        tracing::info!("nginx: reloaded");
        Ok(())
    }

    /// Swap the fallback certificate for an issued one, keeping the port
    /// already recorded in the site file.
    pub async fn enable_tls(&self, domain: &str, tls: &TlsPaths) -> Result<()> {
        let path = self.site_path(domain);
        let existing = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let port = proxy_port(&existing)
            .with_context(|| format!("no upstream port in {}", path.display()))?;
        self.write_site(domain, port, Some(tls)).await?;
        self.reload().await
    }
}

fn site_file_name_of(site: &Path) -> std::ffi::OsString {
    site.file_name().map(|n| n.to_os_string()).unwrap_or_default()
}

fn proxy_port(conf: &str) -> Option<u16> {
    PROXY_PORT_RE
        .captures(conf)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl RoutingConfigService for NginxRouting {
    async fn generate_and_reload(&self, tenant_id: Uuid, domain: &str, port: u16) -> Result<()> {
        tracing::info!(tenant_id = %tenant_id, "nginx: routing {} -> 127.0.0.1:{}", domain, port);
        self.write_site(domain, port, None).await?;
        self.reload().await
    }
}
