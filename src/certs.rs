use crate::proxy::{NginxRouting, TlsPaths};
use crate::shell::quote;
use crate::tenant::traits::{CertificateService, CommandExecutor};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Issues Let's Encrypt certificates with acme.sh using the HTTP-01 webroot
/// challenge. When routing is nginx the site is switched to the new
/// certificate afterwards.
pub struct AcmeCertificateService {
    executor: Arc<dyn CommandExecutor>,
    acme_bin: PathBuf,
    cert_dir: PathBuf,
    webroot: PathBuf,
    nginx: Option<Arc<NginxRouting>>,
}

impl AcmeCertificateService {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        acme_bin: impl Into<PathBuf>,
        cert_dir: impl Into<PathBuf>,
        webroot: impl Into<PathBuf>,
        nginx: Option<Arc<NginxRouting>>,
    ) -> Self {
        Self {
            executor,
            acme_bin: acme_bin.into(),
            cert_dir: cert_dir.into(),
            webroot: webroot.into(),
            nginx,
        }
    }

    pub fn tls_paths(&self, domain: &str) -> TlsPaths {
        let dir = self.cert_dir.join(domain);
        TlsPaths {
            certificate: dir.join("fullchain.pem"),
            key: dir.join("key.pem"),
        }
    }

    pub fn issue_command(&self, domain: &str) -> String {
        let dir = self.cert_dir.join(domain);
        let path = |name: &str| quote(&dir.join(name).to_string_lossy());
        format!(
            "{} --issue -d {} -w {} --cert-file {} --key-file {} --fullchain-file {} --force",
            quote(&self.acme_bin.to_string_lossy()),
            quote(domain),
            quote(&self.webroot.to_string_lossy()),
            path("cert.pem"),
            path("key.pem"),
            path("fullchain.pem"),
        )
    }
}

#[async_trait]
impl CertificateService for AcmeCertificateService {
    async fn generate_certificate(&self, domain: &str) -> Result<bool> {
        tokio::fs::create_dir_all(&self.webroot).await?;
        tokio::fs::create_dir_all(self.cert_dir.join(domain)).await?;

        tracing::info!("acme: issuing certificate for {}", domain);
        if let Err(e) = self.executor.execute(&self.issue_command(domain), None).await {
            tracing::warn!("acme: issuance failed for {}: {:#}", domain, e);
            return Ok(false);
        }
        tracing::info!("acme: certificate issued for {}", domain);

        if let Some(nginx) = &self.nginx {
            nginx.enable_tls(domain, &self.tls_paths(domain)).await?;
        }
        Ok(true)
    }
}

/// `[certs] enabled = false`: every tenant keeps the fallback certificate.
pub struct DisabledCertificates;

#[async_trait]
impl CertificateService for DisabledCertificates {
    async fn generate_certificate(&self, domain: &str) -> Result<bool> {
        tracing::debug!("acme: disabled, skipping {}", domain);
        Ok(false)
    }
}
