use crate::tenant::traits::StatusPageService;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tera::Tera;
use uuid::Uuid;

const TEMPLATE: &str = "status.html";

const TEMPLATE_SRC: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta http-equiv="refresh" content="5">
    <title>{{ domain }} is being set up</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f4f5f7;
            min-height: 100vh;
            margin: 0;
            display: flex;
            align-items: center;
            justify-content: center;
        }
        .card {
            background: #fff;
            border-radius: 10px;
            box-shadow: 0 10px 30px rgba(0, 0, 0, 0.12);
            padding: 48px 40px;
            max-width: 560px;
            text-align: center;
        }
        .domain { color: #4b5bdc; font-family: monospace; font-size: 22px; word-break: break-all; }
        .message { color: #555; margin: 24px 0; }
        .meta { color: #888; font-family: monospace; font-size: 13px; text-align: left; }
        .spinner {
            display: inline-block;
            width: 36px;
            height: 36px;
            border: 4px solid #e6e6e6;
            border-top-color: #4b5bdc;
            border-radius: 50%;
            animation: spin 1s linear infinite;
        }
        @keyframes spin { to { transform: rotate(360deg); } }
    </style>
</head>
<body>
    <div class="card">
        <div class="spinner"></div>
        <p class="domain">{{ domain }}</p>
        <p class="message">{{ message }}</p>
        <div class="meta">
            <p>Instance: {{ instance_id }}</p>
            <p>Started: {{ started_at }}</p>
        </div>
    </div>
</body>
</html>
"#;

/// Writes a placeholder `index.html` per domain under `status_dir` while the
/// tenant is being provisioned.
pub struct HtmlStatusPages {
    status_dir: PathBuf,
    tera: Tera,
}

impl HtmlStatusPages {
    pub fn new(status_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE, TEMPLATE_SRC)?;
        Ok(Self {
            status_dir: status_dir.into(),
            tera,
        })
    }

    pub fn render(&self, domain: &str, instance_id: Uuid, message: &str) -> Result<String> {
        let mut ctx = tera::Context::new();
        ctx.insert("domain", domain);
        ctx.insert("instance_id", &instance_id.to_string());
        ctx.insert("message", message);
        ctx.insert("started_at", &chrono::Utc::now().to_rfc3339());
        Ok(self.tera.render(TEMPLATE, &ctx)?)
    }

    fn page_dir(&self, domain: &str) -> Result<PathBuf> {
        if domain.is_empty() || domain.starts_with('.') || domain.contains(['/', '\\']) {
            bail!("refusing status page path for {domain:?}");
        }
        Ok(self.status_dir.join(domain))
    }
}

#[async_trait]
impl StatusPageService for HtmlStatusPages {
    async fn generate(&self, domain: &str, instance_id: Uuid, message: &str) -> Result<PathBuf> {
        let dir = self.page_dir(domain)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let page = dir.join("index.html");
        tokio::fs::write(&page, self.render(domain, instance_id, message)?).await?;
        tracing::info!("status: page generated at {}", page.display());
        Ok(page)
    }

    async fn remove(&self, domain: &str) -> Result<()> {
        let dir = self.page_dir(domain)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!("status: page removed for {}", domain);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", dir.display())),
        }
    }
}
