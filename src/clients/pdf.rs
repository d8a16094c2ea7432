use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::template::HtmlRenderer;

/// Renders a named template with a view model into PDF bytes.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render_pdf(&self, template: &str, view: &Value) -> Result<Vec<u8>, Error>;
}

/// Prints rendered HTML to PDF with a headless Chromium process.
///
/// Every call starts its own browser process; nothing is pooled.
pub struct ChromePdfRenderer {
    html: Arc<dyn HtmlRenderer>,
    chrome_path: String,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl ChromePdfRenderer {
    pub fn new(html: Arc<dyn HtmlRenderer>, chrome_path: String, timeout: Duration) -> Self {
        info!(chrome_path = %chrome_path, "Headless PDF renderer initialized");

        Self {
            html,
            chrome_path,
            scratch_dir: std::env::temp_dir(),
            timeout,
        }
    }

    async fn print_to_pdf(&self, html: &str) -> Result<Vec<u8>, Error> {
        let job = Uuid::new_v4();
        let html_path = self.scratch_dir.join(format!("render-{}.html", job));
        let pdf_path = self.scratch_dir.join(format!("render-{}.pdf", job));

        tokio::fs::write(&html_path, html)
            .await
            .map_err(|e| anyhow!("Failed to write render input: {}", e))?;

        let result = self.run_chrome(&html_path, &pdf_path).await;

        for path in [&html_path, &pdf_path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), error = %e, "Render scratch file not removed");
            }
        }

        result
    }

    async fn run_chrome(&self, html_path: &Path, pdf_path: &Path) -> Result<Vec<u8>, Error> {
        let mut command = Command::new(&self.chrome_path);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg(format!("file://{}", html_path.display()))
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("PDF rendering timed out after {:?}", self.timeout))?
            .map_err(|e| anyhow!("Failed to start headless browser: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr, "Headless browser exited with failure");
            return Err(anyhow!("Headless browser exited with {}", output.status));
        }

        let pdf = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| anyhow!("Headless browser produced no PDF: {}", e))?;

        if pdf.is_empty() {
            return Err(anyhow!("Headless browser produced an empty PDF"));
        }

        Ok(pdf)
    }
}

#[async_trait]
impl PdfRenderer for ChromePdfRenderer {
    async fn render_pdf(&self, template: &str, view: &Value) -> Result<Vec<u8>, Error> {
        let html = self.html.render_html(template, view)?;
        let pdf = self.print_to_pdf(&html).await?;

        debug!(template, bytes = pdf.len(), "PDF rendered");

        Ok(pdf)
    }
}
