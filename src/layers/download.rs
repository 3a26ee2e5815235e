use std::path::{Path, PathBuf};

use reqwest::{Client, StatusCode};
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

use crate::config::DownloadSettings;
use crate::error::{AppError, AppResult};
use crate::layers::retry::RetryPolicy;
use crate::layers::Paper;

pub struct Downloader {
    client: Client,
    base_dir: PathBuf,
    retry: RetryPolicy,
}

impl Downloader {
    pub fn new(settings: &DownloadSettings) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(settings.timeout()).build()?,
            base_dir: settings.dir.clone(),
            retry: RetryPolicy::new(settings.max_attempts, settings.retry_delay()),
        })
    }

    /// Where the PDF for `paper_id` lives once downloaded: `{dir}/{id}.pdf`.
    pub fn local_path(&self, paper_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.pdf", paper_id))
    }

    /// Downloads `pdf_url` to `{dir}/{paper_id}.pdf`, replacing any existing
    /// copy. The body is streamed to a `.part` file and renamed into place, so
    /// a failed transfer never leaves a truncated PDF behind.
    pub async fn download(&self, pdf_url: &str, paper_id: &str) -> AppResult<PathBuf> {
        let pdf_path = self.local_path(paper_id);
        let part_path = pdf_path.with_extension("pdf.part");

        create_dir_all(&self.base_dir)
            .await
            .map_err(|e| AppError::io(&self.base_dir, e))?;

        let transfer = self
            .retry
            .run("PDF download", |attempt| {
                let part_path = part_path.clone();
                async move {
                    tracing::info!("Downloading PDF from {} (attempt {})", pdf_url, attempt);
                    let mut response = self.client.get(pdf_url).send().await?;

                    if response.status() != StatusCode::OK {
                        return Err(AppError::http(response.status().as_u16(), "PDF download"));
                    }

                    let mut file =
                        File::create(&part_path).await.map_err(|e| AppError::io(&part_path, e))?;
                    while let Some(chunk) = response.chunk().await? {
                        file.write_all(&chunk).await.map_err(|e| AppError::io(&part_path, e))?;
                    }
                    file.flush().await.map_err(|e| AppError::io(&part_path, e))?;
                    Ok(())
                }
            })
            .await;

        if let Err(e) = transfer {
            if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                tracing::debug!("No partial download to remove at {:?}: {}", part_path, cleanup);
            }
            return Err(e);
        }

        tokio::fs::rename(&part_path, &pdf_path)
            .await
            .map_err(|e| AppError::io(&pdf_path, e))?;

        tracing::info!("Saved {} to {:?}", paper_id, pdf_path);
        Ok(pdf_path)
    }

    /// Reuses a previously downloaded copy when one exists.
    pub async fn fetch_or_reuse(&self, paper: &Paper) -> AppResult<PathBuf> {
        let existing = self.local_path(&paper.id);
        if existing.exists() {
            tracing::debug!("Reusing local copy {:?}", existing);
            return Ok(existing);
        }
        self.download(&paper.pdf_url, &paper.id).await
    }
}

/// Hands the file to the operating system's default viewer.
pub fn open_in_viewer(path: &Path) -> AppResult<()> {
    tracing::info!("Opening {:?}", path);
    open::that(path).map_err(|e| AppError::io(path, e))
}
