//! OCR fallback for scanned PDFs.
//!
//! Invoked only when the native text layer fails the validity heuristic.
//! Pages are rasterized with `pdftoppm` (poppler-utils) and recognized with
//! `tesseract`, both run as child processes — the same local-tools approach
//! used for external document parsing elsewhere in the stack. Page
//! recognition runs on a bounded pool so slow OCR jobs never head-of-line
//! block the fast structured-extraction path.
//!
//! OCR is attempted at most once per document per extraction attempt; there
//! is no internal retry loop.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::TutorError;

/// Optical character recognition over a rendered document.
///
/// Trait seam so tests (and alternative engines) can stand in for the
/// tesseract-backed implementation.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Render every page of a PDF and recognize it, returning per-page text
    /// joined with newlines.
    async fn recognize_pdf(&self, bytes: &[u8]) -> Result<String, TutorError>;
}

/// Tesseract-backed engine: `pdftoppm` for rasterization, `tesseract` for
/// recognition, single configured language, paragraph-level segmentation
/// (`--psm 4`).
pub struct TesseractEngine {
    language: String,
    dpi: u32,
    pdftoppm_path: PathBuf,
    tesseract_path: PathBuf,
    /// Bounds concurrent page recognitions (CPU-bound work).
    workers: Arc<Semaphore>,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            dpi: config.dpi,
            pdftoppm_path: config.pdftoppm_path.clone(),
            tesseract_path: config.tesseract_path.clone(),
            workers: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// Rasterize all pages into `dir`, producing `page-N.png` files.
    async fn render_pages(&self, bytes: &[u8], dir: &std::path::Path) -> Result<Vec<PathBuf>, TutorError> {
        let pdf_path = dir.join("input.pdf");
        tokio::fs::write(&pdf_path, bytes)
            .await
            .map_err(|e| TutorError::Ocr(format!("failed to stage PDF: {}", e)))?;

        let output = tokio::process::Command::new(&self.pdftoppm_path)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&pdf_path)
            .arg(dir.join("page"))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                TutorError::Ocr(format!(
                    "failed to run {}: {}",
                    self.pdftoppm_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TutorError::Ocr(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| TutorError::Ocr(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
            .collect();
        // pdftoppm zero-pads page numbers, so lexicographic order is page order
        pages.sort();

        if pages.is_empty() {
            return Err(TutorError::Ocr("no pages rendered".to_string()));
        }
        Ok(pages)
    }

}

/// Recognize a single rendered page by piping the PNG through tesseract.
async fn recognize_page(
    tesseract_path: &std::path::Path,
    language: &str,
    png_path: &std::path::Path,
) -> Result<String, TutorError> {
    let png = tokio::fs::read(png_path)
        .await
        .map_err(|e| TutorError::Ocr(e.to_string()))?;

    let mut child = tokio::process::Command::new(tesseract_path)
        .arg("stdin")
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .arg("--psm")
        .arg("4")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            TutorError::Ocr(format!("failed to run {}: {}", tesseract_path.display(), e))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&png)
            .await
            .map_err(|e| TutorError::Ocr(e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| TutorError::Ocr(e.to_string()))?;

    if !output.status.success() {
        return Err(TutorError::Ocr(format!(
            "tesseract exited with {}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize_pdf(&self, bytes: &[u8]) -> Result<String, TutorError> {
        let dir = tempfile::tempdir().map_err(|e| TutorError::Ocr(e.to_string()))?;
        let pages = self.render_pages(bytes, dir.path()).await?;
        debug!(pages = pages.len(), "rendered PDF for OCR");

        let mut set = JoinSet::new();
        for (index, page) in pages.into_iter().enumerate() {
            let workers = Arc::clone(&self.workers);
            let language = self.language.clone();
            let tesseract_path = self.tesseract_path.clone();
            set.spawn(async move {
                let permit = workers.acquire_owned().await;
                if permit.is_err() {
                    return (index, Err(TutorError::Ocr("worker pool closed".to_string())));
                }
                (index, recognize_page(&tesseract_path, &language, &page).await)
            });
        }

        let mut texts: Vec<(usize, String)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, result) =
                joined.map_err(|e| TutorError::Ocr(format!("page task failed: {}", e)))?;
            texts.push((index, result?));
        }
        texts.sort_by_key(|(index, _)| *index);

        Ok(texts
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrConfig;

    #[tokio::test]
    async fn missing_renderer_reports_ocr_failure() {
        let config = OcrConfig {
            pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
            ..OcrConfig::default()
        };
        let engine = TesseractEngine::new(&config);
        let err = engine.recognize_pdf(b"%PDF-1.4").await.unwrap_err();
        assert!(matches!(err, TutorError::Ocr(_)));
    }
}
