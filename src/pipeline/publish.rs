// src/pipeline/publish.rs

//! Artifact publishing.
//!
//! Publishing is an ordered sequence of steps (images first, then one JSON
//! artifact per language). The first failing step aborts the rest and is
//! returned as [`AppError::Publish`].

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{BulletinKind, EqkRecord, ImageRef, Language};
use crate::storage::{ArtifactStore, JSON_CONTENT, PNG_CONTENT, image_key, json_key};
use crate::utils::Fetcher;

/// Downloads shorter than this are treated as error pages.
const MIN_IMAGE_BYTES: usize = 1024;

/// Top-level field of every JSON artifact.
#[derive(Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub jijin_data: EqkRecord,
}

/// Artifact file stems written for a bulletin kind.
pub fn artifact_stems(kind: BulletinKind) -> &'static [&'static str] {
    match kind {
        BulletinKind::KmaInfo | BulletinKind::KmaBreaking => &["data_kma"],
        BulletinKind::JmaIntensity => &["data_jma_sindo"],
        BulletinKind::JmaHypocenter => &["data_jma_singen"],
        BulletinKind::JmaCombined => &["data_jma_sindo", "data_jma_singen"],
    }
}

pub struct Publisher {
    store: Arc<dyn ArtifactStore>,
    fetcher: Fetcher,
    version: String,
    scratch_dir: PathBuf,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        fetcher: Fetcher,
        version: impl Into<String>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            fetcher,
            version: version.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Publish images and per-language artifacts for one bulletin.
    ///
    /// `records` holds the localized record per language; languages without
    /// an entry are published with the Korean record.
    pub async fn publish(&self, records: &BTreeMap<Language, EqkRecord>) -> Result<()> {
        let base = records
            .get(&Language::Ko)
            .ok_or_else(|| AppError::publish("artifact", "no Korean record to publish"))?;

        self.publish_images(base).await?;

        for lang in Language::ALL {
            let record = records.get(&lang).unwrap_or(base);
            self.publish_artifact(record, lang).await?;
        }

        log::info!(
            "[{}] Published {} to {}",
            base.source,
            base.id,
            self.store.describe()
        );
        Ok(())
    }

    async fn publish_images(&self, record: &EqkRecord) -> Result<()> {
        let sizes = record.source.image_sizes();
        for (image, &(width, height)) in record.images.iter().zip(sizes) {
            self.publish_image(image, width, height).await?;
        }
        Ok(())
    }

    async fn publish_image(&self, image: &ImageRef, width: u32, height: u32) -> Result<()> {
        if image.name.is_empty() {
            return Err(AppError::publish("image", format!("no file name in {}", image.url)));
        }

        let raw = self
            .fetcher
            .download(&image.url)
            .await
            .map_err(|e| AppError::publish("image", e))?;

        let received = raw.body.len() as u64;
        if let Some(expected) = raw.content_length.filter(|&expected| received < expected) {
            return Err(AppError::publish(
                "image",
                format!("{}: got {received} of {expected} bytes", image.url),
            ));
        }
        if raw.body.len() < MIN_IMAGE_BYTES {
            return Err(AppError::publish(
                "image",
                format!("{}: body too small ({} bytes)", image.url, raw.body.len()),
            ));
        }

        let scratch = self.scratch_dir.join(&image.name);
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| AppError::publish("image", e))?;

        let key = image_key(&self.version, &image.name);
        let uploaded = match stage_image(&scratch, &raw.body, width, height).await {
            Ok(bytes) => self
                .store
                .put(&key, bytes, PNG_CONTENT)
                .await
                .map_err(|e| AppError::publish("image", e)),
            Err(e) => Err(AppError::publish("image", e)),
        };

        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            log::warn!("Could not remove {}: {e}", scratch.display());
        }

        uploaded?;
        log::debug!("Uploaded {key}");
        Ok(())
    }

    async fn publish_artifact(&self, record: &EqkRecord, lang: Language) -> Result<()> {
        let artifact = Artifact {
            jijin_data: record.clone(),
        };
        let bytes = serde_json::to_vec(&artifact).map_err(|e| AppError::publish("artifact", e))?;

        for stem in artifact_stems(record.kind) {
            let key = json_key(&self.version, &format!("{stem}_{lang}.json"));
            self.store
                .put(&key, bytes.clone(), JSON_CONTENT)
                .await
                .map_err(|e| AppError::publish("artifact", e))?;
        }
        Ok(())
    }
}

/// Write `body` to `scratch`, resize the file in place and return its final
/// contents. An undecodable image is left as downloaded.
async fn stage_image(scratch: &Path, body: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    tokio::fs::write(scratch, body).await?;
    let original = tokio::fs::read(scratch).await?;
    match resize_png(&original, width, height) {
        Ok(resized) => tokio::fs::write(scratch, resized).await?,
        Err(e) => log::warn!(
            "Could not resize {} ({e}); uploading original",
            scratch.display()
        ),
    }
    Ok(tokio::fs::read(scratch).await?)
}

fn resize_png(bytes: &[u8], width: u32, height: u32) -> image::ImageResult<Vec<u8>> {
    let resized = image::load_from_memory(bytes)?.resize_exact(width, height, FilterType::Lanczos3);
    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
