use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tar::EntryType;
use tracing::{info, warn};

const ALPINE_URL: &str =
    "https://dl-cdn.alpinelinux.org/alpine/v3.21/releases/x86_64/alpine-minirootfs-3.21.3-x86_64.tar.gz";

/// Lazily downloads and extracts image root filesystems. Every image name
/// currently maps to the Alpine minirootfs.
pub struct ImageManager {
    images_dir: PathBuf,
}

impl ImageManager {
    pub fn new(root_dir: &Path) -> Self {
        Self {
            images_dir: root_dir.join("images"),
        }
    }

    /// Path to a ready rootfs for the given image, downloading on first use.
    pub async fn ensure_image(&self, image: &str) -> Result<PathBuf> {
        let rootfs = self.images_dir.join("alpine");

        // already extracted?
        if rootfs.join("bin/sh").exists() {
            return Ok(rootfs);
        }

        if image != "alpine" {
            warn!("Image {:?} not recognized, using alpine", image);
        }

        info!("Downloading alpine rootfs...");
        tokio::fs::create_dir_all(&rootfs).await?;

        let resp = reqwest::get(ALPINE_URL)
            .await
            .context("download image")?;
        if !resp.status().is_success() {
            return Err(anyhow!("download image: HTTP {}", resp.status()));
        }
        let bytes = resp.bytes().await.context("download image body")?;

        let dst = rootfs.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_tar_gz(&bytes, &dst)).await?;
        if let Err(e) = extracted {
            let _ = tokio::fs::remove_dir_all(&rootfs).await;
            return Err(e.context("extract image"));
        }

        info!("Alpine rootfs ready at {}", rootfs.display());
        Ok(rootfs)
    }
}

fn extract_tar_gz(bytes: &[u8], dst: &Path) -> Result<()> {
    let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(bytes));
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        match entry.header().entry_type() {
            EntryType::Regular
            | EntryType::Directory
            | EntryType::Symlink
            | EntryType::Link => {
                entry.unpack_in(dst)?;
            }
            // device nodes and the like are not needed inside the sandbox
            _ => {}
        }
    }
    Ok(())
}
