//! Image storage for avatars, covers and post attachments.
//!
//! Handlers only see the `MediaStore` trait; the default implementation
//! writes into a local directory and publishes files under a URL prefix.

use async_trait::async_trait;
use rand::Rng;
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("empty upload")]
    Empty,

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage contract.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores raw image bytes and returns the public URL.
    async fn store_image(&self, data: &[u8], filename_hint: &str) -> Result<String, MediaError>;

    /// Removes a previously stored image. Unknown URLs are ignored.
    async fn remove_image(&self, url: &str) -> Result<(), MediaError>;
}

pub struct LocalMediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: impl Into<String>) -> Self {
        Self {
            root,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.url_prefix, name)
    }

    /// Maps a URL this store issued back to its file. Anything else is `None`.
    fn path_for(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(&self.url_prefix)?.strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return None;
        }
        Some(self.root.join(name))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store_image(&self, data: &[u8], filename_hint: &str) -> Result<String, MediaError> {
        if data.is_empty() {
            return Err(MediaError::Empty);
        }

        let name = storage_name(filename_hint)?;
        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(&name), data).await?;

        tracing::debug!("Stored image {} ({} bytes)", name, data.len());
        Ok(self.url_for(&name))
    }

    async fn remove_image(&self, url: &str) -> Result<(), MediaError> {
        let Some(path) = self.path_for(url) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builds a collision-free file name: slugified stem, random tag, lowercase extension.
pub fn storage_name(filename_hint: &str) -> Result<String, MediaError> {
    let base = filename_hint
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename_hint);
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext.to_ascii_lowercase())),
        _ => (base, None),
    };

    // Only extensions that resolve to an image type are stored
    let ext = match ext {
        Some(ext) if is_image_ext(&ext) => ext,
        Some(ext) => return Err(MediaError::UnsupportedType(ext)),
        None => return Err(MediaError::UnsupportedType("no extension".to_string())),
    };

    let mut slug = slugify(stem);
    if slug.is_empty() {
        slug.push_str("image");
    }
    let tag: [u8; 4] = rand::thread_rng().gen();

    Ok(format!("{}-{}.{}", slug, hex::encode(tag), ext))
}

fn is_image_ext(ext: &str) -> bool {
    !ext.is_empty()
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && mime_guess::from_ext(ext)
            .first()
            .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE)
}

fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(64);
    slug
}
