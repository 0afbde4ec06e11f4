use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, warn};

/// Files written while reading a card: the holder photo and, optionally, a
/// verbatim copy of the card dump. Neither is critical; failures are logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardArtifacts {
    media_root: PathBuf,
    data_collector_dir: Option<PathBuf>,
}

impl CardArtifacts {
    pub fn new(media_root: impl Into<PathBuf>, data_collector_dir: Option<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            data_collector_dir,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn data_collector_dir(&self) -> Option<&Path> {
        self.data_collector_dir.as_deref()
    }

    /// Where the photo of the given card lives: `<media_root>/beid/<card_number>.jpg`.
    pub fn image_path(&self, card_number: &str) -> PathBuf {
        self.media_root
            .join("beid")
            .join(format!("{card_number}.jpg"))
    }

    /// Decode and store a photo, overwriting an earlier read of the same card.
    pub fn store_photo(&self, card_number: &str, encoded: &str) -> Option<PathBuf> {
        if !is_safe_file_stem(card_number) {
            warn!(card_number, "refusing to derive an image path from this card number");
            return None;
        }

        let compact: String = encoded.split_whitespace().collect();
        let bytes = match STANDARD.decode(compact.as_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(card_number, error = %err, "photo data is not valid base64");
                return None;
            }
        };

        let path = self.image_path(card_number);
        if path.exists() {
            warn!(path = %path.display(), "overwriting existing image file");
        }

        match write_file(&path, &bytes) {
            Ok(()) => Some(path),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to store image file");
                None
            }
        }
    }

    /// Keep the raw dump in the data collector directory, when one is configured.
    pub fn collect_raw(&self, card_number: &str, raw: &str) -> Option<PathBuf> {
        let dir = self.data_collector_dir.as_ref()?;
        if !is_safe_file_stem(card_number) {
            warn!(card_number, "not collecting card data without a usable card number");
            return None;
        }

        let path = dir.join(format!("{card_number}.txt"));
        match write_file(&path, raw.as_bytes()) {
            Ok(()) => {
                info!(path = %path.display(), "wrote eid card data");
                Some(path)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to write eid card data");
                None
            }
        }
    }
}

fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn is_safe_file_stem(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
