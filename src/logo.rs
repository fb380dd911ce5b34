//! Logo manifest loading and header-template substitution.
//!
//! Header/footer templates may embed `__LOGO_SRC__`, `__LOGO_WIDTH__` and
//! `__LOGO_HEIGHT__` placeholder tokens. The HTTP layer resolves a named
//! logo from a JSON manifest into a [`LogoAsset`] (base64 data URI plus
//! print dimensions); substitution itself is a pure function so it can be
//! tested without a browser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::{RenderError, Result};

pub const LOGO_SRC_TOKEN: &str = "__LOGO_SRC__";
pub const LOGO_WIDTH_TOKEN: &str = "__LOGO_WIDTH__";
pub const LOGO_HEIGHT_TOKEN: &str = "__LOGO_HEIGHT__";

/// Raster images are 96 dpi while print templates measure in points (72
/// per inch), so pixel dimensions shrink by this factor.
const PRINT_SCALE: f64 = 0.75;

/// A resolved logo, ready for template substitution.
#[derive(Debug, Clone)]
pub struct LogoAsset {
    /// `data:<mime>;base64,...` URI of the image bytes.
    pub data_uri: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    filename: String,
}

/// Lookup table from logo name to image file, loaded once at startup.
#[derive(Debug, Default)]
pub struct LogoRegistry {
    dir: PathBuf,
    entries: BTreeMap<String, String>,
}

impl LogoRegistry {
    /// A registry that knows no logos; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a manifest of `{"name": {"filename": "name.png"}}` entries.
    /// Image files are expected next to the manifest.
    pub fn load(manifest: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(manifest).map_err(|e| {
            RenderError::Config(format!("failed to read {}: {e}", manifest.display()))
        })?;
        let entries: BTreeMap<String, ManifestEntry> = serde_json::from_str(&raw)
            .map_err(|e| {
                RenderError::Config(format!("failed to parse {}: {e}", manifest.display()))
            })?;
        let dir = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            dir,
            entries: entries
                .into_iter()
                .map(|(name, entry)| (name, entry.filename))
                .collect(),
        })
    }

    /// Known logo names, for validation error messages.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Resolve a logo name. `Ok(None)` means the name is unknown; `Err`
    /// means the manifest names a file that cannot be read or decoded.
    pub fn resolve(&self, name: &str) -> Result<Option<LogoAsset>> {
        let Some(filename) = self.entries.get(name) else {
            return Ok(None);
        };
        let path = self.dir.join(filename);
        let bytes = std::fs::read(&path)?;
        let (width, height) = image::image_dimensions(&path)
            .map_err(|e| RenderError::Config(format!("bad logo image {}: {e}", path.display())))?;
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        Ok(Some(LogoAsset {
            data_uri: format!("data:{mime};base64,{}", BASE64.encode(&bytes)),
            width: f64::from(width) * PRINT_SCALE,
            height: f64::from(height) * PRINT_SCALE,
        }))
    }
}

/// Substitute logo tokens into a header/footer template. Templates without
/// tokens pass through untouched; substitution happens once per request,
/// before PDF generation.
pub fn apply_logo(template: &str, logo: &LogoAsset) -> String {
    template
        .replace(LOGO_SRC_TOKEN, &logo.data_uri)
        .replace(LOGO_WIDTH_TOKEN, &logo.width.to_string())
        .replace(LOGO_HEIGHT_TOKEN, &logo.height.to_string())
}
