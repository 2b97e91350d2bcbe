use crate::error::{CardPressError, Result};
use crate::pipeline::default_device_pixel_ratio;
use crate::raster::ChannelSet;
use crate::text::TextStyles;
use crate::types::PageGeometry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A font file plus an optional family alias the style table can use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub family: Option<String>,
}

/// Engine settings loadable from JSON. Every field is optional.
///
/// ```json
/// {
///   "geometry": { "width": 300, "height": 420, "padding": 32, "gap": 24 },
///   "device_pixel_ratio": 2,
///   "fonts": [{ "path": "font/montserrat-700.ttf", "family": "Heading Font" }],
///   "asset_root": "public"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardPressConfig {
    pub geometry: PageGeometry,
    pub device_pixel_ratio: f32,
    pub channels: ChannelSet,
    pub text_styles: TextStyles,
    pub fonts: Vec<FontConfig>,
    pub font_dirs: Vec<PathBuf>,
    pub asset_root: Option<PathBuf>,
    pub workers: usize,
}

impl Default for CardPressConfig {
    fn default() -> Self {
        Self {
            geometry: PageGeometry::default(),
            device_pixel_ratio: default_device_pixel_ratio(),
            channels: ChannelSet::default(),
            text_styles: TextStyles::default(),
            fonts: Vec::new(),
            font_dirs: Vec::new(),
            asset_root: None,
            workers: 1,
        }
    }
}

impl CardPressConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| CardPressError::InvalidConfiguration(format!("config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config. Relative font and asset paths are resolved
    /// against the config file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&raw)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.fonts.iter_mut().for_each(|font| join(&mut font.path));
        self.font_dirs.iter_mut().for_each(join);
        if let Some(root) = self.asset_root.as_mut() {
            join(root);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        let dpr = self.device_pixel_ratio;
        if !(dpr.is_finite() && dpr > 0.0) {
            return Err(CardPressError::InvalidConfiguration(format!(
                "device_pixel_ratio must be positive, got {dpr}"
            )));
        }
        self.channels.validate()?;
        for (name, style) in [
            ("h1", &self.text_styles.h1),
            ("h2", &self.text_styles.h2),
            ("p", &self.text_styles.p),
        ] {
            if !(style.font_size > 0.0 && style.line_height > 0.0) {
                return Err(CardPressError::InvalidConfiguration(format!(
                    "text style '{name}' needs a positive font size and line height"
                )));
            }
        }
        Ok(())
    }
}
