mod assets;
mod cache;
mod canvas;
mod config;
mod dispatch;
mod document;
mod error;
mod font;
mod measure;
mod paginate;
mod pipeline;
mod raster;
mod text;
mod types;

pub use assets::{
    Asset, AssetBundle, AssetKind, AssetSource, FsAssetSource, ImageAsset, ImageCache,
    LayeredSource, fetch_bytes, fetch_text, load_image,
};
pub use cache::{RequestKey, ResultCache, SharedResult, Slot};
pub use canvas::{Canvas, Command, record_card, tile_size};
pub use config::{CardPressConfig, FontConfig};
pub use dispatch::{CancelToken, ContentHandle, ContentSession, Dispatcher};
pub use document::{Block, ImageVariants, load_markdown, parse_document, variant_name};
pub use error::{CardPressError, Result};
pub use font::FontRegistry;
pub use measure::{MeasuredBlock, measure_block, measure_blocks};
pub use paginate::{Card, paginate};
pub use pipeline::{
    ContentRequest, MarkdownInput, PipelineContext, PipelineResult, RenderedCard, run_pipeline,
};
pub use raster::{
    ChannelSet, ChannelStyle, RasterBuffer, RasterContext, rasterize_card, rasterize_defaults,
};
pub use text::{
    FontSpec, LineLayout, TextAlign, TextLayout, TextRole, TextShaper, TextStyle, TextStyles,
    layout_text, measure_text,
};
pub use types::{Color, PageGeometry, Rect, Size};

use std::path::PathBuf;
use std::sync::Arc;

/// Configured card engine: fonts, assets, text styles and channels.
///
/// `render` runs a request synchronously on the calling thread; `dispatcher`
/// hands out a background executor with request deduplication.
pub struct CardPress {
    context: PipelineContext,
    geometry: PageGeometry,
    device_pixel_ratio: f32,
    workers: usize,
    font_count: usize,
}

impl CardPress {
    pub fn builder() -> CardPressBuilder {
        CardPressBuilder::new()
    }

    pub fn from_config(config: &CardPressConfig) -> Result<Self> {
        CardPressBuilder::new().config(config).build()
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn font_count(&self) -> usize {
        self.font_count
    }

    /// A request using the engine's page geometry and pixel ratio.
    pub fn request(&self, markdown: MarkdownInput) -> ContentRequest {
        ContentRequest {
            markdown,
            geometry: self.geometry,
            device_pixel_ratio: self.device_pixel_ratio,
        }
    }

    pub fn render(&self, request: &ContentRequest) -> Result<PipelineResult> {
        run_pipeline(request, &self.context, &CancelToken::new())
    }

    pub fn render_markdown(&self, text: &str) -> Result<PipelineResult> {
        self.render(&self.request(MarkdownInput::Inline(text.to_string())))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.context.clone(), self.workers)
    }
}

pub struct CardPressBuilder {
    geometry: PageGeometry,
    device_pixel_ratio: f32,
    channels: ChannelSet,
    text_styles: TextStyles,
    font_files: Vec<FontConfig>,
    font_dirs: Vec<PathBuf>,
    font_bytes: Vec<(Vec<u8>, Option<String>)>,
    asset_source: Option<Arc<dyn AssetSource>>,
    asset_root: Option<PathBuf>,
    asset_bundle: AssetBundle,
    workers: usize,
}

impl Default for CardPressBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CardPressBuilder {
    pub fn new() -> Self {
        let defaults = CardPressConfig::default();
        Self {
            geometry: defaults.geometry,
            device_pixel_ratio: defaults.device_pixel_ratio,
            channels: defaults.channels,
            text_styles: defaults.text_styles,
            font_files: Vec::new(),
            font_dirs: Vec::new(),
            font_bytes: Vec::new(),
            asset_source: None,
            asset_root: None,
            asset_bundle: AssetBundle::default(),
            workers: defaults.workers,
        }
    }

    /// Copies every setting from a loaded config.
    pub fn config(mut self, config: &CardPressConfig) -> Self {
        self.geometry = config.geometry;
        self.device_pixel_ratio = config.device_pixel_ratio;
        self.channels = config.channels.clone();
        self.text_styles = config.text_styles.clone();
        self.font_files.extend(config.fonts.iter().cloned());
        self.font_dirs.extend(config.font_dirs.iter().cloned());
        if let Some(root) = &config.asset_root {
            self.asset_root = Some(root.clone());
        }
        self.workers = config.workers;
        self
    }

    pub fn geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn device_pixel_ratio(mut self, device_pixel_ratio: f32) -> Self {
        self.device_pixel_ratio = device_pixel_ratio;
        self
    }

    pub fn channels(mut self, channels: ChannelSet) -> Self {
        self.channels = channels;
        self
    }

    pub fn text_styles(mut self, text_styles: TextStyles) -> Self {
        self.text_styles = text_styles;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(FontConfig {
            path: path.into(),
            family: None,
        });
        self
    }

    /// Registers a font file under an extra family name, e.g. `"Heading Font"`.
    pub fn register_font_as(mut self, path: impl Into<PathBuf>, family: impl Into<String>) -> Self {
        self.font_files.push(FontConfig {
            path: path.into(),
            family: Some(family.into()),
        });
        self
    }

    pub fn register_font_bytes(mut self, data: Vec<u8>, family: Option<String>) -> Self {
        self.font_bytes.push((data, family));
        self
    }

    pub fn asset_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(path.into());
        self
    }

    /// Custom asset lookup, consulted after the in-memory bundle and before
    /// the asset root.
    pub fn asset_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.asset_source = Some(source);
        self
    }

    pub fn asset(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.asset_bundle = self.asset_bundle.with(name, data);
        self
    }

    pub fn asset_bundle(mut self, bundle: AssetBundle) -> Self {
        for asset in bundle.assets {
            self.asset_bundle.add(asset);
        }
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn build(self) -> Result<CardPress> {
        let config = CardPressConfig {
            geometry: self.geometry,
            device_pixel_ratio: self.device_pixel_ratio,
            channels: self.channels,
            text_styles: self.text_styles,
            fonts: Vec::new(),
            font_dirs: Vec::new(),
            asset_root: None,
            workers: self.workers,
        };
        config.validate()?;

        let mut registry = FontRegistry::new();
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for font in &self.font_files {
            let source = font.path.display().to_string();
            let data = std::fs::read(&font.path)
                .map_err(|err| CardPressError::asset(&source, err.to_string()))?;
            registry.register_bytes(data, Some(&source), font.family.as_deref())?;
        }
        for asset in self.asset_bundle.font_assets() {
            let family = std::path::Path::new(&asset.name)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string);
            registry.register_bytes(asset.data.as_ref().clone(), Some(&asset.name), family.as_deref())?;
        }
        for (data, family) in self.font_bytes {
            registry.register_bytes(data, None, family.as_deref())?;
        }
        if registry.is_empty() {
            log::warn!("no fonts registered; documents with text will fail to render");
        }

        let mut assets = LayeredSource::new();
        if !self.asset_bundle.assets.is_empty() {
            assets.push(Arc::new(self.asset_bundle));
        }
        if let Some(source) = self.asset_source {
            assets.push(source);
        }
        if let Some(root) = self.asset_root {
            assets.push(Arc::new(FsAssetSource::new(root)));
        }

        let font_count = registry.len();
        Ok(CardPress {
            context: PipelineContext {
                assets: Arc::new(assets),
                shaper: Arc::new(registry),
                text_styles: config.text_styles,
                channels: config.channels,
            },
            geometry: config.geometry,
            device_pixel_ratio: config.device_pixel_ratio,
            workers: config.workers.max(1),
            font_count,
        })
    }
}
