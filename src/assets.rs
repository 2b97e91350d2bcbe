use crate::error::{CardPressError, Result};
use base64::Engine;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tiny_skia::Pixmap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Font,
    Markdown,
    Other,
}

impl AssetKind {
    /// Guesses the kind from a file extension.
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" => AssetKind::Image,
            "ttf" | "otf" => AssetKind::Font,
            "md" | "markdown" | "txt" => AssetKind::Markdown,
            _ => AssetKind::Other,
        }
    }
}

/// Resolves an asset reference (as written in a document or a channel style)
/// to raw bytes. Implementations must be shareable with the background worker.
pub trait AssetSource: Send + Sync {
    fn fetch(&self, source: &str) -> Result<Vec<u8>>;
}

/// Serves assets from a directory. Leading slashes are treated as relative to
/// the root, so `/paper-normal.jpg` and `paper-normal.jpg` resolve the same way.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, source: &str) -> Result<PathBuf> {
        let relative = Path::new(source.trim().trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(CardPressError::asset(
                source,
                "path escapes the asset root",
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetSource for FsAssetSource {
    fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        let path = self.resolve(source)?;
        std::fs::read(&path)
            .map_err(|err| CardPressError::asset(source, format!("{}: {err}", path.display())))
    }
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub kind: AssetKind,
    pub data: Arc<Vec<u8>>,
}

impl Asset {
    pub fn new(name: impl Into<String>, kind: AssetKind, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind,
            data: Arc::new(data),
        }
    }
}

/// In-memory asset store, mostly used for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct AssetBundle {
    pub assets: Vec<Asset>,
}

impl AssetBundle {
    pub fn add(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    pub fn with(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let kind = AssetKind::from_path(&name);
        self.add(Asset::new(name, kind, data));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        let key = normalize_asset_name(name);
        self.assets
            .iter()
            .rev()
            .find(|asset| normalize_asset_name(&asset.name) == key)
    }

    pub fn font_assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets
            .iter()
            .filter(|asset| asset.kind == AssetKind::Font)
    }
}

impl AssetSource for AssetBundle {
    fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        self.get(source)
            .map(|asset| asset.data.as_ref().clone())
            .ok_or_else(|| CardPressError::asset(source, "not found in asset bundle"))
    }
}

/// Tries each source in order and returns the first hit.
#[derive(Clone, Default)]
pub struct LayeredSource {
    layers: Vec<Arc<dyn AssetSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Arc<dyn AssetSource>) {
        self.layers.push(source);
    }
}

impl AssetSource for LayeredSource {
    fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        let mut last_err = None;
        for layer in &self.layers {
            match layer.fetch(source) {
                Ok(bytes) => return Ok(bytes),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| CardPressError::asset(source, "no asset source configured")))
    }
}

fn normalize_asset_name(name: &str) -> &str {
    name.trim().trim_start_matches('/')
}

/// Fetches raw bytes, decoding inline `data:` URIs without touching the source.
pub fn fetch_bytes(source: &dyn AssetSource, src: &str) -> Result<Vec<u8>> {
    if src.starts_with("data:") {
        let (_mime, data) = parse_data_uri(src)
            .ok_or_else(|| CardPressError::asset(truncate_source(src), "malformed data URI"))?;
        return Ok(data);
    }
    source.fetch(src)
}

pub fn fetch_text(source: &dyn AssetSource, src: &str) -> Result<String> {
    let bytes = fetch_bytes(source, src)?;
    String::from_utf8(bytes).map_err(|_| CardPressError::asset(src, "document is not valid UTF-8"))
}

/// A decoded raster image, stored premultiplied for tiny-skia.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub source: String,
    pixmap: Pixmap,
}

impl ImageAsset {
    pub fn decode(source: impl Into<String>, data: &[u8]) -> Result<Self> {
        let source = source.into();
        let pixmap = decode_image_to_pixmap(data).ok_or_else(|| {
            CardPressError::asset(truncate_source(&source), "unsupported or corrupt image data")
        })?;
        Ok(Self { source, pixmap })
    }

    pub fn from_pixmap(source: impl Into<String>, pixmap: Pixmap) -> Self {
        Self {
            source: source.into(),
            pixmap,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

pub fn load_image(source: &dyn AssetSource, src: &str) -> Result<Arc<ImageAsset>> {
    let bytes = fetch_bytes(source, src)?;
    ImageAsset::decode(src, &bytes).map(Arc::new)
}

/// Decoded-image memo for one pipeline invocation. Background textures are
/// shared by every card of a channel, so each source is decoded once.
#[derive(Default)]
pub struct ImageCache {
    images: Mutex<HashMap<String, Arc<ImageAsset>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, source: &dyn AssetSource, src: &str) -> Result<Arc<ImageAsset>> {
        if let Ok(images) = self.images.lock() {
            if let Some(image) = images.get(src) {
                return Ok(image.clone());
            }
        }
        let image = load_image(source, src)?;
        if let Ok(mut images) = self.images.lock() {
            images.insert(src.to_string(), image.clone());
        }
        Ok(image)
    }

    pub fn len(&self) -> usize {
        self.images.lock().map(|images| images.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn decode_image_to_pixmap(data: &[u8]) -> Option<Pixmap> {
    let format = image::guess_format(data).ok()?;
    let decoded = image::load_from_memory_with_format(data, format).ok()?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

fn truncate_source(src: &str) -> String {
    const MAX_CHARS: usize = 48;
    if src.chars().count() <= MAX_CHARS {
        return src.to_string();
    }
    let mut out: String = src.chars().take(MAX_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{ImageFormat, Rgba, RgbaImage};

    pub(crate) fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }
}
