use crate::assets::{AssetSource, ImageCache};
use crate::dispatch::CancelToken;
use crate::document::{Block, load_markdown, parse_document};
use crate::error::{CardPressError, Result};
use crate::measure::measure_blocks;
use crate::paginate::paginate;
use crate::raster::{ChannelSet, RasterBuffer, RasterContext, rasterize_card, rasterize_defaults};
use crate::text::{TextRole, TextShaper, TextStyles};
use crate::types::PageGeometry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Where the document text comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkdownInput {
    Inline(String),
    /// Resource path resolved through the engine's asset source.
    Source(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub markdown: MarkdownInput,
    #[serde(default)]
    pub geometry: PageGeometry,
    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,
}

pub(crate) fn default_device_pixel_ratio() -> f32 {
    2.0
}

impl ContentRequest {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            markdown: MarkdownInput::Inline(text.into()),
            geometry: PageGeometry::default(),
            device_pixel_ratio: default_device_pixel_ratio(),
        }
    }

    pub fn from_source(path: impl Into<String>) -> Self {
        Self {
            markdown: MarkdownInput::Source(path.into()),
            ..Self::inline(String::new())
        }
    }

    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_device_pixel_ratio(mut self, device_pixel_ratio: f32) -> Self {
        self.device_pixel_ratio = device_pixel_ratio;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RenderedCard {
    pub index: usize,
    pub channels: BTreeMap<String, RasterBuffer>,
}

impl RenderedCard {
    pub fn channel(&self, name: &str) -> Option<&RasterBuffer> {
        self.channels.get(name)
    }

    /// Shared buffers overlaid with this card's own; card channels win.
    pub fn texture_map<'a>(
        &'a self,
        defaults: &'a BTreeMap<String, RasterBuffer>,
    ) -> BTreeMap<&'a str, &'a RasterBuffer> {
        let mut map: BTreeMap<&str, &RasterBuffer> = defaults
            .iter()
            .map(|(name, buffer)| (name.as_str(), buffer))
            .collect();
        for (name, buffer) in &self.channels {
            map.insert(name.as_str(), buffer);
        }
        map
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub cards: Vec<RenderedCard>,
    pub default_channels: BTreeMap<String, RasterBuffer>,
}

impl PipelineResult {
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Engine state every execution reads: assets, fonts, styles and channels.
#[derive(Clone)]
pub struct PipelineContext {
    pub assets: Arc<dyn AssetSource>,
    pub shaper: Arc<dyn TextShaper>,
    pub text_styles: TextStyles,
    pub channels: ChannelSet,
}

/// Runs parse, measure, paginate and rasterize for one request.
///
/// `cancel` is polled between stages and before every channel render.
pub fn run_pipeline(
    request: &ContentRequest,
    context: &PipelineContext,
    cancel: &CancelToken,
) -> Result<PipelineResult> {
    let started = Instant::now();
    cancel.check()?;
    request.geometry.validate()?;
    context.channels.validate()?;

    let assets = context.assets.as_ref();
    let shaper = context.shaper.as_ref();
    let text = match &request.markdown {
        MarkdownInput::Inline(text) => text.clone(),
        MarkdownInput::Source(path) => load_markdown(assets, path)?,
    };

    let stage = Instant::now();
    let blocks = parse_document(&text, assets)?;
    log::debug!("parse: {} blocks in {:?}", blocks.len(), stage.elapsed());
    require_faces(&blocks, shaper, &context.text_styles)?;
    cancel.check()?;

    let stage = Instant::now();
    let measured = measure_blocks(blocks, &request.geometry, shaper, &context.text_styles)?;
    let cards = paginate(measured, &request.geometry);
    log::debug!("layout: {} cards in {:?}", cards.len(), stage.elapsed());
    cancel.check()?;

    let stage = Instant::now();
    let images = ImageCache::new();
    let raster_ctx = RasterContext {
        geometry: request.geometry,
        device_pixel_ratio: request.device_pixel_ratio,
        shaper,
        text_styles: &context.text_styles,
        assets,
        images: &images,
    };
    let channels = &context.channels;
    let (rendered, defaults) = rayon::join(
        || {
            cards
                .par_iter()
                .map(|card| {
                    let buffers = channels
                        .channels
                        .par_iter()
                        .map(|style| {
                            cancel.check()?;
                            rasterize_card(card, style, &raster_ctx)
                                .map(|buffer| (style.name.clone(), buffer))
                        })
                        .collect::<Result<BTreeMap<_, _>>>()?;
                    Ok(RenderedCard {
                        index: card.index,
                        channels: buffers,
                    })
                })
                .collect::<Result<Vec<_>>>()
        },
        || {
            channels
                .shared
                .par_iter()
                .map(|style| {
                    cancel.check()?;
                    rasterize_defaults(style, &raster_ctx).map(|buffer| (style.name.clone(), buffer))
                })
                .collect::<Result<BTreeMap<_, _>>>()
        },
    );
    let result = PipelineResult {
        cards: rendered?,
        default_channels: defaults?,
    };
    log::debug!(
        "raster: {} cards x {} channels + {} shared in {:?} (total {:?})",
        result.cards.len(),
        channels.channels.len(),
        result.default_channels.len(),
        stage.elapsed(),
        started.elapsed()
    );
    Ok(result)
}

/// Fails when a text role used by the document has no drawable face.
fn require_faces(blocks: &[Block], shaper: &dyn TextShaper, styles: &TextStyles) -> Result<()> {
    let mut checked: Vec<TextRole> = Vec::new();
    for (role, _) in blocks.iter().filter_map(Block::text) {
        if checked.contains(&role) {
            continue;
        }
        checked.push(role);
        let style = styles.get(role);
        if !shaper.has_face(&style.font()) {
            return Err(CardPressError::asset(
                &style.font_family,
                format!("no registered font face for {role:?} text"),
            ));
        }
    }
    Ok(())
}
