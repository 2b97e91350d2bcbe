use crate::assets::{AssetSource, ImageAsset, ImageCache};
use crate::canvas::{Command, record_card};
use crate::error::{CardPressError, Result};
use crate::measure::MeasuredBlock;
use crate::paginate::Card;
use crate::text::{TextShaper, TextStyles};
use crate::types::{Color, PageGeometry, Rect};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tiny_skia::{FillRule, FilterQuality, Paint, Pixmap, PixmapPaint, Transform};

const MAX_RASTER_DIMENSION: u32 = 16_384;

/// How one texture channel paints a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStyle {
    /// Channel key; also the image variant drawn for image blocks.
    pub name: String,
    #[serde(default = "default_background_color")]
    pub background_color: Color,
    #[serde(default)]
    pub background_texture: Option<String>,
    #[serde(default = "default_repeat")]
    pub background_repeat: [f32; 2],
    #[serde(default = "default_color")]
    pub color: Color,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_background_color() -> Color {
    Color::BLACK
}

fn default_color() -> Color {
    Color::WHITE
}

fn default_repeat() -> [f32; 2] {
    [1.0, 1.0]
}

fn default_opacity() -> f32 {
    1.0
}

impl ChannelStyle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            background_color: default_background_color(),
            background_texture: None,
            background_repeat: default_repeat(),
            color: default_color(),
            opacity: default_opacity(),
        }
    }

    pub fn with_background_color(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_background_texture(mut self, src: impl Into<String>, repeat: [f32; 2]) -> Self {
        self.background_texture = Some(src.into());
        self.background_repeat = repeat;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CardPressError::InvalidConfiguration(
                "channel name must not be empty".to_string(),
            ));
        }
        if !self.opacity.is_finite() {
            return Err(CardPressError::InvalidConfiguration(format!(
                "channel '{}' has a non-finite opacity",
                self.name
            )));
        }
        let [repeat_x, repeat_y] = self.background_repeat;
        if self.background_texture.is_some()
            && !(repeat_x > 0.0 && repeat_x.is_finite() && repeat_y >= 0.0 && repeat_y.is_finite())
        {
            return Err(CardPressError::InvalidConfiguration(format!(
                "channel '{}' has an invalid texture repeat {:?}",
                self.name, self.background_repeat
            )));
        }
        Ok(())
    }
}

/// Per-card channels plus the shared channels rendered once per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSet {
    pub channels: Vec<ChannelStyle>,
    pub shared: Vec<ChannelStyle>,
}

impl Default for ChannelSet {
    /// Diffuse and specular channels without background textures.
    fn default() -> Self {
        Self {
            channels: vec![
                ChannelStyle::new("diffuse")
                    .with_background_color(Color::rgb8(0x08, 0x08, 0x18))
                    .with_color(Color::rgb8(0x32, 0x32, 0x32))
                    .with_opacity(0.2),
                ChannelStyle::new("specularColor"),
            ],
            shared: Vec::new(),
        }
    }
}

impl ChannelSet {
    /// The paper material: textured diffuse and specular channels and a
    /// shared tiled normal map.
    pub fn paper() -> Self {
        let mut set = Self::default();
        set.channels[0].background_texture = Some("/diffuse.jpg".to_string());
        set.channels[1].background_texture = Some("/specularColor.jpg".to_string());
        set.shared
            .push(ChannelStyle::new("normal").with_background_texture("/paper-normal.jpg", [6.0, 0.0]));
        set
    }

    pub fn validate(&self) -> Result<()> {
        for (group, styles) in [("channel", &self.channels), ("shared channel", &self.shared)] {
            let mut seen = HashSet::new();
            for style in styles {
                style.validate()?;
                if !seen.insert(style.name.as_str()) {
                    return Err(CardPressError::InvalidConfiguration(format!(
                        "duplicate {group} '{}'",
                        style.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One channel render, premultiplied RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    channel: String,
    pixmap: Pixmap,
}

impl RasterBuffer {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Unpremultiplied pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let color = self.pixmap.pixel(x, y)?.demultiply();
        Some([color.red(), color.green(), color.blue(), color.alpha()])
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| CardPressError::asset(&self.channel, format!("png encode failed: {e}")))
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            image::Rgba(self.pixel(x, y).unwrap_or([0, 0, 0, 0]))
        })
    }
}

/// Everything a channel render reads. Shared read-only across workers.
#[derive(Clone, Copy)]
pub struct RasterContext<'a> {
    pub geometry: PageGeometry,
    pub device_pixel_ratio: f32,
    pub shaper: &'a dyn TextShaper,
    pub text_styles: &'a TextStyles,
    pub assets: &'a dyn AssetSource,
    pub images: &'a ImageCache,
}

impl RasterContext<'_> {
    fn surface_size(&self) -> Result<(u32, u32)> {
        let dpr = self.device_pixel_ratio;
        if !(dpr.is_finite() && dpr > 0.0) {
            return Err(CardPressError::InvalidConfiguration(format!(
                "device pixel ratio must be positive, got {dpr}"
            )));
        }
        let to_px = |v: f32| -> Result<u32> {
            let px = (v * dpr).ceil();
            if !(px >= 1.0 && px <= MAX_RASTER_DIMENSION as f32) {
                return Err(CardPressError::InvalidConfiguration(format!(
                    "raster size {px} px is out of range (page {}x{} at {dpr}x)",
                    self.geometry.width, self.geometry.height
                )));
            }
            Ok(px as u32)
        };
        Ok((to_px(self.geometry.width)?, to_px(self.geometry.height)?))
    }

    fn background(&self, style: &ChannelStyle) -> Result<Option<Arc<ImageAsset>>> {
        style
            .background_texture
            .as_deref()
            .map(|src| self.images.load(self.assets, src))
            .transpose()
    }
}

pub fn rasterize_card(card: &Card, style: &ChannelStyle, ctx: &RasterContext<'_>) -> Result<RasterBuffer> {
    rasterize_blocks(&card.blocks, style, ctx)
}

/// Renders a shared channel with no content, only its background.
pub fn rasterize_defaults(style: &ChannelStyle, ctx: &RasterContext<'_>) -> Result<RasterBuffer> {
    rasterize_blocks(&[], style, ctx)
}

fn rasterize_blocks(
    blocks: &[MeasuredBlock],
    style: &ChannelStyle,
    ctx: &RasterContext<'_>,
) -> Result<RasterBuffer> {
    let (width_px, height_px) = ctx.surface_size()?;
    let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
        CardPressError::InvalidConfiguration(format!("invalid raster size {width_px}x{height_px}"))
    })?;
    let canvas = record_card(
        blocks,
        style,
        ctx.background(style)?,
        ctx.geometry.page_size(),
        ctx.shaper,
        ctx.text_styles,
    );

    let dpr = ctx.device_pixel_ratio;
    // Rows are stored bottom-up so the buffer uploads upright as a GL texture.
    let base_transform = Transform::from_row(dpr, 0.0, 0.0, -dpr, 0.0, ctx.geometry.height * dpr);
    render_commands(&mut pixmap, canvas.commands(), base_transform, ctx);

    Ok(RasterBuffer {
        channel: style.name.clone(),
        pixmap,
    })
}

fn render_commands(
    pixmap: &mut Pixmap,
    commands: &[Command],
    base_transform: Transform,
    ctx: &RasterContext<'_>,
) {
    let page = ctx.geometry.page_size();
    for cmd in commands {
        match cmd {
            Command::FillBackground(color) => pixmap.fill(to_sk_color(*color, 1.0)),
            Command::TileImage {
                image,
                tile_width,
                tile_height,
            } => {
                let mut y = 0.0;
                while y < page.height {
                    let mut x = 0.0;
                    while x < page.width {
                        let rect = Rect {
                            x,
                            y,
                            width: *tile_width,
                            height: *tile_height,
                        };
                        draw_image(pixmap, image, rect, 1.0, base_transform);
                        x += tile_width;
                    }
                    y += tile_height;
                }
            }
            Command::DrawImage {
                image,
                rect,
                opacity,
            } => draw_image(pixmap, image, *rect, *opacity, base_transform),
            Command::DrawText {
                text,
                x,
                baseline,
                font,
                color,
            } => {
                if let Some(path) = ctx.shaper.outline_run(font, text, *x, *baseline) {
                    pixmap.fill_path(
                        &path,
                        &fill_paint(*color, 1.0),
                        FillRule::Winding,
                        base_transform,
                        None,
                    );
                }
            }
        }
    }
}

fn draw_image(pixmap: &mut Pixmap, image: &ImageAsset, rect: Rect, opacity: f32, base_transform: Transform) {
    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    if src_w <= 0.0 || src_h <= 0.0 || opacity <= 0.0 {
        return;
    }
    let image_ts = Transform::from_row(
        rect.width / src_w,
        0.0,
        0.0,
        rect.height / src_h,
        rect.x,
        rect.y,
    );
    let mut paint = PixmapPaint::default();
    paint.quality = FilterQuality::Bilinear;
    paint.opacity = opacity.clamp(0.0, 1.0);
    pixmap.draw_pixmap(
        0,
        0,
        image.pixmap().as_ref(),
        &paint,
        base_transform.pre_concat(image_ts),
        None,
    );
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = opacity.clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}
