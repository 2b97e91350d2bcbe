use crate::assets::ImageAsset;
use crate::measure::MeasuredBlock;
use crate::raster::ChannelStyle;
use crate::text::{FontSpec, TextShaper, TextStyles};
use crate::types::{Color, Rect, Size};
use std::sync::Arc;

/// Draw operations in page-local CSS pixels, y pointing down. The raster
/// pass owns the device transform.
#[derive(Debug, Clone)]
pub enum Command {
    FillBackground(Color),
    /// Repeats `image` from the page origin until the page is covered.
    TileImage {
        image: Arc<ImageAsset>,
        tile_width: f32,
        tile_height: f32,
    },
    DrawImage {
        image: Arc<ImageAsset>,
        rect: Rect,
        opacity: f32,
    },
    DrawText {
        text: String,
        x: f32,
        baseline: f32,
        font: FontSpec,
        color: Color,
    },
}

/// Upper bound on background tiles along either page axis.
pub const MAX_TILES_PER_AXIS: f32 = 256.0;

/// Command recorder for one card in one channel.
#[derive(Debug, Clone)]
pub struct Canvas {
    page_size: Size,
    commands: Vec<Command>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn fill_background(&mut self, color: Color) {
        self.commands.push(Command::FillBackground(color));
    }

    /// Tiles smaller than `1 / MAX_TILES_PER_AXIS` of the page are grown to
    /// that size.
    pub fn tile_image(&mut self, image: Arc<ImageAsset>, tile_width: f32, tile_height: f32) {
        if !(tile_width > 0.0 && tile_height > 0.0) || !tile_width.is_finite() || !tile_height.is_finite() {
            log::warn!(
                "skipping background tile for {} with size {tile_width}x{tile_height}",
                image.source
            );
            return;
        }
        let min_width = self.page_size.width / MAX_TILES_PER_AXIS;
        let min_height = self.page_size.height / MAX_TILES_PER_AXIS;
        if tile_width < min_width || tile_height < min_height {
            log::warn!(
                "background tile for {} is {tile_width}x{tile_height}, clamping to at most {MAX_TILES_PER_AXIS} tiles per axis",
                image.source
            );
        }
        let tile_width = tile_width.max(min_width);
        let tile_height = tile_height.max(min_height);
        self.commands.push(Command::TileImage {
            image,
            tile_width,
            tile_height,
        });
    }

    pub fn draw_image(&mut self, image: Arc<ImageAsset>, rect: Rect, opacity: f32) {
        self.commands.push(Command::DrawImage {
            image,
            rect,
            opacity: opacity.clamp(0.0, 1.0),
        });
    }

    pub fn draw_text(&mut self, text: impl Into<String>, x: f32, baseline: f32, font: FontSpec, color: Color) {
        self.commands.push(Command::DrawText {
            text: text.into(),
            x,
            baseline,
            font,
            color,
        });
    }

}

/// Tile size for a background texture: `repeat[0]` columns across the page,
/// `repeat[1]` rows down it, or rows sized by the texture's aspect ratio when
/// `repeat[1]` is zero.
pub fn tile_size(page: Size, repeat: [f32; 2], texture: &ImageAsset) -> (f32, f32) {
    let [repeat_x, repeat_y] = repeat;
    let width = page.width / repeat_x;
    let height = if repeat_y > 0.0 {
        page.height / repeat_y
    } else {
        width / texture.width() as f32 * texture.height() as f32
    };
    (width, height)
}

/// Records one card (or an empty page when `blocks` is empty) in the given
/// channel style.
pub fn record_card(
    blocks: &[MeasuredBlock],
    style: &ChannelStyle,
    background: Option<Arc<ImageAsset>>,
    page: Size,
    shaper: &dyn TextShaper,
    text_styles: &TextStyles,
) -> Canvas {
    let mut canvas = Canvas::new(page);
    canvas.fill_background(style.background_color);
    if let Some(texture) = background {
        let (tile_width, tile_height) = tile_size(page, style.background_repeat, &texture);
        canvas.tile_image(texture, tile_width, tile_height);
    }

    for item in blocks {
        if let Some(images) = item.block.images() {
            let Some(image) = images.get(&style.name) else {
                continue;
            };
            let rect = if item.block.is_cover() {
                Rect {
                    x: (page.width - item.rect.width) * 0.5,
                    y: (page.height - item.rect.height) * 0.5,
                    ..item.rect
                }
            } else {
                item.rect
            };
            canvas.draw_image(image.clone(), rect, style.opacity);
            continue;
        }

        let (Some((role, _)), Some(layout)) = (item.block.text(), item.layout.as_ref()) else {
            continue;
        };
        let text_style = text_styles.get(role);
        let font = text_style.font();
        let line_height = layout.line_height;
        let baseline_shift = (line_height - text_style.font_size) * 0.5 + shaper.ascent(&font);
        for (index, line) in layout.lines.iter().enumerate() {
            let x = item.rect.x + layout.line_offset(line, text_style.align);
            let baseline = item.rect.y + index as f32 * line_height + baseline_shift;
            canvas.draw_text(line.text.clone(), x, baseline, font.clone(), style.color);
        }
    }
    canvas
}
