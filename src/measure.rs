use crate::document::Block;
use crate::error::{CardPressError, Result};
use crate::text::{TextLayout, TextShaper, TextStyles, layout_text};
use crate::types::{PageGeometry, Rect};

/// A block with its size on the card. `rect.x`/`rect.y` stay at the local
/// origin until the paginator places the block.
#[derive(Debug, Clone)]
pub struct MeasuredBlock {
    pub block: Block,
    pub rect: Rect,
    /// Wrapped lines for text blocks, reused by the draw pass.
    pub layout: Option<TextLayout>,
}

impl MeasuredBlock {
    pub fn height(&self) -> f32 {
        self.rect.height
    }
}

pub fn measure_block(
    block: Block,
    geometry: &PageGeometry,
    shaper: &dyn TextShaper,
    styles: &TextStyles,
) -> Result<MeasuredBlock> {
    let geometry = if block.is_cover() {
        geometry.without_padding()
    } else {
        *geometry
    };
    geometry.validate()?;
    let content = geometry.content_size();

    if let Some((role, text)) = block.text() {
        let layout = layout_text(shaper, text, styles.get(role), content.width);
        let rect = Rect {
            x: 0.0,
            y: 0.0,
            width: content.width,
            height: layout.height(),
        };
        return Ok(MeasuredBlock {
            block,
            rect,
            layout: Some(layout),
        });
    }

    let reference = block
        .images()
        .and_then(|images| images.reference())
        .ok_or_else(|| CardPressError::Measurement("image block has no variants".to_string()))?;
    let (img_w, img_h) = (reference.width() as f32, reference.height() as f32);
    if img_w <= 0.0 || img_h <= 0.0 {
        return Err(CardPressError::Measurement(format!(
            "image '{}' has zero size",
            reference.source
        )));
    }
    let ratio = (content.width / img_w).min(content.height / img_h);
    let rect = Rect {
        x: 0.0,
        y: 0.0,
        width: img_w * ratio,
        height: img_h * ratio,
    };
    Ok(MeasuredBlock {
        block,
        rect,
        layout: None,
    })
}

pub fn measure_blocks(
    blocks: Vec<Block>,
    geometry: &PageGeometry,
    shaper: &dyn TextShaper,
    styles: &TextStyles,
) -> Result<Vec<MeasuredBlock>> {
    blocks
        .into_iter()
        .map(|block| measure_block(block, geometry, shaper, styles))
        .collect()
}
