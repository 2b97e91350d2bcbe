use crate::document::Block;
use crate::measure::MeasuredBlock;
use crate::types::PageGeometry;

/// One page of the deck. `height` is the used content height with the
/// trailing gap removed.
#[derive(Debug, Clone)]
pub struct Card {
    pub index: usize,
    pub blocks: Vec<MeasuredBlock>,
    pub height: f32,
}

/// Packs measured blocks into cards in a single greedy pass.
///
/// Images, covers and level-1 headings always open a card. A level-2 heading
/// that fits is still moved to a fresh card when its successor would not
/// fit next to it, or when it is the last block. Blocks on each card are
/// centered vertically in the content box afterwards. Never fails; a block
/// taller than the content box sits alone on its card and overflows.
pub fn paginate(blocks: Vec<MeasuredBlock>, geometry: &PageGeometry) -> Vec<Card> {
    let usable_height = geometry.content_height();
    let gap = geometry.gap;
    let next_heights: Vec<Option<f32>> = blocks
        .iter()
        .skip(1)
        .map(|b| Some(b.height()))
        .chain(std::iter::once(None))
        .collect();

    let mut cards: Vec<Card> = Vec::new();
    for (mut item, next_height) in blocks.into_iter().zip(next_heights) {
        let card_height = cards.last().map_or(0.0, |card| card.height);
        let mut fits = card_height + item.height() <= usable_height;

        if item.block.forces_new_card() {
            fits = false;
        }

        if fits && matches!(item.block, Block::Heading2(_)) {
            let next_fits = next_height.is_some_and(|next| {
                card_height + item.height() + gap + next <= usable_height
            });
            if !next_fits {
                fits = false;
            }
        }

        let (x, y_offset) = if item.block.is_cover() {
            (0.0, 0.0)
        } else {
            (geometry.padding, geometry.padding)
        };
        item.rect.x = x;

        match cards.last_mut() {
            Some(card) if fits => {
                item.rect.y = y_offset + card.height;
                card.height += item.height() + gap;
                card.blocks.push(item);
            }
            _ => {
                item.rect.y = y_offset;
                cards.push(Card {
                    index: cards.len(),
                    height: item.height() + gap,
                    blocks: vec![item],
                });
            }
        }
    }

    for card in &mut cards {
        card.height -= gap;
        let offset = (usable_height - card.height) * 0.5;
        for block in &mut card.blocks {
            block.rect.y += offset;
        }
    }
    log::debug!("paginated into {} cards", cards.len());
    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    fn block(block: Block, height: f32) -> MeasuredBlock {
        MeasuredBlock {
            block,
            rect: Rect {
                x: 0.0,
                y: 0.0,
                width: 236.0,
                height,
            },
            layout: None,
        }
    }

    fn h1(height: f32) -> MeasuredBlock {
        block(Block::Heading1("Title".to_string()), height)
    }

    fn h2(height: f32) -> MeasuredBlock {
        block(Block::Heading2("Sub".to_string()), height)
    }

    fn p(height: f32) -> MeasuredBlock {
        block(Block::Paragraph("Body".to_string()), height)
    }

    fn kinds(card: &Card) -> Vec<&'static str> {
        card.blocks.iter().map(|b| b.block.kind()).collect()
    }

    #[test]
    fn heading_and_body_share_a_card() {
        let cards = paginate(vec![h1(45.0), p(26.0)], &PageGeometry::default());
        assert_eq!(cards.len(), 1);
        assert_eq!(kinds(&cards[0]), vec!["h1", "p"]);
        assert_eq!(cards[0].height, 45.0 + 24.0 + 26.0);
    }

    #[test]
    fn level_one_headings_always_open_a_card() {
        let cards = paginate(vec![p(10.0), h1(45.0), h1(45.0)], &PageGeometry::default());
        assert_eq!(cards.len(), 3);
        for card in &cards {
            assert_eq!(card.blocks.len(), 1);
        }
        assert_eq!(cards[2].index, 2);
    }

    #[test]
    fn subheading_moves_with_a_body_that_would_not_fit() {
        // usable height 356: 200 + 24 + 26 fits, but + 24 + 200 does not.
        let cards = paginate(vec![h1(200.0), h2(26.0), p(200.0)], &PageGeometry::default());
        assert_eq!(cards.len(), 2);
        assert_eq!(kinds(&cards[0]), vec!["h1"]);
        assert_eq!(kinds(&cards[1]), vec!["h2", "p"]);
    }

    #[test]
    fn trailing_subheading_opens_a_card() {
        let cards = paginate(vec![p(20.0), h2(26.0)], &PageGeometry::default());
        assert_eq!(cards.len(), 2);
        assert_eq!(kinds(&cards[1]), vec!["h2"]);
    }

    #[test]
    fn leading_subheading_uses_zero_card_height() {
        let cards = paginate(vec![h2(26.0), p(26.0)], &PageGeometry::default());
        assert_eq!(cards.len(), 1);
        assert_eq!(kinds(&cards[0]), vec!["h2", "p"]);
    }

    #[test]
    fn overflowing_paragraphs_spill_onto_new_cards() {
        let cards = paginate(vec![p(200.0), p(200.0), p(500.0)], &PageGeometry::default());
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[2].height, 500.0);
        // Over-tall block is centered with a negative offset.
        assert_eq!(cards[2].blocks[0].rect.y, 32.0 + (356.0 - 500.0) / 2.0);
    }

    #[test]
    fn blocks_are_centered_in_the_content_box() {
        let geometry = PageGeometry::default();
        let cards = paginate(vec![h1(44.0), p(100.0)], &geometry);
        let card = &cards[0];
        let top = card.blocks[0].rect.y;
        let bottom = card.blocks.last().unwrap().rect.bottom();
        let mid = (top + bottom) / 2.0 - geometry.padding;
        assert!((mid - geometry.content_height() / 2.0).abs() < 0.5);
        assert_eq!(card.blocks[1].rect.y - top, 44.0 + 24.0);
        assert_eq!(card.blocks[0].rect.x, 32.0);
    }

    #[test]
    fn covers_sit_at_the_page_origin() {
        use crate::assets::ImageAsset;
        use crate::document::ImageVariants;
        use std::sync::Arc;

        let mut images = ImageVariants::new("cover");
        let pixmap = tiny_skia::Pixmap::new(4, 4).unwrap();
        images.insert("diffuse", Arc::new(ImageAsset::from_pixmap("c.png", pixmap)));
        let cards = paginate(
            vec![p(20.0), block(Block::Cover(images), 300.0), p(20.0)],
            &PageGeometry::default(),
        );
        assert_eq!(cards.len(), 2);
        assert_eq!(kinds(&cards[1]), vec!["cover", "p"]);
        assert_eq!(cards[1].blocks[0].rect.x, 0.0);
    }

    #[test]
    fn no_blocks_no_cards() {
        assert!(paginate(Vec::new(), &PageGeometry::default()).is_empty());
    }
}
