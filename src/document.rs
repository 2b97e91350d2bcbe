use crate::assets::{AssetSource, ImageAsset, fetch_text, load_image};
use crate::error::{CardPressError, Result};
use crate::text::TextRole;
use rayon::prelude::*;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static IMAGE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[(.*)\]\((.*)\)").expect("image directive pattern is valid")
});

/// Named renditions of one logical image, in directive order.
#[derive(Debug, Clone)]
pub struct ImageVariants {
    pub alt: String,
    variants: Vec<(String, Arc<ImageAsset>)>,
}

impl ImageVariants {
    pub fn new(alt: impl Into<String>) -> Self {
        Self {
            alt: alt.into(),
            variants: Vec::new(),
        }
    }

    /// Adds a variant; a repeated name replaces the earlier image in place.
    pub fn insert(&mut self, name: impl Into<String>, image: Arc<ImageAsset>) {
        let name = name.into();
        match self.variants.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = image,
            None => self.variants.push((name, image)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ImageAsset>> {
        self.variants
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, image)| image)
    }

    /// The image used to size the block.
    pub fn reference(&self) -> Option<&Arc<ImageAsset>> {
        self.variants.first().map(|(_, image)| image)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Block {
    Heading1(String),
    Heading2(String),
    Paragraph(String),
    ImageSet(ImageVariants),
    Cover(ImageVariants),
}

impl Block {
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Heading1(_) => "h1",
            Block::Heading2(_) => "h2",
            Block::Paragraph(_) => "p",
            Block::ImageSet(_) => "img",
            Block::Cover(_) => "cover",
        }
    }

    pub fn text(&self) -> Option<(TextRole, &str)> {
        match self {
            Block::Heading1(text) => Some((TextRole::H1, text)),
            Block::Heading2(text) => Some((TextRole::H2, text)),
            Block::Paragraph(text) => Some((TextRole::P, text)),
            Block::ImageSet(_) | Block::Cover(_) => None,
        }
    }

    pub fn images(&self) -> Option<&ImageVariants> {
        match self {
            Block::ImageSet(images) | Block::Cover(images) => Some(images),
            _ => None,
        }
    }

    pub fn is_cover(&self) -> bool {
        matches!(self, Block::Cover(_))
    }

    /// Images, covers and top-level headings always open a card.
    pub fn forces_new_card(&self) -> bool {
        matches!(
            self,
            Block::ImageSet(_) | Block::Cover(_) | Block::Heading1(_)
        )
    }
}

/// Parses document text into blocks, loading every referenced image.
///
/// Lines are handled in parallel; the output keeps source order. Any
/// malformed directive or failed asset aborts the whole parse.
pub fn parse_document(text: &str, source: &dyn AssetSource) -> Result<Vec<Block>> {
    let lines: Vec<(usize, &str)> = text
        .split('\n')
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .collect();

    let parsed: Vec<Result<Option<Block>>> = lines
        .par_iter()
        .map(|(line_no, line)| parse_line(*line_no, line, source))
        .collect();

    let mut blocks = Vec::with_capacity(parsed.len());
    for block in parsed {
        if let Some(block) = block? {
            blocks.push(block);
        }
    }
    log::debug!("parsed {} blocks from {} lines", blocks.len(), lines.len());
    Ok(blocks)
}

/// Reads document text through the asset source.
pub fn load_markdown(source: &dyn AssetSource, path: &str) -> Result<String> {
    fetch_text(source, path)
}

fn parse_line(line_no: usize, line: &str, source: &dyn AssetSource) -> Result<Option<Block>> {
    if let Some(rest) = line.strip_prefix("## ") {
        return Ok(Some(Block::Heading2(rest.to_string())));
    }
    if let Some(rest) = line.strip_prefix("# ") {
        return Ok(Some(Block::Heading1(rest.to_string())));
    }
    if line.starts_with("![") {
        return parse_image_directive(line_no, line, source).map(Some);
    }
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(Block::Paragraph(line.to_string())))
}

fn parse_image_directive(line_no: usize, line: &str, source: &dyn AssetSource) -> Result<Block> {
    let captures = IMAGE_DIRECTIVE
        .captures(line)
        .ok_or_else(|| CardPressError::Parse {
            line: line_no,
            message: format!("malformed image directive '{line}'"),
        })?;
    let alt = captures.get(1).map_or("", |m| m.as_str());
    let srcs: Vec<&str> = captures
        .get(2)
        .map_or("", |m| m.as_str())
        .split(',')
        .map(str::trim)
        .collect();
    if srcs.iter().any(|src| src.is_empty()) {
        return Err(CardPressError::Parse {
            line: line_no,
            message: "image directive has an empty source".to_string(),
        });
    }

    let loaded: Vec<Result<(String, Arc<ImageAsset>)>> = srcs
        .par_iter()
        .map(|src| load_image(source, src).map(|image| (variant_name(src), image)))
        .collect();

    let mut images = ImageVariants::new(alt);
    for entry in loaded {
        let (name, image) = entry?;
        images.insert(name, image);
    }

    if alt.eq_ignore_ascii_case("cover") {
        Ok(Block::Cover(images))
    } else {
        Ok(Block::ImageSet(images))
    }
}

/// Variant key for an image source: extension dropped, last dot-separated
/// segment camel-cased (`card.specular-color.png` → `specularColor`).
pub fn variant_name(src: &str) -> String {
    let stem = src.rsplit_once('.').map_or(src, |(stem, _)| stem);
    let segment = stem.rsplit('.').next().unwrap_or(stem);
    camel_case(segment)
}

fn camel_case(raw: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in raw.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut out = String::new();
    for (index, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
