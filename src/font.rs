use crate::error::{CardPressError, Result};
use crate::text::{FontSpec, TextShaper};
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tiny_skia::{Path as SkPath, PathBuilder};
use ttf_parser::{GlyphId, OutlineBuilder};

const FALLBACK_ADVANCE_EM: f32 = 0.6;
const FALLBACK_ASCENT_EM: f32 = 0.8;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, f32>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<f32> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: f32) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

/// Font faces available to the measurement and draw passes.
///
/// Families that resolve to nothing measure with a fixed advance of
/// `0.6 × font size` per character and have no outlines; `has_face` reports
/// them so the pipeline can refuse to render text it cannot draw.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, Vec<usize>>,
    text_width_cache: Mutex<TextWidthCache>,
    warned_families: Mutex<HashSet<String>>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) weight: u16,
    pub(crate) units_per_em: f32,
    pub(crate) ascent: f32,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
            warned_families: Mutex::new(HashSet::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Registers every `.ttf`/`.otf` file directly inside `path`.
    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            log::warn!("font directory {} is not readable", path.display());
            return 0;
        };
        let mut registered = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_supported_font_path(&path) && self.register_file(&path).is_ok() {
                registered += 1;
            }
        }
        registered
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|err| CardPressError::asset(path.display().to_string(), err.to_string()))?;
        let source = path.display().to_string();
        self.register_bytes(data, Some(&source), None)
    }

    /// Registers raw font data. `alias` adds an extra family name the style
    /// table can refer to (e.g. `"Heading Font"`).
    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
        alias: Option<&str>,
    ) -> Result<String> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(CardPressError::asset(source, "invalid font data"));
        };

        let (name, aliases) = font_names(&face, Path::new(source));
        let units_per_em = face.units_per_em().max(1) as f32;
        let weight = face.weight().to_number();
        let ascent = face.ascender() as f32;
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            weight,
            units_per_em,
            ascent,
        });

        let mut all_aliases = Vec::new();
        all_aliases.push(name.clone());
        all_aliases.extend(aliases);
        all_aliases.extend(alias.map(str::to_string));
        for alias in all_aliases {
            let key = normalize_name(&alias);
            if key.is_empty() {
                continue;
            }
            let entry = self.lookup.entry(key).or_default();
            if !entry.contains(&index) {
                entry.push(index);
            }
        }
        log::debug!("registered font '{name}' (weight {weight}) from {source}");
        Ok(name)
    }

    /// Picks the first family in a comma-separated list that has a registered
    /// face, preferring the face whose weight is closest to the request.
    /// Generic families (`sans-serif`, `serif`, ...) match any registered face.
    fn resolve_index(&self, font: &FontSpec) -> Option<usize> {
        for family in font_family_candidates(&font.family) {
            let key = normalize_name(&family);
            let best = match self.lookup.get(&key) {
                Some(indices) => self.nearest_weight(indices.iter().copied(), font.weight),
                None if is_generic_family(&key) => {
                    self.nearest_weight(0..self.fonts.len(), font.weight)
                }
                None => None,
            };
            if best.is_some() {
                return best;
            }
        }
        self.warn_unresolved(&font.family);
        None
    }

    fn nearest_weight(&self, indices: impl Iterator<Item = usize>, weight: u16) -> Option<usize> {
        indices.min_by_key(|index| (self.fonts[*index].weight as i32 - weight as i32).abs())
    }

    pub(crate) fn resolve(&self, font: &FontSpec) -> Option<&RegisteredFont> {
        self.resolve_index(font).and_then(|index| self.fonts.get(index))
    }

    fn warn_unresolved(&self, family: &str) {
        if let Ok(mut warned) = self.warned_families.lock() {
            if warned.insert(family.to_string()) {
                log::warn!(
                    "no registered font for '{family}', measuring with fixed advances"
                );
            }
        }
    }

    pub fn measure_text_width(&self, font: &FontSpec, text: &str) -> f32 {
        let Some(index) = self.resolve_index(font) else {
            return fallback_width(font.size, text);
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: (font.size as f64 * 1000.0).round() as i64,
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let value = shape_run(&self.fonts[index], font.size, text)
            .map(|glyphs| glyphs.iter().map(|g| g.advance).sum())
            .unwrap_or_else(|| fallback_width(font.size, text));
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }
}

impl TextShaper for FontRegistry {
    fn has_face(&self, font: &FontSpec) -> bool {
        self.resolve_index(font).is_some()
    }

    fn run_width(&self, font: &FontSpec, text: &str) -> f32 {
        self.measure_text_width(font, text)
    }

    fn ascent(&self, font: &FontSpec) -> f32 {
        match self.resolve(font) {
            Some(face) => face.ascent / face.units_per_em * font.size,
            None => font.size * FALLBACK_ASCENT_EM,
        }
    }

    fn outline_run(&self, font: &FontSpec, text: &str, x: f32, baseline: f32) -> Option<SkPath> {
        let registered = self.resolve(font)?;
        let face = ttf_parser::Face::parse(&registered.data, 0).ok()?;
        let glyphs = shape_run(registered, font.size, text)?;
        let scale = font.size / registered.units_per_em;

        let mut builder = PathBuilder::new();
        let mut pen_x = x;
        for glyph in glyphs {
            if glyph.glyph_id != 0 {
                let mut outline = GlyphPathBuilder {
                    builder: &mut builder,
                    origin_x: pen_x + glyph.x_offset,
                    origin_y: baseline - glyph.y_offset,
                    scale,
                };
                face.outline_glyph(GlyphId(glyph.glyph_id), &mut outline);
            }
            pen_x += glyph.advance;
        }
        builder.finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct ShapedGlyph {
    glyph_id: u16,
    advance: f32,
    x_offset: f32,
    y_offset: f32,
}

fn shape_run(font: &RegisteredFont, font_size: f32, text: &str) -> Option<Vec<ShapedGlyph>> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let units = font.units_per_em;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(rustybuzz::Direction::LeftToRight);
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.len() != positions.len() {
        return None;
    }
    Some(
        infos
            .iter()
            .zip(positions.iter())
            .map(|(info, pos)| ShapedGlyph {
                glyph_id: info.glyph_id as u16,
                advance: pos.x_advance as f32 / units * font_size,
                x_offset: pos.x_offset as f32 / units * font_size,
                y_offset: pos.y_offset as f32 / units * font_size,
            })
            .collect(),
    )
}

fn fallback_width(font_size: f32, text: &str) -> f32 {
    font_size * FALLBACK_ADVANCE_EM * text.chars().count() as f32
}

/// Writes glyph outlines (font units, y-up) into a y-down path at a pen origin.
struct GlyphPathBuilder<'a> {
    builder: &'a mut PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder<'_> {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| family.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let mut aliases = Vec::new();
    for candidate in [family, full, post, stem].into_iter().flatten() {
        if candidate != primary {
            aliases.push(candidate);
        }
    }

    (primary, aliases)
}

pub(crate) fn font_family_candidates(font_family: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in font_family.split(',') {
        let family = part.trim().trim_matches('"').trim_matches('\'').trim();
        if !family.is_empty() {
            out.push(family.to_string());
        }
    }
    out
}

pub fn is_supported_font_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf")
}

fn is_generic_family(name: &str) -> bool {
    matches!(
        name,
        "sans-serif" | "serif" | "monospace" | "system-ui" | "ui-sans-serif" | "ui-serif"
    )
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(family: &str, size: f32) -> FontSpec {
        FontSpec {
            family: family.to_string(),
            size,
            weight: 400,
        }
    }

    #[test]
    fn unresolved_family_uses_fixed_advance() {
        let registry = FontRegistry::new();
        let width = registry.measure_text_width(&spec("Body Font, sans-serif", 10.0), "abcd");
        assert!((width - 24.0).abs() < 1e-4);
        assert!((registry.ascent(&spec("Body Font", 10.0)) - 8.0).abs() < 1e-4);
    }

    #[test]
    fn generic_family_needs_at_least_one_face() {
        let registry = FontRegistry::new();
        assert!(!registry.has_face(&spec("Heading Font, sans-serif", 18.0)));
    }

    #[test]
    fn unresolved_family_draws_nothing() {
        let registry = FontRegistry::new();
        assert!(
            registry
                .outline_run(&spec("Body Font", 16.0), "hello", 0.0, 12.0)
                .is_none()
        );
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_bytes(vec![0, 1, 2, 3], Some("broken.ttf"), Some("Heading Font"))
            .unwrap_err();
        assert!(matches!(err, CardPressError::AssetLoad { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn family_candidates_split_css_lists() {
        assert_eq!(
            font_family_candidates("'Heading Font', sans-serif"),
            vec!["Heading Font".to_string(), "sans-serif".to_string()]
        );
    }

    #[test]
    fn missing_font_dir_registers_nothing() {
        let mut registry = FontRegistry::new();
        assert_eq!(registry.register_dir("/definitely/not/a/font/dir"), 0);
    }
}
