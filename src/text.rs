use crate::types::Size;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which entry of the style table a text block uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextRole {
    H1,
    H2,
    P,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Font selection handed to a [`TextShaper`].
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    /// Comma-separated family list, first registered family wins.
    pub family: String,
    pub size: f32,
    pub weight: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f32,
    /// Multiplier applied to `font_size`.
    pub line_height: f32,
    pub font_weight: u16,
    #[serde(default)]
    pub align: TextAlign,
}

impl TextStyle {
    pub fn line_height_px(&self) -> f32 {
        self.font_size * self.line_height
    }

    pub fn font(&self) -> FontSpec {
        FontSpec {
            family: self.font_family.clone(),
            size: self.font_size,
            weight: self.font_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyles {
    pub h1: TextStyle,
    pub h2: TextStyle,
    pub p: TextStyle,
}

impl Default for TextStyles {
    fn default() -> Self {
        let heading = |font_size| TextStyle {
            font_family: "Heading Font, sans-serif".to_string(),
            font_size,
            line_height: 1.4,
            font_weight: 700,
            align: TextAlign::Center,
        };
        Self {
            h1: heading(32.0),
            h2: heading(18.0),
            p: TextStyle {
                font_family: "Body Font, sans-serif".to_string(),
                font_size: 16.0,
                line_height: 1.6,
                font_weight: 400,
                align: TextAlign::Left,
            },
        }
    }
}

impl TextStyles {
    pub fn get(&self, role: TextRole) -> &TextStyle {
        match role {
            TextRole::H1 => &self.h1,
            TextRole::H2 => &self.h2,
            TextRole::P => &self.p,
        }
    }
}

/// Width measurement and glyph outlines for styled runs.
///
/// Layout only needs `run_width`; the draw pass uses `ascent` and
/// `outline_run` to place glyphs on the first-line baseline.
pub trait TextShaper: Send + Sync {
    /// Whether `font` resolves to a face that can be drawn.
    fn has_face(&self, font: &FontSpec) -> bool;

    fn run_width(&self, font: &FontSpec, text: &str) -> f32;

    fn ascent(&self, font: &FontSpec) -> f32;

    /// Glyph outlines for `text` starting at `(x, baseline)` in y-down page
    /// coordinates, or `None` when nothing can be drawn.
    fn outline_run(&self, font: &FontSpec, text: &str, x: f32, baseline: f32)
    -> Option<tiny_skia::Path>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineLayout {
    pub text: String,
    pub width: f32,
}

/// Wrapped lines of one text block. Shared between measurement and drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<LineLayout>,
    pub max_width: f32,
    pub line_height: f32,
}

impl TextLayout {
    /// Block height, rounded up to a whole pixel.
    pub fn height(&self) -> f32 {
        (self.lines.len() as f32 * self.line_height).ceil()
    }

    /// Horizontal offset of a line inside the block for the given alignment.
    pub fn line_offset(&self, line: &LineLayout, align: TextAlign) -> f32 {
        match align {
            TextAlign::Left => 0.0,
            TextAlign::Center => (self.max_width - line.width) / 2.0,
            TextAlign::Right => self.max_width - line.width,
        }
    }
}

/// Greedy word wrap. Words wider than `max_width` are broken by character.
pub fn layout_text(
    shaper: &dyn TextShaper,
    text: &str,
    style: &TextStyle,
    max_width: f32,
) -> TextLayout {
    let font = style.font();
    let max_width = max_width.max(1.0);
    let space_width = shaper.run_width(&font, " ");
    let mut word_widths: HashMap<&str, f32> = HashMap::new();
    let mut lines: Vec<String> = Vec::new();

    for segment in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0.0;
        for word in segment.split_whitespace() {
            let word_width = *word_widths
                .entry(word)
                .or_insert_with(|| shaper.run_width(&font, word));
            if !current.is_empty() {
                let next_width = current_width + space_width + word_width;
                if next_width <= max_width {
                    current.push(' ');
                    current.push_str(word);
                    current_width = next_width;
                    continue;
                }
                lines.push(std::mem::take(&mut current));
            }
            if word_width > max_width {
                let mut parts = split_long_word(shaper, &font, word, max_width);
                // The tail of a broken word can still take following words.
                if let Some(last) = parts.pop() {
                    lines.extend(parts);
                    current_width = shaper.run_width(&font, &last);
                    current = last;
                }
            } else {
                current.push_str(word);
                current_width = word_width;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    let lines = lines
        .into_iter()
        .map(|text| LineLayout {
            width: shaper.run_width(&font, &text),
            text,
        })
        .collect();
    TextLayout {
        lines,
        max_width,
        line_height: style.line_height_px(),
    }
}

/// Size of a wrapped text block: full available width, rounded-up height.
pub fn measure_text(
    shaper: &dyn TextShaper,
    text: &str,
    style: &TextStyle,
    max_width: f32,
) -> Size {
    let layout = layout_text(shaper, text, style, max_width);
    Size::new(max_width, layout.height())
}

fn split_long_word(
    shaper: &dyn TextShaper,
    font: &FontSpec,
    word: &str,
    max_width: f32,
) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;
    let mut char_widths: HashMap<char, f32> = HashMap::new();
    let mut buf = [0u8; 4];
    for ch in word.chars() {
        let w = *char_widths
            .entry(ch)
            .or_insert_with(|| shaper.run_width(font, ch.encode_utf8(&mut buf)));
        let mut next_width = current_width + w;
        if !current.is_empty() && next_width > max_width {
            parts.push(std::mem::take(&mut current));
            next_width = w;
        }
        current.push(ch);
        current_width = next_width;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Fixed-advance shaper: every char is `advance × font size` wide.
    pub(crate) struct MonoShaper {
        pub(crate) advance: f32,
    }

    impl Default for MonoShaper {
        fn default() -> Self {
            Self { advance: 0.6 }
        }
    }

    impl TextShaper for MonoShaper {
        fn has_face(&self, _font: &FontSpec) -> bool {
            true
        }

        fn run_width(&self, font: &FontSpec, text: &str) -> f32 {
            text.chars().count() as f32 * font.size * self.advance
        }

        fn ascent(&self, font: &FontSpec) -> f32 {
            font.size * 0.8
        }

        fn outline_run(
            &self,
            font: &FontSpec,
            text: &str,
            x: f32,
            baseline: f32,
        ) -> Option<tiny_skia::Path> {
            let width = self.run_width(font, text);
            let rect = tiny_skia::Rect::from_xywh(x, baseline - font.size * 0.7, width, font.size * 0.7)?;
            Some(tiny_skia::PathBuilder::from_rect(rect))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MonoShaper;
    use super::*;

    fn style(font_size: f32) -> TextStyle {
        TextStyle {
            font_family: "Body Font".to_string(),
            font_size,
            line_height: 1.5,
            font_weight: 400,
            align: TextAlign::Left,
        }
    }

    fn texts(layout: &TextLayout) -> Vec<&str> {
        layout.lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn wraps_at_word_boundaries() {
        // 10px font, 6px per char; 60px fits 10 chars.
        let layout = layout_text(&MonoShaper::default(), "aaa bbb ccc ddd", &style(10.0), 60.0);
        assert_eq!(texts(&layout), vec!["aaa bbb", "ccc ddd"]);
        assert_eq!(layout.lines[0].width, 42.0);
        assert_eq!(layout.height(), 30.0);
    }

    #[test]
    fn long_words_break_by_character() {
        let layout = layout_text(&MonoShaper::default(), "abcdefghijklmn xy", &style(10.0), 36.0);
        assert_eq!(texts(&layout), vec!["abcdef", "ghijkl", "mn xy"]);
    }

    #[test]
    fn height_rounds_up_to_whole_pixels() {
        let mut s = style(16.0);
        s.line_height = 1.6;
        let size = measure_text(&MonoShaper::default(), "one two three", &s, 1000.0);
        assert_eq!(size.height, 26.0);
        assert_eq!(size.width, 1000.0);
    }

    #[test]
    fn empty_text_has_no_lines() {
        let layout = layout_text(&MonoShaper::default(), "   ", &style(10.0), 100.0);
        assert!(layout.lines.is_empty());
        assert_eq!(layout.height(), 0.0);
    }

    #[test]
    fn centered_lines_are_offset_by_half_the_slack() {
        let layout = layout_text(&MonoShaper::default(), "ab", &style(10.0), 100.0);
        let offset = layout.line_offset(&layout.lines[0], TextAlign::Center);
        assert_eq!(offset, 44.0);
    }

    #[test]
    fn default_style_table_matches_card_typography() {
        let styles = TextStyles::default();
        assert_eq!(styles.get(TextRole::H1).font_size, 32.0);
        assert_eq!(styles.get(TextRole::H2).align, TextAlign::Center);
        assert_eq!(styles.get(TextRole::P).line_height, 1.6);
        assert_eq!(styles.get(TextRole::P).font_weight, 400);
    }
}
