use crate::error::{CardPressError, Result};
use serde::{Deserialize, Serialize};

/// Fixed card geometry in CSS pixels.
///
/// `gap` is only consumed by the paginator; the measurer works against the
/// content box (`width`/`height` minus padding on both sides).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    pub gap: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 420.0,
            padding: 32.0,
            gap: 24.0,
        }
    }
}

impl PageGeometry {
    pub fn content_width(&self) -> f32 {
        self.width - self.padding * 2.0
    }

    pub fn content_height(&self) -> f32 {
        self.height - self.padding * 2.0
    }

    pub fn content_size(&self) -> Size {
        Size {
            width: self.content_width(),
            height: self.content_height(),
        }
    }

    pub fn page_size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    /// Same page with padding removed, used for blocks that bleed to the edge.
    pub fn without_padding(&self) -> Self {
        Self {
            padding: 0.0,
            ..*self
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.width, self.height, self.padding, self.gap];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CardPressError::Measurement(format!(
                "page geometry must be finite, got {self:?}"
            )));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(CardPressError::Measurement(format!(
                "page size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.padding < 0.0 || self.gap < 0.0 {
            return Err(CardPressError::Measurement(format!(
                "padding and gap must not be negative, got padding={} gap={}",
                self.padding, self.gap
            )));
        }
        if self.content_width() <= 0.0 || self.content_height() <= 0.0 {
            return Err(CardPressError::Measurement(format!(
                "content box is empty: {}x{} page with {} padding",
                self.width, self.height, self.padding
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Opaque RGB color. Opacity is carried separately by the channel style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Parses `#rgb` or `#rrggbb`.
    pub fn from_hex(raw: &str) -> Result<Self> {
        let hex = raw.trim().trim_start_matches('#');
        let invalid = || CardPressError::InvalidConfiguration(format!("invalid color '{raw}'"));
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Color::rgb8(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Color::rgb8(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [to_u8(self.r), to_u8(self.g), to_u8(self.b)]
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl TryFrom<String> for Color {
    type Error = CardPressError;

    fn try_from(value: String) -> Result<Self> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}
