//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use image::{ImageFormat, Rgba, RgbaImage};

pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub const UNITS_PER_EM: u16 = 1000;
pub const ADVANCE: u16 = 600;

/// A TrueType face with 1000 units per em where every printable ASCII
/// character except space is a solid box (x 50..550, y 0..700) and every
/// glyph advances 600 units. Space maps to an empty glyph.
pub fn box_font() -> Vec<u8> {
    let tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap()),
        (*b"glyf", glyf()),
        (*b"head", head()),
        (*b"hhea", hhea()),
        (*b"hmtx", hmtx()),
        (*b"loca", loca()),
        (*b"maxp", maxp()),
    ];

    let num_tables = tables.len() as u16;
    let mut out = Vec::new();
    put_u32(&mut out, 0x0001_0000);
    put_u16(&mut out, num_tables);
    let (search_range, entry_selector) = search_params(num_tables);
    put_u16(&mut out, search_range * 16);
    put_u16(&mut out, entry_selector);
    put_u16(&mut out, num_tables * 16 - search_range * 16);

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        out.extend_from_slice(tag);
        put_u32(&mut out, 0);
        put_u32(&mut out, offset as u32);
        put_u32(&mut out, data.len() as u32);
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }
    out.extend(body);
    out
}

const NUM_GLYPHS: u16 = 3;
const BOX_GLYPH: u16 = 1;
const SPACE_GLYPH: u16 = 2;

fn search_params(count: u16) -> (u16, u16) {
    let mut power = 1u16;
    let mut log = 0u16;
    while power * 2 <= count {
        power *= 2;
        log += 1;
    }
    (power, log)
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn head() -> Vec<u8> {
    let mut t = Vec::new();
    put_u32(&mut t, 0x0001_0000);
    put_u32(&mut t, 0x0001_0000);
    put_u32(&mut t, 0);
    put_u32(&mut t, 0x5F0F_3CF5);
    put_u16(&mut t, 0);
    put_u16(&mut t, UNITS_PER_EM);
    t.extend_from_slice(&[0; 16]);
    put_i16(&mut t, 0);
    put_i16(&mut t, -200);
    put_i16(&mut t, 600);
    put_i16(&mut t, 800);
    put_u16(&mut t, 0);
    put_u16(&mut t, 8);
    put_i16(&mut t, 2);
    put_i16(&mut t, 0);
    put_i16(&mut t, 0);
    t
}

fn hhea() -> Vec<u8> {
    let mut t = Vec::new();
    put_u32(&mut t, 0x0001_0000);
    put_i16(&mut t, 800);
    put_i16(&mut t, -200);
    put_i16(&mut t, 0);
    put_u16(&mut t, ADVANCE);
    put_i16(&mut t, 0);
    put_i16(&mut t, 0);
    put_i16(&mut t, 550);
    put_i16(&mut t, 1);
    put_i16(&mut t, 0);
    put_i16(&mut t, 0);
    t.extend_from_slice(&[0; 8]);
    put_i16(&mut t, 0);
    put_u16(&mut t, NUM_GLYPHS);
    t
}

fn maxp() -> Vec<u8> {
    let mut t = Vec::new();
    put_u32(&mut t, 0x0000_5000);
    put_u16(&mut t, NUM_GLYPHS);
    t
}

fn hmtx() -> Vec<u8> {
    let mut t = Vec::new();
    for _ in 0..NUM_GLYPHS {
        put_u16(&mut t, ADVANCE);
        put_i16(&mut t, 0);
    }
    t
}

fn box_glyph() -> Vec<u8> {
    let mut t = Vec::new();
    put_i16(&mut t, 1);
    for v in [50, 0, 550, 700] {
        put_i16(&mut t, v);
    }
    put_u16(&mut t, 3);
    put_u16(&mut t, 0);
    t.extend_from_slice(&[0x01; 4]);
    for dx in [50, 0, 500, 0] {
        put_i16(&mut t, dx);
    }
    for dy in [0, 700, 0, -700] {
        put_i16(&mut t, dy);
    }
    t
}

fn glyf() -> Vec<u8> {
    box_glyph()
}

/// Short offsets: glyph 0 empty, glyph 1 the box, glyph 2 empty.
fn loca() -> Vec<u8> {
    let len = box_glyph().len() as u16;
    let mut t = Vec::new();
    for offset in [0, 0, len, len] {
        put_u16(&mut t, offset / 2);
    }
    t
}

/// Format 4 with one single-character segment per code point.
fn cmap() -> Vec<u8> {
    let mut segments: Vec<(u16, u16)> = (0x20u16..=0x7E)
        .map(|c| {
            let glyph = if c == 0x20 { SPACE_GLYPH } else { BOX_GLYPH };
            (c, glyph.wrapping_sub(c))
        })
        .collect();
    segments.push((0xFFFF, 1));

    let seg_count = segments.len() as u16;
    let (power, log) = search_params(seg_count);
    let mut sub = Vec::new();
    put_u16(&mut sub, 4);
    put_u16(&mut sub, 16 + seg_count * 8);
    put_u16(&mut sub, 0);
    put_u16(&mut sub, seg_count * 2);
    put_u16(&mut sub, power * 2);
    put_u16(&mut sub, log);
    put_u16(&mut sub, seg_count * 2 - power * 2);
    for (code, _) in &segments {
        put_u16(&mut sub, *code);
    }
    put_u16(&mut sub, 0);
    for (code, _) in &segments {
        put_u16(&mut sub, *code);
    }
    for (_, delta) in &segments {
        put_u16(&mut sub, *delta);
    }
    for _ in &segments {
        put_u16(&mut sub, 0);
    }

    let mut t = Vec::new();
    put_u16(&mut t, 0);
    put_u16(&mut t, 1);
    put_u16(&mut t, 3);
    put_u16(&mut t, 1);
    put_u32(&mut t, 12);
    t.extend(sub);
    t
}
