//! Integration tests for font registration and shaping.

mod common;

use cardpress::{FontRegistry, FontSpec, TextShaper};
use common::box_font;

fn spec(family: &str, size: f32) -> FontSpec {
    FontSpec {
        family: family.to_string(),
        size,
        weight: 400,
    }
}

fn assert_near(actual: f32, expected: f32) {
    assert!((actual - expected).abs() < 1e-3, "{actual} != {expected}");
}

#[test]
fn registered_faces_measure_with_their_advances() {
    let mut fonts = FontRegistry::new();
    fonts.register_bytes(box_font(), Some("box.ttf"), Some("Body Font")).unwrap();
    assert_eq!(fonts.len(), 1);

    let font = spec("Body Font", 20.0);
    assert!(fonts.has_face(&font));
    assert_near(fonts.run_width(&font, "Hello"), 5.0 * 12.0);
    assert_near(fonts.run_width(&font, "a b"), 3.0 * 12.0);
    assert_near(fonts.ascent(&font), 16.0);
}

#[test]
fn outlines_are_placed_on_the_baseline() {
    let mut fonts = FontRegistry::new();
    fonts.register_bytes(box_font(), None, Some("Body Font")).unwrap();
    let font = spec("Body Font", 10.0);

    let path = fonts.outline_run(&font, "AB", 10.0, 100.0).unwrap();
    let bounds = path.bounds();
    assert_near(bounds.left(), 10.5);
    assert_near(bounds.right(), 21.5);
    assert_near(bounds.top(), 93.0);
    assert_near(bounds.bottom(), 100.0);

    assert!(fonts.outline_run(&font, " ", 0.0, 0.0).is_none());
}

#[test]
fn generic_families_fall_back_to_any_face() {
    let mut fonts = FontRegistry::new();
    assert!(!fonts.has_face(&spec("Heading Font, sans-serif", 18.0)));
    assert!(fonts.outline_run(&spec("sans-serif", 18.0), "A", 0.0, 0.0).is_none());

    fonts.register_bytes(box_font(), None, None).unwrap();
    assert!(fonts.has_face(&spec("Heading Font, sans-serif", 18.0)));
    assert!(!fonts.has_face(&spec("Heading Font", 18.0)));
}

#[test]
fn directories_register_fonts_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Body.ttf"), box_font()).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a font").unwrap();
    std::fs::write(dir.path().join("broken.otf"), b"not a font either").unwrap();

    let mut fonts = FontRegistry::new();
    assert_eq!(fonts.register_dir(dir.path()), 1);
    assert!(fonts.has_face(&spec("body", 16.0)));
    assert_near(fonts.run_width(&spec("Body", 10.0), "xy"), 12.0);

    assert_eq!(fonts.register_dir(dir.path().join("missing")), 0);
}

#[test]
fn invalid_font_bytes_are_rejected() {
    let mut fonts = FontRegistry::new();
    assert!(fonts.register_bytes(b"nope".to_vec(), Some("nope.ttf"), None).is_err());
    assert!(fonts.is_empty());
}
