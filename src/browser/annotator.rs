//! Visual grounding
//!
//! Burns numbered, colour-coded overlays onto a screenshot so the oracle can
//! refer to elements by the same ids it sees in the text description.

use chrono::Utc;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use tracing::debug;

use crate::core::{truncate_chars, InteractiveElement, Result};

const GLYPH_SIZE: i32 = 8;
const LABEL_SCALE: i32 = 2;
const LABEL_PADDING: i32 = 4;
const WATERMARK_URL_CHARS: usize = 50;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// An encoded annotated screenshot
#[derive(Debug, Clone)]
pub struct AnnotatedScreenshot {
    /// PNG bytes
    pub png: Vec<u8>,
    /// Number of elements drawn, which equals the highest id shown
    pub annotated: usize,
}

/// Assign ids 1..k to grounded elements in their current order, then
/// k+1.. to the rest. Returns k.
pub fn renumber(elements: &mut [InteractiveElement]) -> usize {
    let mut next = 1;
    for element in elements.iter_mut().filter(|e| e.is_grounded()) {
        element.id = next;
        next += 1;
    }
    let grounded = next - 1;
    for element in elements.iter_mut().filter(|e| !e.is_grounded()) {
        element.id = next;
        next += 1;
    }
    grounded
}

#[derive(Debug, Clone, Default)]
pub struct VisualAnnotator;

impl VisualAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// Decode `screenshot`, renumber `elements` and return a new PNG with
    /// overlays for every grounded element. The input bytes are untouched.
    pub fn annotate(
        &self,
        screenshot: &[u8],
        elements: &mut [InteractiveElement],
        current_url: &str,
    ) -> Result<AnnotatedScreenshot> {
        let annotated = renumber(elements);
        let mut canvas = image::load_from_memory(screenshot)?.to_rgba8();

        for element in elements.iter().filter(|e| e.is_grounded()) {
            draw_element(&mut canvas, element);
        }

        let watermark = format!(
            "webpilot | {} | {} | elements: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            truncate_chars(current_url, WATERMARK_URL_CHARS),
            annotated
        );
        draw_watermark(&mut canvas, &watermark);

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(canvas).write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;

        debug!(annotated, bytes = png.len(), "screenshot annotated");
        Ok(AnnotatedScreenshot { png, annotated })
    }
}

/// Outline colour by tag, then by role flags
fn element_color(element: &InteractiveElement) -> Rgba<u8> {
    match element.tag.as_str() {
        "a" => Rgba([0, 255, 0, 255]),
        "input" => Rgba([255, 165, 0, 255]),
        "textarea" => Rgba([255, 140, 0, 255]),
        "button" => Rgba([0, 150, 255, 255]),
        "select" => Rgba([255, 0, 255, 255]),
        "form" => Rgba([255, 20, 147, 255]),
        "label" => Rgba([165, 42, 42, 255]),
        _ if element.is_form_field => Rgba([255, 165, 0, 255]),
        _ if element.is_clickable => Rgba([0, 150, 255, 255]),
        _ => Rgba([128, 128, 128, 255]),
    }
}

fn confidence_color(confidence: f64) -> Rgba<u8> {
    if confidence > 0.8 {
        Rgba([0, 200, 0, 255])
    } else if confidence > 0.6 {
        Rgba([255, 215, 0, 255])
    } else {
        Rgba([220, 0, 0, 255])
    }
}

/// I for inputs, C for clickables, V for anything else
fn type_glyph(element: &InteractiveElement) -> char {
    if element.is_form_field {
        'I'
    } else if element.is_clickable {
        'C'
    } else {
        'V'
    }
}

fn rect(x: i32, y: i32, width: i32, height: i32) -> Rect {
    Rect::at(x, y).of_size(width.max(1) as u32, height.max(1) as u32)
}

fn draw_element(canvas: &mut RgbaImage, element: &InteractiveElement) {
    let color = element_color(element);
    let bbox = element.bounding_box;
    let (x, y) = (bbox.x.round() as i32, bbox.y.round() as i32);
    let (w, h) = (bbox.width.round() as i32, bbox.height.round() as i32);
    let (img_w, img_h) = (canvas.width() as i32, canvas.height() as i32);

    let thickness = ((element.confidence_score * 5.0) as i32).max(3);
    for i in 0..thickness {
        draw_hollow_rect_mut(canvas, rect(x - i, y - i, w + 2 * i, h + 2 * i), color);
    }

    let number = element.id.to_string();
    let text_w = number.len() as i32 * GLYPH_SIZE * LABEL_SCALE;
    let box_w = text_w + GLYPH_SIZE + 3 * LABEL_PADDING;
    let box_h = GLYPH_SIZE * LABEL_SCALE + 2 * LABEL_PADDING;
    let box_x = (x - 2).max(2).min((img_w - box_w - 2).max(2));
    let box_y = (y - box_h - 4).max(2).min((img_h - box_h - 2).max(2));

    draw_filled_rect_mut(canvas, rect(box_x, box_y, box_w, box_h), color);
    draw_hollow_rect_mut(canvas, rect(box_x, box_y, box_w, box_h), WHITE);
    draw_bitmap_text(
        canvas,
        box_x + LABEL_PADDING,
        box_y + LABEL_PADDING,
        &number,
        WHITE,
        LABEL_SCALE,
    );
    draw_bitmap_text(
        canvas,
        box_x + 2 * LABEL_PADDING + text_w,
        box_y + box_h - LABEL_PADDING - GLYPH_SIZE,
        &type_glyph(element).to_string(),
        WHITE,
        1,
    );

    let dot_radius = (((element.confidence_score * 8.0) as i32).max(6)) / 2;
    let center = (x + w - dot_radius, y + h - dot_radius);
    draw_filled_circle_mut(canvas, center, dot_radius + 1, WHITE);
    draw_filled_circle_mut(canvas, center, dot_radius, confidence_color(element.confidence_score));
}

fn draw_watermark(canvas: &mut RgbaImage, text: &str) {
    let text_w = text.chars().count() as i32 * GLYPH_SIZE;
    let box_h = GLYPH_SIZE + 2 * LABEL_PADDING;
    let y = (canvas.height() as i32 - box_h - 4).max(0);
    draw_filled_rect_mut(canvas, rect(4, y, text_w + 2 * LABEL_PADDING, box_h), BLACK);
    draw_bitmap_text(canvas, 4 + LABEL_PADDING, y + LABEL_PADDING, text, WHITE, 1);
}

/// Draw `text` with the 8x8 bitmap font, clipping at the image bounds
fn draw_bitmap_text(canvas: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: i32) {
    let scale = scale.max(1);
    let (img_w, img_h) = (canvas.width() as i32, canvas.height() as i32);
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += GLYPH_SIZE * scale;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (row >> col) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col * scale;
                let py = y + row_idx as i32 * scale;
                for sy in 0..scale {
                    for sx in 0..scale {
                        let (tx, ty) = (px + sx, py + sy);
                        if tx >= 0 && ty >= 0 && tx < img_w && ty < img_h {
                            canvas.put_pixel(tx as u32, ty as u32, color);
                        }
                    }
                }
            }
        }
        cursor_x += GLYPH_SIZE * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BoundingBox;
    use std::collections::BTreeMap;

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([250, 250, 250, 255]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();
        png
    }

    fn element(tag: &str, visible: bool, confidence: f64, y: f64) -> InteractiveElement {
        InteractiveElement {
            id: 0,
            marker: 0,
            tag: tag.to_string(),
            element_kind: "unknown".to_string(),
            label: tag.to_string(),
            text: String::new(),
            is_visible: visible,
            is_clickable: tag == "a" || tag == "button",
            is_form_field: tag == "input",
            bounding_box: BoundingBox::new(20.0, y, 120.0, 30.0),
            attributes: BTreeMap::new(),
            placeholder: None,
            value: None,
            in_frame: false,
            confidence_score: confidence,
        }
    }

    #[test]
    fn test_renumber_skips_ungrounded() {
        let mut elements = vec![
            element("a", true, 0.9, 10.0),
            element("div", false, 0.9, 10.0),
            element("button", true, 0.2, 10.0),
            element("input", true, 0.7, 10.0),
        ];
        let grounded = renumber(&mut elements);
        assert_eq!(grounded, 2);
        let ids: Vec<usize> = elements.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3, 4, 2]);
    }

    #[test]
    fn test_annotate_returns_new_png_of_same_size() {
        let original = blank_png(400, 300);
        let snapshot = original.clone();
        let mut elements = vec![
            element("a", true, 0.9, 10.0),
            element("input", true, 0.7, 100.0),
            element("div", false, 0.5, 200.0),
        ];

        let annotated = VisualAnnotator::new()
            .annotate(&original, &mut elements, "https://example.com/search?q=rust")
            .unwrap();

        assert_eq!(original, snapshot);
        assert_eq!(annotated.annotated, 2);
        assert_ne!(annotated.png, original);
        let decoded = image::load_from_memory(&annotated.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
    }

    #[test]
    fn test_label_near_top_edge_stays_in_bounds() {
        let png = blank_png(200, 120);
        let mut elements = vec![element("button", true, 1.0, 0.0)];
        let annotated = VisualAnnotator::new()
            .annotate(&png, &mut elements, "about:blank")
            .unwrap();
        assert_eq!(annotated.annotated, 1);
    }

    #[test]
    fn test_invalid_screenshot_is_an_error() {
        let mut elements = Vec::new();
        assert!(VisualAnnotator::new()
            .annotate(b"not a png", &mut elements, "")
            .is_err());
    }

    #[test]
    fn test_colors() {
        assert_eq!(element_color(&element("a", true, 0.9, 0.0)), Rgba([0, 255, 0, 255]));
        assert_eq!(
            element_color(&element("span", true, 0.9, 0.0)),
            Rgba([128, 128, 128, 255])
        );
        assert_eq!(confidence_color(0.9), Rgba([0, 200, 0, 255]));
        assert_eq!(confidence_color(0.7), Rgba([255, 215, 0, 255]));
        assert_eq!(confidence_color(0.5), Rgba([220, 0, 0, 255]));
    }

    #[test]
    fn test_type_glyph() {
        assert_eq!(type_glyph(&element("input", true, 0.9, 0.0)), 'I');
        assert_eq!(type_glyph(&element("a", true, 0.9, 0.0)), 'C');
        assert_eq!(type_glyph(&element("label", true, 0.9, 0.0)), 'V');
    }
}
