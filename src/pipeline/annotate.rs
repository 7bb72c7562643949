//! Overlay rendering for parsed screens.
//!
//! Draws each element's box and an id/content label onto a copy of the
//! source image. The source is never touched, and rendering is fully
//! deterministic: identical inputs and style produce byte-identical pixel
//! buffers, which keeps golden-image tests honest.

use ab_glyph::FontVec;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::debug;

use super::{ElementKind, ElementRecord};

const TEXT_BOX_COLOR: Rgb<u8> = Rgb([0, 170, 80]);
const ICON_BOX_COLOR: Rgb<u8> = Rgb([220, 60, 40]);
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Rendering style for annotation overlays.
pub struct RenderStyle {
    /// Box outline thickness in pixels.
    pub thickness: u32,
    /// Label font. When None, only boxes are drawn.
    pub font: Option<FontVec>,
    /// Label font size in pixels.
    pub font_scale: f32,
    /// Maximum number of content characters shown in a label.
    pub label_max_chars: usize,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            font: None,
            font_scale: 14.0,
            label_max_chars: 40,
        }
    }
}

impl RenderStyle {
    /// Style with a font loaded from common system locations, falling back
    /// to box-only rendering when none is found.
    pub fn with_system_font() -> Self {
        let font_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/System/Library/Fonts/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];

        for path in &font_paths {
            if let Ok(data) = std::fs::read(path) {
                if let Ok(font) = FontVec::try_from_vec(data) {
                    debug!(path, "loaded label font");
                    return Self {
                        font: Some(font),
                        ..Self::default()
                    };
                }
            }
        }

        debug!("no system font found, labels will be box-only");
        Self::default()
    }
}

/// Draw all elements onto a copy of `image` and return it.
pub fn render(image: &RgbImage, elements: &[ElementRecord], style: &RenderStyle) -> RgbImage {
    let mut canvas = image.clone();
    let bounds = (canvas.width() as i32, canvas.height() as i32);

    for element in elements {
        let color = match element.kind {
            ElementKind::Text => TEXT_BOX_COLOR,
            ElementKind::Icon => ICON_BOX_COLOR,
        };
        draw_element_box(&mut canvas, element, style, color, bounds);
        draw_element_label(&mut canvas, element, style, color, bounds);
    }

    canvas
}

fn element_rect(element: &ElementRecord, img_width: u32, img_height: u32) -> Option<Rect> {
    let bbox = element.bbox.clamped(img_width, img_height);
    let width = bbox.width().round() as u32;
    let height = bbox.height().round() as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Rect::at(bbox.x_min.round() as i32, bbox.y_min.round() as i32).of_size(width, height))
}

fn is_rect_in_bounds(rect: &Rect, img_width: i32, img_height: i32) -> bool {
    rect.left() >= 0 && rect.top() >= 0 && rect.right() < img_width && rect.bottom() < img_height
}

fn draw_element_box(
    canvas: &mut RgbImage,
    element: &ElementRecord,
    style: &RenderStyle,
    color: Rgb<u8>,
    bounds: (i32, i32),
) {
    let Some(rect) = element_rect(element, canvas.width(), canvas.height()) else {
        return;
    };
    let (img_width, img_height) = bounds;

    // Thicken the outline inwards so the box never spills outside the image.
    for inset in 0..style.thickness as i32 {
        let shrunk_w = rect.width() as i32 - 2 * inset;
        let shrunk_h = rect.height() as i32 - 2 * inset;
        if shrunk_w <= 0 || shrunk_h <= 0 {
            break;
        }
        let inner = Rect::at(rect.left() + inset, rect.top() + inset)
            .of_size(shrunk_w as u32, shrunk_h as u32);
        if is_rect_in_bounds(&inner, img_width, img_height) {
            draw_hollow_rect_mut(canvas, inner, color);
        }
    }
}

fn draw_element_label(
    canvas: &mut RgbImage,
    element: &ElementRecord,
    style: &RenderStyle,
    color: Rgb<u8>,
    bounds: (i32, i32),
) {
    let Some(ref font) = style.font else {
        return;
    };
    let Some(rect) = element_rect(element, canvas.width(), canvas.height()) else {
        return;
    };
    let (img_width, img_height) = bounds;

    let label = format!(
        "{}: {}",
        element.id,
        truncate_label(&element.content, style.label_max_chars)
    );

    // Label strip sits above the box when there is room, inside it otherwise.
    let strip_height = style.font_scale as i32 + 4;
    let strip_width =
        ((label.chars().count() as f32 * style.font_scale * 0.6) as i32).min(img_width);
    let strip_x = rect.left().clamp(0, (img_width - strip_width).max(0));
    let strip_y = if rect.top() - strip_height >= 0 {
        rect.top() - strip_height
    } else {
        rect.top().max(0)
    };

    if strip_width <= 0 || strip_y + strip_height > img_height {
        return;
    }

    let strip = Rect::at(strip_x, strip_y).of_size(strip_width as u32, strip_height as u32);
    draw_filled_rect_mut(canvas, strip, color);
    draw_text_mut(
        canvas,
        LABEL_TEXT_COLOR,
        strip_x + 2,
        strip_y + 2,
        style.font_scale,
        font,
        &label,
    );
}

/// Truncate a label to `max_chars` characters, marking the cut with an
/// ellipsis character.
fn truncate_label(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
