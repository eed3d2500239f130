use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::Detection;

pub const BRIGHT_COLORS: [Rgb<u8>; 12] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
    Rgb([255, 128, 0]),
    Rgb([255, 0, 128]),
    Rgb([128, 255, 0]),
    Rgb([0, 128, 255]),
    Rgb([255, 255, 255]),
    Rgb([128, 0, 255]),
];

/// Same class name, same color.
pub fn color_for_class(name: &str) -> Rgb<u8> {
    let sum: u32 = name.bytes().map(u32::from).sum();
    BRIGHT_COLORS[sum as usize % BRIGHT_COLORS.len()]
}

pub fn load_font(path: &str) -> Result<FontArc> {
    let bytes = std::fs::read(path).with_context(|| format!("read font {path}"))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("parse font {path}"))
}

/// Draws hollow boxes, and `name: score` labels when a font is given. Boxes
/// are clipped to the image.
pub fn annotate(image: &mut RgbImage, detections: &[Detection], font: Option<&FontArc>) {
    for det in detections {
        let color = color_for_class(det.class());
        let bbox = det.bbox();
        let x = bbox.xmin().max(0.) as i32;
        let y = bbox.ymin().max(0.) as i32;
        let w = bbox.width().min(image.width() as f32 - x as f32) as u32;
        let h = bbox.height().min(image.height() as f32 - y as f32) as u32;
        if w > 0 && h > 0 {
            draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), color);
        }
        if let Some(font) = font {
            let label = format!("{}: {:.2}", det.class(), det.score());
            let text_y = (y - 16).max(0);
            draw_text_mut(image, color, x, text_y, PxScale::from(16.0), font, &label);
        }
    }
}
