use std::io::Cursor;
use std::path::Path;

use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use rollcall_core::config::BadgeConfig;
use rollcall_core::error::{Result, RollcallError};
use tracing::{debug, warn};

/// Where the photo and the name go on the card template.
#[derive(Debug, Clone, PartialEq)]
pub struct BadgeLayout {
    pub circle_size: (u32, u32),
    pub photo_position: (i64, i64),
    pub text_position: (i64, i64),
    pub font_size: f32,
    pub text_color: [u8; 3],
}

impl Default for BadgeLayout {
    fn default() -> Self {
        Self::from_config(&BadgeConfig::default())
    }
}

impl BadgeLayout {
    pub fn from_config(config: &BadgeConfig) -> Self {
        Self {
            circle_size: (config.circle_size[0], config.circle_size[1]),
            photo_position: (config.photo_position[0], config.photo_position[1]),
            text_position: (config.text_position[0], config.text_position[1]),
            font_size: config.font_size,
            text_color: config.text_color,
        }
    }
}

pub struct BadgeRenderer {
    layout: BadgeLayout,
    template: RgbaImage,
    font: Option<FontArc>,
}

impl BadgeRenderer {
    pub fn new(layout: BadgeLayout, template: RgbaImage, font: Option<FontArc>) -> Self {
        if font.is_none() {
            warn!("no badge font configured, names will not be printed on cards");
        }
        Self {
            layout,
            template,
            font,
        }
    }

    /// Load the template and font named in the `[badge]` config section.
    ///
    /// Returns `Ok(None)` when no template is configured.
    pub fn from_config(config: &BadgeConfig) -> Result<Option<Self>> {
        let Some(template_path) = &config.template_path else {
            return Ok(None);
        };
        let template = image::open(Path::new(template_path))
            .map_err(|e| RollcallError::Image(format!("badge template {template_path}: {e}")))?
            .to_rgba8();

        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                let font = FontArc::try_from_vec(bytes)
                    .map_err(|e| RollcallError::Image(format!("badge font {path}: {e}")))?;
                Some(font)
            }
            None => None,
        };

        Ok(Some(Self::new(
            BadgeLayout::from_config(config),
            template,
            font,
        )))
    }

    pub fn layout(&self) -> &BadgeLayout {
        &self.layout
    }

    /// Crop the photo to a square, scale it to the circle and cut it round.
    ///
    /// Landscape photos keep their centre; portrait photos keep the top,
    /// where the face usually is.
    pub fn rounded_photo(&self, photo: &DynamicImage) -> RgbaImage {
        let (cw, ch) = self.layout.circle_size;
        let (w, h) = (photo.width(), photo.height());

        let k = w as f64 / cw as f64 - h as f64 / ch as f64;
        let side = w.min(h);
        let cropped = if k > 0.0 {
            photo.crop_imm((w - side) / 2, 0, side, side)
        } else if k < 0.0 {
            photo.crop_imm(0, 0, side, side)
        } else {
            photo.clone()
        };

        let mut rounded = imageops::resize(&cropped.to_rgba8(), cw, ch, FilterType::Lanczos3);
        let mask = ellipse_mask(cw, ch);
        for (pixel, coverage) in rounded.pixels_mut().zip(mask.pixels()) {
            pixel[3] = pixel[3].min(coverage[0]);
        }
        rounded
    }

    /// Draw the photo and the text onto a copy of the template.
    pub fn compose(&self, photo: &DynamicImage, text: &str) -> RgbaImage {
        let mut card = self.template.clone();
        let rounded = self.rounded_photo(photo);
        let (px, py) = self.layout.photo_position;
        imageops::overlay(&mut card, &rounded, px, py);

        match &self.font {
            Some(font) => {
                let label = render_text(font, self.layout.font_size, self.layout.text_color, text);
                let rotated = imageops::rotate270(&label);
                let (tx, ty) = self.layout.text_position;
                imageops::overlay(&mut card, &rotated, tx, ty);
            }
            None => debug!("skipping badge text, no font loaded"),
        }
        card
    }

    /// Decode a stored photo and render the finished card as PNG bytes.
    pub fn render_png(&self, photo_bytes: &[u8], text: &str) -> Result<Vec<u8>> {
        let photo = image::load_from_memory(photo_bytes)
            .map_err(|e| RollcallError::Image(format!("cannot decode photo: {e}")))?;
        let card = self.compose(&photo, text);

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(card)
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| RollcallError::Image(format!("cannot encode badge: {e}")))?;
        Ok(out.into_inner())
    }
}

/// Anti-aliased ellipse filling a `width` x `height` box, drawn at twice the
/// size and scaled down.
fn ellipse_mask(width: u32, height: u32) -> GrayImage {
    let (big_w, big_h) = (width * 2, height * 2);
    let (rx, ry) = (big_w as f64 / 2.0, big_h as f64 / 2.0);
    let big = GrayImage::from_fn(big_w, big_h, |x, y| {
        let dx = (x as f64 + 0.5 - rx) / rx;
        let dy = (y as f64 + 0.5 - ry) / ry;
        if dx * dx + dy * dy <= 1.0 {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    imageops::resize(&big, width, height, FilterType::Lanczos3)
}

/// Lay out `text` on one line on a transparent canvas just large enough to hold it.
fn render_text(font: &FontArc, size: f32, color: [u8; 3], text: &str) -> RgbaImage {
    let scaled = font.as_scaled(PxScale::from(size));

    let mut glyphs = Vec::new();
    let mut caret = point(0.0, scaled.ascent());
    let mut previous: Option<GlyphId> = None;
    for c in text.chars() {
        let mut glyph = scaled.scaled_glyph(c);
        if let Some(prev) = previous {
            caret.x += scaled.kern(prev, glyph.id);
        }
        glyph.position = caret;
        previous = Some(glyph.id);
        caret.x += scaled.h_advance(glyph.id);
        glyphs.push(glyph);
    }

    let width = caret.x.ceil().max(1.0) as u32;
    let height = (scaled.ascent() - scaled.descent()).ceil().max(1.0) as u32;
    let mut canvas = RgbaImage::new(width, height);

    for glyph in glyphs {
        let Some(outlined) = scaled.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|x, y, coverage| {
            let px = bounds.min.x as i64 + x as i64;
            let py = bounds.min.y as i64 + y as i64;
            if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                return;
            }
            let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            let pixel = canvas.get_pixel_mut(px as u32, py as u32);
            if alpha > pixel[3] {
                *pixel = Rgba([color[0], color[1], color[2], alpha]);
            }
        });
    }
    canvas
}
