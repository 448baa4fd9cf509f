//! Compositing the placed landslide over the background at true scale

use ab_glyph::{FontRef, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::Placement;
use crate::hillshade::HillshadeParams;
use crate::outline::Outline;
use crate::raster::{Raster, Stretch};
use crate::resample::{resize_to_fit, Resampling};

const FACE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RED: Rgba<u8> = Rgba([214, 39, 40, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// DejaVu Sans, for the scale bar label
const LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Which part of the map the composite shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    /// The full background extent
    #[default]
    Background,
    /// The placed landslide plus a margin
    Landslide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub frame: Frame,
    /// Margin around the placed landslide for `Frame::Landslide`, in metres
    pub padding_m: f64,
    /// Longest side of the saved image in pixels
    pub size: u32,
    /// Landslide opacity over the background
    pub opacity: f64,
    pub resampling: Resampling,
    pub outline: bool,
    pub marker: bool,
    pub scale_bar: bool,
    pub hillshade: HillshadeParams,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            frame: Frame::Background,
            padding_m: 500.0,
            size: 2048,
            opacity: 1.0,
            resampling: Resampling::Cubic,
            outline: true,
            marker: true,
            scale_bar: true,
            hillshade: HillshadeParams::default(),
        }
    }
}

/// A north-up pixel grid laid over map coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub min_x: f64,
    pub max_y: f64,
    pub pixel_size: f64,
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// Cover `extent` at `native` resolution, coarsened so neither side exceeds `max_side`
    pub fn fit(extent: (f64, f64, f64, f64), native: f64, max_side: u32) -> Self {
        let (min_x, min_y, max_x, max_y) = extent;
        let span_x = (max_x - min_x).max(f64::EPSILON);
        let span_y = (max_y - min_y).max(f64::EPSILON);
        let pixel_size = native.max(span_x.max(span_y) / max_side.max(1) as f64);

        Self {
            min_x,
            max_y,
            pixel_size,
            width: ((span_x / pixel_size).round() as u32).max(1),
            height: ((span_y / pixel_size).round() as u32).max(1),
        }
    }

    /// Same extent drawn into an image of a different size
    pub fn scaled(&self, width: u32, height: u32) -> Self {
        Self {
            pixel_size: self.pixel_size * self.width as f64 / width.max(1) as f64,
            width,
            height,
            ..*self
        }
    }

    pub fn extent(&self) -> (f64, f64, f64, f64) {
        (
            self.min_x,
            self.max_y - self.height as f64 * self.pixel_size,
            self.min_x + self.width as f64 * self.pixel_size,
            self.max_y,
        )
    }

    pub fn pixel_centre(&self, col: u32, row: u32) -> (f64, f64) {
        (
            self.min_x + (col as f64 + 0.5) * self.pixel_size,
            self.max_y - (row as f64 + 0.5) * self.pixel_size,
        )
    }

    pub fn to_pixel(&self, x: f64, y: f64) -> (f32, f32) {
        (
            ((x - self.min_x) / self.pixel_size) as f32,
            ((self.max_y - y) / self.pixel_size) as f32,
        )
    }
}

/// Grow an extent by `pad` on every side
pub fn pad_extent(extent: (f64, f64, f64, f64), pad: f64) -> (f64, f64, f64, f64) {
    (extent.0 - pad, extent.1 - pad, extent.2 + pad, extent.3 + pad)
}

/// Greyscale rendering of a raster's first band, or the luma of the first three.
///
/// Each band is scaled over its full finite range, black at the minimum
/// and white at the maximum.
#[derive(Debug, Clone)]
pub struct GreyRamp {
    stretches: Vec<Stretch>,
}

impl GreyRamp {
    pub fn for_raster(raster: &Raster) -> Self {
        let bands = if raster.band_count() >= 3 { 3 } else { 1 };
        Self {
            stretches: (0..bands).map(|b| Stretch::min_max(raster.band(b))).collect(),
        }
    }

    /// Sample `raster` at `(x, y)`; `None` over nodata
    pub fn grey_at(&self, raster: &Raster, x: f64, y: f64, method: Resampling) -> Option<f64> {
        if self.stretches.len() == 3 {
            let mut luma = 0.0;
            for (band, weight) in [0.299, 0.587, 0.114].into_iter().enumerate() {
                let v = raster.sample(band, x, y, method);
                if !v.is_finite() {
                    return None;
                }
                luma += weight * self.stretches[band].unit(v);
            }
            Some(luma * 255.0)
        } else {
            let v = raster.sample(0, x, y, method);
            v.is_finite().then(|| self.stretches[0].unit(v) * 255.0)
        }
    }
}

/// Paint the background imagery, shaded by an optional hillshade.
///
/// A fourth band is read as alpha over the white face colour, so cells
/// without imagery stay white. Without imagery the hillshade alone is
/// drawn in grey.
pub fn render_background(
    canvas: &Canvas,
    background: Option<&Raster>,
    shade: Option<&Raster>,
    options: &RenderOptions,
) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(canvas.width, canvas.height, FACE);
    let stretches: Vec<Stretch> = background
        .map(|bg| (0..bg.band_count().min(3)).map(|b| Stretch::for_band(bg.band(b))).collect())
        .unwrap_or_default();
    // Byte alpha is 0..=255, anything else 0..=1
    let alpha_scale = background
        .filter(|bg| bg.band_count() == 4)
        .map(|bg| if Stretch::for_band(bg.band(3)) == Stretch::IDENTITY { 255.0 } else { 1.0 });
    let blend = options.hillshade.blend.clamp(0.0, 1.0);

    for row in 0..canvas.height {
        for col in 0..canvas.width {
            let (x, y) = canvas.pixel_centre(col, row);
            let shade_value = shade
                .map(|s| s.sample(0, x, y, Resampling::Bilinear))
                .filter(|v| v.is_finite());

            let rgb = match background {
                Some(bg) => {
                    let Some(values) = bg.sample_all(x, y, options.resampling) else {
                        continue;
                    };
                    let mut rgb = [0.0; 3];
                    for (c, out) in rgb.iter_mut().enumerate() {
                        let band = if stretches.len() >= 3 { c } else { 0 };
                        *out = stretches[band].unit(values[band]) * 255.0;
                    }
                    if let Some(s) = shade_value {
                        let factor = (1.0 - blend) + blend * s;
                        for out in rgb.iter_mut() {
                            *out *= factor;
                        }
                    }
                    if let Some(scale) = alpha_scale {
                        let alpha = (values[3] / scale).clamp(0.0, 1.0);
                        if alpha <= 0.0 {
                            continue;
                        }
                        for (out, face) in rgb.iter_mut().zip(FACE.0) {
                            *out = alpha * *out + (1.0 - alpha) * face as f64;
                        }
                    }
                    rgb
                }
                None => match shade_value {
                    Some(s) => [s * 255.0; 3],
                    None => continue,
                },
            };

            img.put_pixel(col, row, to_rgba(rgb));
        }
    }

    img
}

/// Paint the clipped landslide, carried into the canvas frame by `placement`
pub fn render_overlay(
    img: &mut RgbaImage,
    canvas: &Canvas,
    landslide: &Raster,
    placement: &Placement,
    options: &RenderOptions,
) -> usize {
    let ramp = GreyRamp::for_raster(landslide);
    let inverse = placement.inverse();
    let alpha = options.opacity.clamp(0.0, 1.0);

    let (min_x, min_y, max_x, max_y) = placement.transformed_bounds(landslide.bounds());
    let (c0, r0) = canvas.to_pixel(min_x, max_y);
    let (c1, r1) = canvas.to_pixel(max_x, min_y);
    let col_range = (c0.floor().max(0.0) as u32)..(c1.ceil().max(0.0) as u32).min(canvas.width);
    let row_range = (r0.floor().max(0.0) as u32)..(r1.ceil().max(0.0) as u32).min(canvas.height);

    let mut painted = 0;
    for row in row_range {
        for col in col_range.clone() {
            let (x, y) = canvas.pixel_centre(col, row);
            let (lx, ly) = inverse.apply(x, y);
            let Some(grey) = ramp.grey_at(landslide, lx, ly, options.resampling) else {
                continue;
            };

            let under = img.get_pixel(col, row);
            let mut rgb = [0.0; 3];
            for (c, out) in rgb.iter_mut().enumerate() {
                *out = (1.0 - alpha) * under[c] as f64 + alpha * grey;
            }
            img.put_pixel(col, row, to_rgba(rgb));
            painted += 1;
        }
    }

    painted
}

fn to_rgba(rgb: [f64; 3]) -> Rgba<u8> {
    Rgba([
        rgb[0].round().clamp(0.0, 255.0) as u8,
        rgb[1].round().clamp(0.0, 255.0) as u8,
        rgb[2].round().clamp(0.0, 255.0) as u8,
        255,
    ])
}

fn line_width(img: &RgbaImage) -> u32 {
    (img.width().max(img.height()) / 700).max(1)
}

/// Stroke every ring of an outline that is already in the canvas frame
pub fn draw_outline(img: &mut RgbaImage, canvas: &Canvas, outline: &Outline) {
    let width = line_width(img) as i32;
    for ring in outline.rings() {
        for segment in ring.lines() {
            let start = canvas.to_pixel(segment.start.x, segment.start.y);
            let end = canvas.to_pixel(segment.end.x, segment.end.y);
            for dx in 0..width {
                for dy in 0..width {
                    let (ox, oy) = ((dx - width / 2) as f32, (dy - width / 2) as f32);
                    draw_line_segment_mut(
                        img,
                        (start.0 + ox, start.1 + oy),
                        (end.0 + ox, end.1 + oy),
                        RED,
                    );
                }
            }
        }
    }
}

/// Filled dot at a map coordinate
pub fn draw_marker(img: &mut RgbaImage, canvas: &Canvas, point: (f64, f64)) {
    let (px, py) = canvas.to_pixel(point.0, point.1);
    let radius = (line_width(img) * 4) as i32;
    draw_filled_circle_mut(img, (px.round() as i32, py.round() as i32), radius, RED);
}

/// Largest 1, 2 or 5 x 10^k not exceeding `max`
pub fn nice_length(max: f64) -> f64 {
    if !(max.is_finite() && max > 0.0) {
        return 0.0;
    }
    let magnitude = 10f64.powf(max.log10().floor());
    [5.0, 2.0, 1.0]
        .into_iter()
        .map(|m| m * magnitude)
        .find(|&len| len <= max)
        .unwrap_or(magnitude)
}

/// Scale bar label such as `500 m` or `2 km`
pub fn format_length(length_m: f64) -> String {
    if length_m >= 1000.0 {
        format!("{} km", length_m / 1000.0)
    } else {
        format!("{} m", length_m)
    }
}

/// Two-tone scale bar in the lower-left corner, labelled with its length.
///
/// Returns the length in metres, or 0 when the canvas is too small for a bar.
pub fn draw_scale_bar(img: &mut RgbaImage, canvas: &Canvas) -> f64 {
    let span = canvas.width as f64 * canvas.pixel_size;
    let length_m = nice_length(span / 4.0);
    let length_px = (length_m / canvas.pixel_size).round() as u32;
    if length_px < 2 {
        return 0.0;
    }

    let margin = (canvas.width.min(canvas.height) / 20).max(2);
    let bar_h = (canvas.height / 100).max(3);
    let x = margin as i32;
    let y = canvas.height.saturating_sub(margin + bar_h) as i32;
    let half = length_px / 2;

    draw_filled_rect_mut(img, Rect::at(x, y).of_size(half.max(1), bar_h), BLACK);
    draw_filled_rect_mut(
        img,
        Rect::at(x + half as i32, y).of_size((length_px - half).max(1), bar_h),
        FACE,
    );
    draw_hollow_rect_mut(img, Rect::at(x, y).of_size(length_px, bar_h), BLACK);

    match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => {
            let label = format_length(length_m);
            let scale = PxScale::from((canvas.height as f32 / 30.0).max(12.0));
            let (_, text_h) = text_size(scale, &font, &label);
            let text_y = y - text_h as i32 - bar_h as i32;
            // White halo under the label
            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                draw_text_mut(img, FACE, x + dx, text_y + dy, scale, &font, &label);
            }
            draw_text_mut(img, BLACK, x, text_y, scale, &font, &label);
        }
        Err(err) => warn!(%err, "scale bar font failed to load, drawing bar without label"),
    }

    length_m
}

/// Quick look at a raster with an outline on top, in the raster's own frame
pub fn render_preview(raster: &Raster, outline: &Outline, size: u32) -> RgbaImage {
    let bounds = raster.bounds();
    let canvas = Canvas::fit(bounds, raster.ground_resolution(), size);
    let ramp = GreyRamp::for_raster(raster);

    let mut img = RgbaImage::from_pixel(canvas.width, canvas.height, FACE);
    for row in 0..canvas.height {
        for col in 0..canvas.width {
            let (x, y) = canvas.pixel_centre(col, row);
            if let Some(grey) = ramp.grey_at(raster, x, y, Resampling::Nearest) {
                img.put_pixel(col, row, to_rgba([grey; 3]));
            }
        }
    }

    let mut img = resize_to_fit(&img, size);
    let canvas = canvas.scaled(img.width(), img.height());
    draw_outline(&mut img, &canvas, outline);
    img
}
