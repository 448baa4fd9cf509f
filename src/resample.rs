use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Interpolation used when sampling a raster at a fractional position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    Nearest,
    Bilinear,
    #[default]
    Cubic,
}

/// Cubic interpolation kernel (Catmull-Rom)
fn cubic_weight(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;

    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

/// Sample a row-major grid at fractional cell-centre coordinates.
///
/// `col`/`row` are measured so that integer values hit cell centres.
/// Returns NaN outside the grid. Interpolated kernels that touch a NaN
/// cell fall back to the nearest cell so nodata edges stay sharp.
pub fn sample_grid(
    data: &[f64],
    cols: usize,
    rows: usize,
    col: f64,
    row: f64,
    method: Resampling,
) -> f64 {
    if cols == 0 || rows == 0 || !col.is_finite() || !row.is_finite() {
        return f64::NAN;
    }
    if col < -0.5 || row < -0.5 || col > cols as f64 - 0.5 || row > rows as f64 - 0.5 {
        return f64::NAN;
    }

    let get = |c: i64, r: i64| -> f64 {
        let c = c.clamp(0, cols as i64 - 1) as usize;
        let r = r.clamp(0, rows as i64 - 1) as usize;
        data[r * cols + c]
    };

    let nearest = get(col.round() as i64, row.round() as i64);

    match method {
        Resampling::Nearest => nearest,
        Resampling::Bilinear => {
            let c0 = col.floor() as i64;
            let r0 = row.floor() as i64;
            let fx = col - col.floor();
            let fy = row - row.floor();

            let p00 = get(c0, r0);
            let p10 = get(c0 + 1, r0);
            let p01 = get(c0, r0 + 1);
            let p11 = get(c0 + 1, r0 + 1);
            if [p00, p10, p01, p11].iter().any(|v| v.is_nan()) {
                return nearest;
            }

            let top = p00 * (1.0 - fx) + p10 * fx;
            let bottom = p01 * (1.0 - fx) + p11 * fx;
            top * (1.0 - fy) + bottom * fy
        }
        Resampling::Cubic => {
            let c0 = col.floor() as i64;
            let r0 = row.floor() as i64;
            let wx = cubic_weight(col - col.floor());
            let wy = cubic_weight(row - row.floor());

            let mut result = 0.0;
            for j in 0..4 {
                for i in 0..4 {
                    let v = get(c0 + i as i64 - 1, r0 + j as i64 - 1);
                    if v.is_nan() {
                        return nearest;
                    }
                    result += v * wx[i] * wy[j];
                }
            }
            result
        }
    }
}

/// Premultiply alpha: RGB values are multiplied by alpha
fn premultiply_alpha(img: &RgbaImage) -> Vec<[f64; 4]> {
    img.pixels()
        .map(|pixel| {
            let alpha = pixel[3] as f64 / 255.0;
            [
                pixel[0] as f64 * alpha,
                pixel[1] as f64 * alpha,
                pixel[2] as f64 * alpha,
                pixel[3] as f64,
            ]
        })
        .collect()
}

/// Unpremultiply alpha: divide RGB by alpha
fn unpremultiply_alpha(premultiplied: [f64; 4]) -> Rgba<u8> {
    let alpha = premultiplied[3];
    if alpha < 1.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let alpha_norm = alpha / 255.0;
    let r = (premultiplied[0] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let g = (premultiplied[1] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let b = (premultiplied[2] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let a = alpha.round().clamp(0.0, 255.0) as u8;

    Rgba([r, g, b, a])
}

/// Bicubic interpolation of premultiplied pixels
fn bicubic_interpolate(
    premultiplied: &[[f64; 4]],
    width: u32,
    height: u32,
    x: f64,
    y: f64,
) -> [f64; 4] {
    let x_floor = x.floor() as i32;
    let y_floor = y.floor() as i32;
    let wx = cubic_weight(x - x.floor());
    let wy = cubic_weight(y - y.floor());

    let mut result = [0.0; 4];

    for j in 0..4 {
        for i in 0..4 {
            let px = (x_floor + i as i32 - 1).clamp(0, width as i32 - 1) as u32;
            let py = (y_floor + j as i32 - 1).clamp(0, height as i32 - 1) as u32;
            let idx = (py * width + px) as usize;

            let weight = wx[i] * wy[j];
            for c in 0..4 {
                result[c] += premultiplied[idx][c] * weight;
            }
        }
    }

    result
}

/// Resize image so that the longest side equals target_size
pub fn resize_to_fit(img: &RgbaImage, target_size: u32) -> RgbaImage {
    let (width, height) = img.dimensions();

    if width == 0 || height == 0 || width.max(height) == target_size {
        return img.clone();
    }

    let scale = target_size as f64 / width.max(height) as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);

    let premultiplied = premultiply_alpha(img);
    let mut output = RgbaImage::new(new_width, new_height);

    for out_y in 0..new_height {
        for out_x in 0..new_width {
            let src_x = (out_x as f64 + 0.5) / scale - 0.5;
            let src_y = (out_y as f64 + 0.5) / scale - 0.5;

            let interpolated = bicubic_interpolate(&premultiplied, width, height, src_x, src_y);
            output.put_pixel(out_x, out_y, unpremultiply_alpha(interpolated));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premultiply_unpremultiply() {
        let pixel = Rgba([200, 100, 50, 128]);
        let img = RgbaImage::from_pixel(1, 1, pixel);
        let premul = premultiply_alpha(&img);

        let unpremul = unpremultiply_alpha(premul[0]);
        assert!((unpremul[0] as i32 - pixel[0] as i32).abs() <= 1);
        assert!((unpremul[1] as i32 - pixel[1] as i32).abs() <= 1);
        assert!((unpremul[2] as i32 - pixel[2] as i32).abs() <= 1);
        assert_eq!(unpremul[3], pixel[3]);
    }

    #[test]
    fn test_resize_keeps_aspect() {
        let img = RgbaImage::from_pixel(40, 20, Rgba([10, 20, 30, 255]));
        let resized = resize_to_fit(&img, 10);
        assert_eq!(resized.dimensions(), (10, 5));
        assert_eq!(*resized.get_pixel(5, 2), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_sample_grid_methods() {
        // 3x2 ramp: value = col
        let data = vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        assert_eq!(sample_grid(&data, 3, 2, 1.2, 0.0, Resampling::Nearest), 1.0);
        let v = sample_grid(&data, 3, 2, 0.5, 0.5, Resampling::Bilinear);
        assert!((v - 0.5).abs() < 1e-12);
        let v = sample_grid(&data, 3, 2, 1.0, 0.0, Resampling::Cubic);
        assert!((v - 1.0).abs() < 1e-12);
        assert!(sample_grid(&data, 3, 2, -1.0, 0.0, Resampling::Nearest).is_nan());
        assert!(sample_grid(&data, 3, 2, 0.0, 2.0, Resampling::Nearest).is_nan());
    }

    #[test]
    fn test_sample_grid_nan_falls_back_to_nearest() {
        let data = vec![5.0, f64::NAN, 5.0, 5.0];
        let v = sample_grid(&data, 2, 2, 0.2, 0.2, Resampling::Bilinear);
        assert_eq!(v, 5.0);
        let v = sample_grid(&data, 2, 2, 0.8, 0.1, Resampling::Cubic);
        assert!(v.is_nan());
    }
}
