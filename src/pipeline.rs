//! End-to-end run: load, reproject, clip, place, render and save

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbaImage};
use tracing::{debug, info, warn};

use crate::clip::clip_to_outline;
use crate::config::Config;
use crate::crs::{estimate_utm_crs, Crs};
use crate::error::{OverlayError, Result};
use crate::geometry::{plan_placement, Placement};
use crate::hillshade::hillshade;
use crate::io::{read_geotiff, read_outline, write_geotiff};
use crate::outline::Outline;
use crate::raster::Raster;
use crate::render::{
    draw_marker, draw_outline, draw_scale_bar, pad_extent, render_background, render_overlay,
    render_preview, Canvas, Frame,
};
use crate::reproject::reproject;
use crate::resample::{resize_to_fit, Resampling};

/// The canvas is rendered at up to this multiple of the output size, then downsampled
const SUPERSAMPLE: u32 = 2;

/// Longest side of the preview images
const PREVIEW_SIZE: u32 = 1024;

/// What a run produced
#[derive(Debug, Clone)]
pub struct Summary {
    pub landslide_crs: Crs,
    pub frame_crs: Crs,
    /// Crown in landslide UTM coordinates
    pub crown_xy: (f64, f64),
    /// Target in frame UTM coordinates
    pub target_xy: (f64, f64),
    pub rotation_deg: f64,
    /// Landslide cells left after clipping
    pub clipped_cells: usize,
    pub image: PathBuf,
    pub dimensions: (u32, u32),
    /// Length of the drawn scale bar, if any
    pub scale_bar_m: Option<f64>,
    /// Every file written, the composite first
    pub written: Vec<PathBuf>,
}

/// Read a raster and bring it into the UTM zone of its own centre
fn load_local_utm(path: &Path, method: Resampling) -> Result<Raster> {
    let raster = read_geotiff(path)?;
    let (lon, lat) = raster.centre_lonlat();
    let utm = estimate_utm_crs(lon, lat);
    debug!(path = %path.display(), from = %raster.crs(), to = %utm, "estimated local UTM zone");
    reproject(&raster, utm, method)
}

fn save_rgb(img: RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    // Flatten to RGB so JPEG output works too
    DynamicImage::ImageRgba8(img).to_rgb8().save(path)?;
    Ok(())
}

fn write_previews(
    dir: &Path,
    landslide: &Raster,
    clipped: &Raster,
    outline: &Outline,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (name, raster) in [("landslide_outline.png", landslide), ("landslide_clipped.png", clipped)] {
        let path = dir.join(name);
        save_rgb(render_preview(raster, outline, PREVIEW_SIZE), &path)?;
        debug!(path = %path.display(), "wrote preview");
        written.push(path);
    }
    Ok(())
}

/// Run the whole overlay for one configuration
pub fn run(config: &Config) -> Result<Summary> {
    config.validate()?;
    let method = config.render.resampling;
    let mut written = Vec::new();

    // Landslide and its outline, in the landslide's local UTM zone
    let landslide = load_local_utm(&config.inputs.landslide, method)?;
    let landslide_crs = landslide.crs();
    let outline = read_outline(&config.inputs.outline)?.to_crs(landslide_crs);
    info!(
        crs = %landslide_crs,
        cols = landslide.cols(),
        rows = landslide.rows(),
        resolution_m = landslide.ground_resolution(),
        "loaded landslide"
    );

    let clipped = clip_to_outline(&landslide, &outline, &config.clip)?;
    let clipped_cells = clipped.valid_count(0);
    info!(
        cols = clipped.cols(),
        rows = clipped.rows(),
        valid = clipped_cells,
        "clipped landslide to outline"
    );

    // Background imagery and relief, both in the background's local zone
    let background = config
        .inputs
        .background
        .as_deref()
        .map(|path| load_local_utm(path, method))
        .transpose()?;
    let dem = match (&config.inputs.dem, &background) {
        (Some(path), Some(bg)) => Some(reproject(&read_geotiff(path)?, bg.crs(), Resampling::Bilinear)?),
        (Some(path), None) => Some(load_local_utm(path, Resampling::Bilinear)?),
        (None, _) => None,
    };
    let shade = dem
        .as_ref()
        .map(|dem| hillshade(dem, &config.render.hillshade))
        .transpose()?;

    let base = background.as_ref().or(dem.as_ref()).ok_or_else(|| {
        OverlayError::invalid("background", "<none>", "a background image or a DEM is required")
    })?;
    let frame_crs = base.crs();
    info!(crs = %frame_crs, cols = base.cols(), rows = base.rows(), "loaded background");

    let placement = plan_placement(
        config.placement.crown,
        config.placement.target,
        landslide_crs,
        frame_crs,
        config.placement.rotation_deg,
    );
    log_placement(&placement);

    if let Some(dir) = &config.output.previews {
        write_previews(dir, &landslide, &clipped, &outline, &mut written)?;
    }

    let extent = match config.render.frame {
        Frame::Background => base.bounds(),
        Frame::Landslide => pad_extent(
            placement.transformed_bounds(clipped.bounds()),
            config.render.padding_m,
        ),
    };
    let size = config.render.size;
    let canvas = Canvas::fit(extent, base.ground_resolution(), size.saturating_mul(SUPERSAMPLE));
    debug!(
        width = canvas.width,
        height = canvas.height,
        pixel_m = canvas.pixel_size,
        "canvas"
    );

    let mut img = render_background(&canvas, background.as_ref(), shade.as_ref(), &config.render);
    let painted = render_overlay(&mut img, &canvas, &clipped, &placement, &config.render);
    if painted == 0 {
        warn!("placed landslide falls entirely outside the frame");
    }

    let mut img = resize_to_fit(&img, size);
    let canvas = canvas.scaled(img.width(), img.height());
    if config.render.outline {
        draw_outline(&mut img, &canvas, &outline.placed(&placement, frame_crs));
    }
    if config.render.marker {
        draw_marker(&mut img, &canvas, placement.target());
    }
    let scale_bar_m = config
        .render
        .scale_bar
        .then(|| draw_scale_bar(&mut img, &canvas))
        .filter(|len| *len > 0.0);
    if let Some(len) = scale_bar_m {
        info!(length_m = len, "scale bar");
    }

    let dimensions = img.dimensions();
    let image_path = config.output.image_path();
    save_rgb(img, &image_path)?;
    info!(path = %image_path.display(), width = dimensions.0, height = dimensions.1, "saved overlay");
    written.insert(0, image_path.clone());

    if let Some(path) = &config.output.placed_geotiff {
        let mut placed = clipped.clone();
        placed.set_transform(clipped.transform().placed(&placement));
        placed.set_crs(frame_crs);
        write_geotiff(&placed, path)?;
        info!(path = %path.display(), crs = %frame_crs, "exported placed landslide");
        written.push(path.clone());
    }

    Ok(Summary {
        landslide_crs,
        frame_crs,
        crown_xy: placement.crown(),
        target_xy: placement.target(),
        rotation_deg: placement.rotation_deg(),
        clipped_cells,
        image: image_path,
        dimensions,
        scale_bar_m,
        written,
    })
}

fn log_placement(placement: &Placement) {
    let (cx, cy) = placement.crown();
    let (tx, ty) = placement.target();
    let (dx, dy) = placement.offset();
    info!(
        crown_x = cx,
        crown_y = cy,
        target_x = tx,
        target_y = ty,
        rotation_deg = placement.rotation_deg(),
        "placement"
    );
    debug!(dx, dy, matrix = ?placement.matrix(), "placement offset");
}
