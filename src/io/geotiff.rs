//! GeoTIFF reading and writing on top of the `tiff` crate.
//!
//! Georeferencing comes from ModelPixelScale (33550) + ModelTiepoint
//! (33922) or ModelTransformation (34264); the CRS from the
//! GeoKeyDirectory (34735); nodata from GDAL_NODATA (42113).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use crate::crs::Crs;
use crate::error::{OverlayError, Result};
use crate::raster::{GeoTransform, Raster};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;

const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Resolves to the named variant when the `tiff` crate knows the tag
fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a GeoTIFF file into a [`Raster`], one `f64` band per sample
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let raster = decode_geotiff(BufReader::new(file))?;
    debug!(
        path = %path.display(),
        cols = raster.cols(),
        rows = raster.rows(),
        bands = raster.band_count(),
        crs = %raster.crs(),
        "read GeoTIFF"
    );
    Ok(raster)
}

/// Decode a GeoTIFF from any `Read + Seek` source
pub fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<Raster> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let (cols, rows) = (width as usize, height as usize);

    let mut transform = read_geotransform(&mut decoder)?;
    let geokeys = read_geokeys(&mut decoder)?;
    let crs = geokeys.crs()?;
    if geokeys.is_pixel_is_point() {
        // Tiepoints name cell centres; move the origin to the cell corner
        let (origin_x, origin_y) = transform.apply(-0.5, -0.5);
        transform.origin_x = origin_x;
        transform.origin_y = origin_y;
    }
    let nodata = read_nodata(&mut decoder)?;

    let samples = decoding_result_to_f64(decoder.read_image()?)?;
    let cells = rows * cols;
    if cells == 0 || samples.len() % cells != 0 {
        return Err(OverlayError::UnsupportedData(format!(
            "{} samples do not divide into {}x{} pixels",
            samples.len(),
            cols,
            rows
        )));
    }

    // Chunky (pixel-interleaved) layout
    let band_count = samples.len() / cells;
    let mut bands = vec![Vec::with_capacity(cells); band_count];
    for pixel in samples.chunks_exact(band_count) {
        for (band, &value) in bands.iter_mut().zip(pixel) {
            let is_nodata = nodata.is_some_and(|nd| value == nd);
            band.push(if is_nodata { f64::NAN } else { value });
        }
    }

    Raster::new(bands, rows, cols, transform, crs)
}

fn decoding_result_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(OverlayError::UnsupportedData(
                "unsupported TIFF sample format".to_string(),
            ))
        }
    };
    Ok(values)
}

fn read_f64_tag<R: Read + Seek>(decoder: &mut Decoder<R>, tag: u16) -> Result<Option<Vec<f64>>> {
    Ok(match decoder.find_tag(geo_tag(tag))? {
        Some(value) => Some(value.into_f64_vec()?),
        None => None,
    })
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    let scale = read_f64_tag(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = read_f64_tag(decoder, MODEL_TIEPOINT)?;

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    // Row-major 4x4 matrix; the first two rows carry the affine terms
    if let Some(t) = read_f64_tag(decoder, MODEL_TRANSFORMATION)? {
        if t.len() >= 16 {
            return Ok(GeoTransform {
                origin_x: t[3],
                origin_y: t[7],
                pixel_width: t[0],
                pixel_height: t[5],
                row_rotation: t[1],
                col_rotation: t[4],
            });
        }
    }

    Err(OverlayError::UnsupportedData(
        "TIFF has no georeferencing tags".to_string(),
    ))
}

/// The GeoKeyDirectory entries this reader understands
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct GeoKeys {
    model_type: Option<u16>,
    raster_type: Option<u16>,
    projected: Option<u16>,
    geographic: Option<u16>,
}

impl GeoKeys {
    fn crs(&self) -> Result<Crs> {
        if let Some(code) = self.projected {
            return Crs::try_from_epsg(code as u32);
        }
        if self.model_type == Some(MODEL_TYPE_GEOGRAPHIC) || self.model_type.is_none() {
            if let Some(code) = self.geographic {
                return Crs::try_from_epsg(code as u32);
            }
        }

        Err(OverlayError::UnsupportedCrs(format!(
            "GeoKeyDirectory without a supported EPSG code (model type {:?})",
            self.model_type
        )))
    }

    fn is_pixel_is_point(&self) -> bool {
        self.raster_type == Some(RASTER_PIXEL_IS_POINT)
    }
}

fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoKeys> {
    let keys = match decoder.find_tag(geo_tag(GEO_KEY_DIRECTORY))? {
        Some(value) => value.into_u16_vec()?,
        None => {
            return Err(OverlayError::UnsupportedCrs(
                "TIFF has no GeoKeyDirectory".to_string(),
            ))
        }
    };

    // Header: [version, revision, minor, count], then count x [id, location, count, value]
    if keys.len() < 4 {
        return Err(OverlayError::UnsupportedCrs("truncated GeoKeyDirectory".to_string()));
    }
    let count = keys[3] as usize;

    let mut geokeys = GeoKeys::default();
    for entry in keys[4..].chunks_exact(4).take(count) {
        // Location 0 means the value is stored inline
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            GT_MODEL_TYPE => geokeys.model_type = Some(entry[3]),
            GT_RASTER_TYPE => geokeys.raster_type = Some(entry[3]),
            PROJECTED_CS_TYPE => geokeys.projected = Some(entry[3]),
            GEOGRAPHIC_TYPE => geokeys.geographic = Some(entry[3]),
            _ => {}
        }
    }

    Ok(geokeys)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    Ok(match decoder.find_tag(geo_tag(GDAL_NODATA))? {
        Some(value) => value.into_string()?.trim_end_matches('\0').trim().parse::<f64>().ok(),
        None => None,
    })
}

/// Write the first band of a raster as a Float32 GeoTIFF with NaN nodata
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    encode_geotiff(raster, BufWriter::new(file))?;
    debug!(path = %path.display(), "wrote GeoTIFF");
    Ok(())
}

/// Encode the first band of a raster as GeoTIFF into any `Write + Seek` sink
pub fn encode_geotiff<W: Write + Seek>(raster: &Raster, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let data: Vec<f32> = raster.band(0).iter().map(|&v| v as f32).collect();
    let mut image = encoder.new_image::<Gray32Float>(raster.cols() as u32, raster.rows() as u32)?;

    let gt = raster.transform();
    if gt.is_north_up() {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image.encoder().write_tag(geo_tag(MODEL_PIXEL_SCALE), &scale[..])?;
        image.encoder().write_tag(geo_tag(MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image.encoder().write_tag(geo_tag(MODEL_TRANSFORMATION), &matrix[..])?;
    }

    let crs = raster.crs();
    let (model_type, crs_key) = match crs {
        Crs::Geographic => (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE),
        Crs::Utm { .. } => (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE),
    };
    let geokeys: [u16; 16] = [
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, crs.epsg() as u16,
    ];
    image.encoder().write_tag(geo_tag(GEO_KEY_DIRECTORY), &geokeys[..])?;
    image.encoder().write_tag(geo_tag(GDAL_NODATA), "nan")?;

    image.write_data(&data)?;
    Ok(())
}
