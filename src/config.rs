//! Run configuration, loaded from TOML and patched by command-line flags

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clip::ClipOptions;
use crate::error::{OverlayError, Result};
use crate::geometry::LatLon;
use crate::render::{Frame, RenderOptions};

/// Default file name of the composite when none is configured
pub const DEFAULT_IMAGE: &str = "landslide_overlay.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub inputs: InputsConfig,
    pub placement: PlacementConfig,
    #[serde(default)]
    pub clip: ClipOptions,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Landslide raster (GeoTIFF)
    pub landslide: PathBuf,
    /// Background imagery (GeoTIFF)
    pub background: Option<PathBuf>,
    /// Elevation model for hillshading (GeoTIFF)
    pub dem: Option<PathBuf>,
    /// Landslide outline (KML, shapefile or GeoJSON)
    pub outline: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Crown of the landslide, `[lat, lon]`
    pub crown: LatLon,
    /// Where the crown lands on the background, `[lat, lon]`
    pub target: LatLon,
    /// Counter-clockwise rotation about the crown, in degrees
    #[serde(default)]
    pub rotation_deg: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub image: Option<PathBuf>,
    /// Directory for the outline previews
    pub previews: Option<PathBuf>,
    /// Where to export the placed landslide as GeoTIFF
    pub placed_geotiff: Option<PathBuf>,
}

impl OutputConfig {
    pub fn image_path(&self) -> PathBuf {
        self.image.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE))
    }
}

/// Values given on the command line; every `Some` wins over the file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub landslide: Option<PathBuf>,
    pub background: Option<PathBuf>,
    pub dem: Option<PathBuf>,
    pub outline: Option<PathBuf>,
    pub crown: Option<LatLon>,
    pub target: Option<LatLon>,
    pub rotation_deg: Option<f64>,
    pub clip_padding_m: Option<f64>,
    pub no_mask: bool,
    pub frame: Option<Frame>,
    pub padding_m: Option<f64>,
    pub size: Option<u32>,
    pub output: Option<PathBuf>,
    pub previews: Option<PathBuf>,
    pub placed_geotiff: Option<PathBuf>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build a configuration from flags alone
    pub fn from_overrides(overrides: &Overrides) -> Result<Self> {
        fn required<T: Clone>(value: &Option<T>, name: &'static str) -> Result<T> {
            value
                .clone()
                .ok_or_else(|| OverlayError::invalid(name, "<missing>", "required without --config"))
        }

        let mut config = Config {
            inputs: InputsConfig {
                landslide: required(&overrides.landslide, "landslide")?,
                background: None,
                dem: None,
                outline: required(&overrides.outline, "outline")?,
            },
            placement: PlacementConfig {
                crown: required(&overrides.crown, "crown")?,
                target: required(&overrides.target, "target")?,
                rotation_deg: 0.0,
            },
            clip: ClipOptions::default(),
            render: RenderOptions::default(),
            output: OutputConfig::default(),
        };
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, o: &Overrides) {
        if let Some(v) = &o.landslide {
            self.inputs.landslide = v.clone();
        }
        if let Some(v) = &o.background {
            self.inputs.background = Some(v.clone());
        }
        if let Some(v) = &o.dem {
            self.inputs.dem = Some(v.clone());
        }
        if let Some(v) = &o.outline {
            self.inputs.outline = v.clone();
        }
        if let Some(v) = o.crown {
            self.placement.crown = v;
        }
        if let Some(v) = o.target {
            self.placement.target = v;
        }
        if let Some(v) = o.rotation_deg {
            self.placement.rotation_deg = v;
        }
        if let Some(v) = o.clip_padding_m {
            self.clip.padding_m = v;
        }
        if o.no_mask {
            self.clip.mask = false;
        }
        if let Some(v) = o.frame {
            self.render.frame = v;
        }
        if let Some(v) = o.padding_m {
            self.render.padding_m = v;
        }
        if let Some(v) = o.size {
            self.render.size = v;
        }
        if let Some(v) = &o.output {
            self.output.image = Some(v.clone());
        }
        if let Some(v) = &o.previews {
            self.output.previews = Some(v.clone());
        }
        if let Some(v) = &o.placed_geotiff {
            self.output.placed_geotiff = Some(v.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.background.is_none() && self.inputs.dem.is_none() {
            return Err(OverlayError::invalid(
                "background",
                "<none>",
                "a background image or a DEM is required",
            ));
        }
        for (name, coord) in [("crown", self.placement.crown), ("target", self.placement.target)] {
            if !coord.is_valid() {
                return Err(OverlayError::invalid(name, coord, "latitude/longitude out of range"));
            }
        }
        if !self.placement.rotation_deg.is_finite() {
            return Err(OverlayError::invalid("rotation_deg", self.placement.rotation_deg, "must be finite"));
        }
        if !(self.clip.padding_m >= 0.0) {
            return Err(OverlayError::invalid("clip.padding_m", self.clip.padding_m, "must be >= 0"));
        }

        let render = &self.render;
        if render.size == 0 {
            return Err(OverlayError::invalid("render.size", render.size, "must be positive"));
        }
        if !(render.padding_m >= 0.0) {
            return Err(OverlayError::invalid("render.padding_m", render.padding_m, "must be >= 0"));
        }
        if !(0.0..=1.0).contains(&render.opacity) {
            return Err(OverlayError::invalid("render.opacity", render.opacity, "must be in 0..=1"));
        }

        let shade = &render.hillshade;
        if !(0.0..=1.0).contains(&shade.blend) {
            return Err(OverlayError::invalid("hillshade.blend", shade.blend, "must be in 0..=1"));
        }
        if !(0.0..=90.0).contains(&shade.altitude) {
            return Err(OverlayError::invalid("hillshade.altitude", shade.altitude, "must be in 0..=90"));
        }
        if !(shade.z_factor > 0.0) {
            return Err(OverlayError::invalid("hillshade.z_factor", shade.z_factor, "must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::Resampling;

    const MINIMAL: &str = r#"
[inputs]
landslide = "iliamna.tif"
background = "fairbanks.tif"
outline = "iliamna.kml"

[placement]
crown = [60.0319, -153.0906]
target = [64.8378, -147.7164]
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.inputs.landslide, PathBuf::from("iliamna.tif"));
        assert_eq!(config.inputs.dem, None);
        assert_eq!(config.placement.crown, LatLon::new(60.0319, -153.0906));
        assert_eq!(config.placement.rotation_deg, 0.0);
        assert_eq!(config.clip, ClipOptions::default());
        assert_eq!(config.render, RenderOptions::default());
        assert_eq!(config.output.image_path(), PathBuf::from(DEFAULT_IMAGE));
        config.validate().unwrap();
    }

    #[test]
    fn test_full_config() {
        let text = format!(
            "{}{}",
            MINIMAL,
            r#"
[clip]
padding_m = 25.0
mask = false

[render]
frame = "landslide"
size = 1024
opacity = 0.8
resampling = "bilinear"

[render.hillshade]
azimuth = 270.0
blend = 0.3

[output]
image = "out.jpg"
placed_geotiff = "placed.tif"
"#
        );
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.clip.padding_m, 25.0);
        assert!(!config.clip.mask);
        assert_eq!(config.render.frame, Frame::Landslide);
        assert_eq!(config.render.size, 1024);
        assert_eq!(config.render.resampling, Resampling::Bilinear);
        assert_eq!(config.render.hillshade.azimuth, 270.0);
        assert_eq!(config.render.hillshade.altitude, 45.0);
        assert_eq!(config.output.image_path(), PathBuf::from("out.jpg"));
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_section_is_error() {
        let err = Config::from_toml_str("[inputs]\nlandslide = \"a.tif\"\n").unwrap_err();
        assert!(matches!(err, OverlayError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = Config::from_toml_str(MINIMAL).unwrap();

        let mut no_background = base.clone();
        no_background.inputs.background = None;
        assert!(no_background.validate().is_err());
        no_background.inputs.dem = Some(PathBuf::from("dem.tif"));
        assert!(no_background.validate().is_ok());

        let mut bad = base.clone();
        bad.render.opacity = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = base.clone();
        bad.placement.target = LatLon::new(95.0, 0.0);
        assert!(bad.validate().is_err());

        let mut bad = base;
        bad.render.size = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.apply_overrides(&Overrides {
            rotation_deg: Some(30.0),
            no_mask: true,
            size: Some(512),
            output: Some(PathBuf::from("x.png")),
            ..Default::default()
        });
        assert_eq!(config.placement.rotation_deg, 30.0);
        assert!(!config.clip.mask);
        assert_eq!(config.render.size, 512);
        assert_eq!(config.output.image_path(), PathBuf::from("x.png"));
        assert_eq!(config.inputs.landslide, PathBuf::from("iliamna.tif"));
    }

    #[test]
    fn test_from_overrides_requires_inputs() {
        let mut overrides = Overrides {
            landslide: Some(PathBuf::from("a.tif")),
            outline: Some(PathBuf::from("a.kml")),
            crown: Some(LatLon::new(60.0, -153.0)),
            ..Default::default()
        };
        assert!(Config::from_overrides(&overrides).is_err());

        overrides.target = Some(LatLon::new(64.8, -147.7));
        overrides.dem = Some(PathBuf::from("dem.tif"));
        let config = Config::from_overrides(&overrides).unwrap();
        assert_eq!(config.inputs.dem, Some(PathBuf::from("dem.tif")));
        config.validate().unwrap();
    }
}
