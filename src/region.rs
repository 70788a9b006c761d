//! Normalized regions, layer extents and interleaved/planar pixel copies.
//!
//! Hosts hand over pixels interleaved by pixel (`[y][x][c]`); the engine works
//! on planar buffers (`[c][y][x]`). Everything here is a plain strided copy.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Which host layers feed the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    NoInput,
    #[default]
    Active,
    All,
    ActiveAndBelow,
    ActiveAndAbove,
    AllVisible,
    AllInvisible,
}

/// Rectangle expressed as fractions of the image size.
///
/// All four components negative selects the whole image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRegion {
    pub const ENTIRE_IMAGE: Self = Self {
        x: -1.0,
        y: -1.0,
        width: -1.0,
        height: -1.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_entire_image(&self) -> bool {
        self.x < 0.0 && self.y < 0.0 && self.width < 0.0 && self.height < 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerExtent {
    pub width: i32,
    pub height: i32,
}

impl LayerExtent {
    pub const UNKNOWN: Self = Self {
        width: -1,
        height: -1,
    };

    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_known(&self) -> bool {
        self.width >= 0 && self.height >= 0
    }
}

impl Default for LayerExtent {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Integer pixel rectangle. Width or height at or below zero means empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Host-side pixels, channels interleaved per pixel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterleavedImage {
    pub width: usize,
    pub height: usize,
    pub spectrum: usize,
    pub data: Vec<f32>,
}

impl InterleavedImage {
    pub fn new(width: usize, height: usize, spectrum: usize) -> Self {
        Self {
            width,
            height,
            spectrum,
            data: vec![0.0; width * height * spectrum],
        }
    }

    pub fn from_data(
        width: usize,
        height: usize,
        spectrum: usize,
        data: Vec<f32>,
    ) -> Result<Self, FilterError> {
        check_len(width, height, spectrum, data.len())?;
        Ok(Self {
            width,
            height,
            spectrum,
            data,
        })
    }

    pub fn extent(&self) -> LayerExtent {
        LayerExtent::new(dimension(self.width), dimension(self.height))
    }

    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let start = (y * self.width + x) * self.spectrum;
        &self.data[start..start + self.spectrum]
    }
}

/// Engine-side pixels, one contiguous plane per channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanarImage {
    pub width: usize,
    pub height: usize,
    pub spectrum: usize,
    pub data: Vec<f32>,
}

impl PlanarImage {
    pub fn new(width: usize, height: usize, spectrum: usize) -> Self {
        Self {
            width,
            height,
            spectrum,
            data: vec![0.0; width * height * spectrum],
        }
    }

    pub fn from_data(
        width: usize,
        height: usize,
        spectrum: usize,
        data: Vec<f32>,
    ) -> Result<Self, FilterError> {
        check_len(width, height, spectrum, data.len())?;
        Ok(Self {
            width,
            height,
            spectrum,
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fails when `data` does not hold exactly `width * height * spectrum` samples.
    pub fn validate(&self) -> Result<(), FilterError> {
        check_len(self.width, self.height, self.spectrum, self.data.len())
    }

    pub fn plane(&self, channel: usize) -> &[f32] {
        let size = self.width * self.height;
        &self.data[channel * size..(channel + 1) * size]
    }
}

fn check_len(width: usize, height: usize, spectrum: usize, len: usize) -> Result<(), FilterError> {
    let expected = width.checked_mul(height).and_then(|plane| plane.checked_mul(spectrum));
    if expected != Some(len) {
        let expected = expected.map_or_else(|| "too many".to_owned(), |count| count.to_string());
        return Err(FilterError::mismatch(format!(
            "{width}x{height}x{spectrum} image needs {expected} samples, got {len}"
        )));
    }
    Ok(())
}

fn dimension(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Host callback reporting the size of the layers selected by `mode`.
pub trait LayerHost {
    fn layers_extent(&self, mode: InputMode) -> LayerExtent;
}

/// Whole pixels covering `region` inside `extent`.
///
/// The size gets one extra pixel over the rounded-up fraction and is clamped
/// to what remains of the extent past the origin.
pub fn resolve_region(region: NormalizedRegion, extent: LayerExtent) -> PixelRect {
    if region.is_entire_image() {
        return PixelRect {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        };
    }
    let (x, width) = resolve_axis(region.x, region.width, extent.width);
    let (y, height) = resolve_axis(region.y, region.height, extent.height);
    PixelRect {
        x,
        y,
        width,
        height,
    }
}

fn resolve_axis(origin: f64, size: f64, full: i32) -> (i32, i32) {
    let full_f = f64::from(full);
    // Float casts saturate; the sums stay in i64 so extreme inputs cannot wrap.
    let start = (origin * full_f).floor() as i64;
    let span = ((size * full_f).ceil() as i64).saturating_add(1);
    let span = span.min(i64::from(full).saturating_sub(start));
    (clamp_to_i32(start), clamp_to_i32(span))
}

fn clamp_to_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Copy `rect` out of an interleaved image into a planar one.
///
/// The rectangle is clipped to the source first.
pub fn copy_planar_region(source: &InterleavedImage, rect: PixelRect) -> PlanarImage {
    let x0 = rect.x.max(0) as usize;
    let y0 = rect.y.max(0) as usize;
    let x1 = (i64::from(rect.x) + i64::from(rect.width)).clamp(0, source.width as i64) as usize;
    let y1 = (i64::from(rect.y) + i64::from(rect.height)).clamp(0, source.height as i64) as usize;
    if x1 <= x0 || y1 <= y0 || source.spectrum == 0 {
        return PlanarImage::default();
    }

    let (width, height, spectrum) = (x1 - x0, y1 - y0, source.spectrum);
    let mut planar = PlanarImage::new(width, height, spectrum);
    for c in 0..spectrum {
        for y in 0..height {
            let row = c * width * height + y * width;
            for x in 0..width {
                planar.data[row + x] =
                    source.data[((y0 + y) * source.width + (x0 + x)) * spectrum + c];
            }
        }
    }
    planar
}

/// Write a planar image back into `destination` from its origin.
///
/// Width, height and channel count are each clamped to the smaller of the two
/// images; anything outside the overlap is left untouched. Either image
/// holding the wrong number of samples is a mismatch, and nothing is written.
pub fn write_back_planar_region(
    planar: &PlanarImage,
    destination: &mut InterleavedImage,
) -> Result<(), FilterError> {
    planar.validate()?;
    check_len(
        destination.width,
        destination.height,
        destination.spectrum,
        destination.data.len(),
    )?;
    let width = planar.width.min(destination.width);
    let height = planar.height.min(destination.height);
    let spectrum = planar.spectrum.min(destination.spectrum);
    let plane = planar.width * planar.height;
    for c in 0..spectrum {
        for y in 0..height {
            let row = c * plane + y * planar.width;
            for x in 0..width {
                destination.data[(y * destination.width + x) * destination.spectrum + c] =
                    planar.data[row + x];
            }
        }
    }
    Ok(())
}

/// Resolves regions against a cached layer extent.
///
/// The host is asked again only when the input mode changes, after
/// [`RegionResolver::clear_cache`], or while a dimension is still unknown.
#[derive(Debug, Default)]
pub struct RegionResolver {
    mode: Option<InputMode>,
    extent: LayerExtent,
}

impl RegionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extent<H: LayerHost + ?Sized>(&mut self, mode: InputMode, host: &H) -> LayerExtent {
        if self.mode == Some(mode) && self.extent.is_known() {
            return self.extent;
        }
        self.extent = host.layers_extent(mode);
        self.mode = Some(mode);
        debug!(
            "layer extent for {mode:?}: {}x{}",
            self.extent.width, self.extent.height
        );
        self.extent
    }

    pub fn clear_cache(&mut self) {
        self.mode = None;
        self.extent = LayerExtent::UNKNOWN;
    }

    /// `NoInput` selects no pixels at all and never queries the host.
    pub fn resolve<H: LayerHost + ?Sized>(
        &mut self,
        region: NormalizedRegion,
        mode: InputMode,
        host: &H,
    ) -> PixelRect {
        if mode == InputMode::NoInput {
            return PixelRect::default();
        }
        resolve_region(region, self.extent(mode, host))
    }
}
