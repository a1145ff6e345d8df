//! Page layout geometry
//!
//! Turns an image's pixel bounds into a page: physical size from the DPI
//! assumption, page orientation, fit or fill scaling, centering and an
//! optional rotation around the placement center.
//!
//! All distances are millimeters. Rectangles use a top-left origin with y
//! growing downwards; the PDF writer flips into PDF user space.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MM_PER_INCH: f64 = 25.4;
pub const DEFAULT_DPI: f64 = 600.0;
pub const DEFAULT_MARGIN_MM: f64 = 10.0;

const ANGLE_EPSILON: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Image has zero width or height")]
    InvalidImageDimensions,
    #[error("{0}")]
    InvalidConfiguration(String),
}

/// image bounds in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// size on paper when printed at `dpi`
    pub fn to_physical(self, dpi: f64) -> PhysicalSize {
        PhysicalSize {
            width_mm: self.width as f64 * MM_PER_INCH / dpi,
            height_mm: self.height as f64 * MM_PER_INCH / dpi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Standard paper sizes, always described in portrait
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Custom { width_mm: f64, height_mm: f64 },
}

impl PageSize {
    pub fn dimensions_mm(self) -> (f64, f64) {
        match self {
            PageSize::A3 => (297.0, 420.0),
            PageSize::A4 => (210.0, 297.0),
            PageSize::A5 => (148.0, 210.0),
            PageSize::Letter => (215.9, 279.4),
            PageSize::Legal => (215.9, 355.6),
            PageSize::Custom {
                width_mm,
                height_mm,
            } => (width_mm, height_mm),
        }
    }

    pub fn dimensions_with_orientation(self, orientation: Orientation) -> (f64, f64) {
        let (w, h) = self.dimensions_mm();
        match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

impl FromStr for PageSize {
    type Err = String;

    /// named size ("a4", "letter") or custom "WIDTHxHEIGHT" in mm
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "a3" => return Ok(PageSize::A3),
            "a4" => return Ok(PageSize::A4),
            "a5" => return Ok(PageSize::A5),
            "letter" => return Ok(PageSize::Letter),
            "legal" => return Ok(PageSize::Legal),
            _ => {}
        }
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Unknown page size {s:?} (expected a3, a4, a5, letter, legal or WxH in mm)"))?;
        let width_mm: f64 = w
            .trim()
            .parse()
            .map_err(|_| format!("Invalid page width {w:?}"))?;
        let height_mm: f64 = h
            .trim()
            .parse()
            .map_err(|_| format!("Invalid page height {h:?}"))?;
        Ok(PageSize::Custom {
            width_mm,
            height_mm,
        })
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::A3 => f.write_str("a3"),
            PageSize::A4 => f.write_str("a4"),
            PageSize::A5 => f.write_str("a5"),
            PageSize::Letter => f.write_str("letter"),
            PageSize::Legal => f.write_str("legal"),
            PageSize::Custom {
                width_mm,
                height_mm,
            } => write!(f, "{width_mm}x{height_mm}"),
        }
    }
}

impl TryFrom<String> for PageSize {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PageSize> for String {
    fn from(size: PageSize) -> Self {
        size.to_string()
    }
}

/// How the image is scaled onto the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitMode {
    /// whole image visible, touching the page edges
    #[default]
    Fit,
    /// whole image visible inside a uniform margin
    FitMargin,
    /// page fully covered, image may overflow
    Fill,
}

/// Rotation applied to every page of a run. Positive degrees turn clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RotationPolicy {
    #[default]
    Keep,
    Clockwise,
    Counterclockwise,
    Degrees(f64),
}

impl RotationPolicy {
    pub fn degrees(self) -> f64 {
        match self {
            RotationPolicy::Keep => 0.0,
            RotationPolicy::Clockwise => 90.0,
            RotationPolicy::Counterclockwise => -90.0,
            RotationPolicy::Degrees(d) => d,
        }
    }

    /// no visible rotation (0 or a whole number of turns)
    pub fn is_keep(self) -> bool {
        self.degrees().rem_euclid(360.0).abs() < ANGLE_EPSILON
            || (self.degrees().rem_euclid(360.0) - 360.0).abs() < ANGLE_EPSILON
    }

    /// rotation swaps the image's horizontal and vertical extent
    pub fn is_quarter_turn(self) -> bool {
        (self.degrees().rem_euclid(180.0) - 90.0).abs() < ANGLE_EPSILON
    }
}

impl FromStr for RotationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" | "none" | "0" => Ok(RotationPolicy::Keep),
            "cw" | "clockwise" => Ok(RotationPolicy::Clockwise),
            "ccw" | "counterclockwise" => Ok(RotationPolicy::Counterclockwise),
            other => other
                .parse::<f64>()
                .map(RotationPolicy::Degrees)
                .map_err(|_| format!("Invalid rotation {s:?} (expected keep, cw, ccw or degrees)")),
        }
    }
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationPolicy::Keep => f.write_str("keep"),
            RotationPolicy::Clockwise => f.write_str("cw"),
            RotationPolicy::Counterclockwise => f.write_str("ccw"),
            RotationPolicy::Degrees(d) => write!(f, "{d}"),
        }
    }
}

impl TryFrom<String> for RotationPolicy {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RotationPolicy> for String {
    fn from(rotation: RotationPolicy) -> Self {
        rotation.to_string()
    }
}

/// Everything the geometry calculator needs besides the image itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LayoutOptions {
    pub dpi: f64,
    pub page_size: PageSize,
    pub fit_mode: FitMode,
    /// margin on every side, only used by `FitMode::FitMargin`
    pub margin_mm: f64,
    pub rotation: RotationPolicy,
    /// switch to a landscape page for wide images
    pub auto_orient: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            page_size: PageSize::A4,
            fit_mode: FitMode::Fit,
            margin_mm: DEFAULT_MARGIN_MM,
            rotation: RotationPolicy::Keep,
            auto_orient: false,
        }
    }
}

impl LayoutOptions {
    pub fn validate(&self) -> Result<(), LayoutError> {
        let invalid = |msg: String| Err(LayoutError::InvalidConfiguration(msg));

        if !self.dpi.is_finite() || self.dpi <= 0.0 {
            return invalid(format!("DPI must be positive, got {}", self.dpi));
        }
        let (w, h) = self.page_size.dimensions_mm();
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return invalid(format!("Page size must be positive, got {w}x{h} mm"));
        }
        if !self.margin_mm.is_finite() || self.margin_mm < 0.0 {
            return invalid(format!("Margin must not be negative, got {} mm", self.margin_mm));
        }
        if self.fit_mode == FitMode::FitMargin && self.margin_mm * 2.0 >= w.min(h) {
            return invalid(format!(
                "Margin of {} mm leaves no room on a {w}x{h} mm page",
                self.margin_mm
            ));
        }
        if !self.rotation.degrees().is_finite() {
            return invalid("Rotation angle must be finite".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// rotation drawn around `pivot`, positive degrees clockwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub degrees: f64,
    pub pivot: Point,
}

impl Rotation {
    pub fn about_center(rect: &Rect, degrees: f64) -> Self {
        Self {
            degrees,
            pivot: rect.center(),
        }
    }
}

/// Final layout of one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width: f64,
    pub page_height: f64,
    pub orientation: Orientation,
    /// where the unrotated image is drawn
    pub placement: Rect,
    pub rotation: Option<Rotation>,
    /// physical image size to drawn size factor
    pub scale: f64,
}

/// Lay one image out on a page.
///
/// With auto-orientation and a quarter-turn rotation the image's extents are
/// swapped first, so orientation and scale are decided for the image as it
/// will appear once rotated. The recorded placement always keeps the
/// unrotated aspect ratio and is centered on the page.
pub fn compute_geometry(pixels: PixelSize, options: &LayoutOptions) -> Result<PageGeometry, LayoutError> {
    options.validate()?;
    if pixels.width == 0 || pixels.height == 0 {
        return Err(LayoutError::InvalidImageDimensions);
    }

    let physical = pixels.to_physical(options.dpi);
    let rotated_frame = options.auto_orient && options.rotation.is_quarter_turn();
    let (extent_w, extent_h) = if rotated_frame {
        (physical.height_mm, physical.width_mm)
    } else {
        (physical.width_mm, physical.height_mm)
    };

    let (portrait_w, _) = options.page_size.dimensions_mm();
    let orientation = if options.auto_orient && extent_w > extent_h && extent_w > portrait_w {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    };
    let (page_w, page_h) = options.page_size.dimensions_with_orientation(orientation);

    let scale = calculate_scale(
        extent_w,
        extent_h,
        page_w,
        page_h,
        options.fit_mode,
        options.margin_mm,
    );

    let draw_w = physical.width_mm * scale;
    let draw_h = physical.height_mm * scale;
    let placement = Rect::new((page_w - draw_w) / 2.0, (page_h - draw_h) / 2.0, draw_w, draw_h);

    let rotation = if options.rotation.is_keep() {
        None
    } else {
        Some(Rotation::about_center(&placement, options.rotation.degrees()))
    };

    Ok(PageGeometry {
        page_width: page_w,
        page_height: page_h,
        orientation,
        placement,
        rotation,
        scale,
    })
}

fn calculate_scale(
    src_width: f64,
    src_height: f64,
    page_width: f64,
    page_height: f64,
    mode: FitMode,
    margin_mm: f64,
) -> f64 {
    match mode {
        FitMode::Fit => (page_width / src_width).min(page_height / src_height),
        FitMode::FitMargin => {
            let avail_w = page_width - 2.0 * margin_mm;
            let avail_h = page_height - 2.0 * margin_mm;
            (avail_w / src_width).min(avail_h / src_height)
        }
        FitMode::Fill => (page_width / src_width).max(page_height / src_height),
    }
}
