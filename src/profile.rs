//! Publication profile and page bound calculations

use serde::Serialize;

/// Simple length type in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length(pub f64);

impl Length {
    /// Create a length from millimeters
    pub fn from_mm(mm: f64) -> Self {
        Length(mm)
    }

    /// Create a length from inches
    pub fn from_inches(inches: f64) -> Self {
        Length(inches * 25.4)
    }

    /// Get the value in millimeters
    pub fn mm(&self) -> f64 {
        self.0
    }

    /// Get the value in points (1/72 inch)
    pub fn pt(&self) -> f64 {
        self.0 * 72.0 / 25.4
    }

    /// Get the value in pixels at the given resolution
    pub fn px(&self, dpi: f64) -> f64 {
        self.0 / 25.4 * dpi
    }
}

/// Page dimensions
#[derive(Debug, Clone, Copy)]
pub struct PageDimensions {
    pub width: Length,
    pub height: Length,
}

impl PageDimensions {
    /// US Letter size (8.5" × 11")
    pub fn letter() -> Self {
        Self {
            width: Length::from_inches(8.5),
            height: Length::from_inches(11.0),
        }
    }

    /// A4 size (210mm × 297mm)
    pub fn a4() -> Self {
        Self {
            width: Length::from_mm(210.0),
            height: Length::from_mm(297.0),
        }
    }
}

/// Page or raster orientation, derived from its dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Width strictly greater than height is landscape; squares are portrait.
    pub fn of(width: f32, height: f32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// A width/height ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bound {
    pub width: f32,
    pub height: f32,
}

impl Bound {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// The bound that applies to content of the given orientation.
    ///
    /// Bounds are stored portrait; landscape content is measured against the
    /// rotated ceiling.
    pub fn oriented(&self, orientation: Orientation) -> Bound {
        match orientation {
            Orientation::Portrait => *self,
            Orientation::Landscape => Bound::new(self.height, self.width),
        }
    }

    /// Whether `width × height` exceeds this bound (after orienting it) by more
    /// than `tolerance` on either axis.
    pub fn is_exceeded_by(&self, width: f32, height: f32, tolerance: f32) -> bool {
        let bound = self.oriented(Orientation::of(width, height));
        width > bound.width + tolerance || height > bound.height + tolerance
    }
}

/// The target constraints every asset must satisfy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceProfile {
    /// Portrait page width ceiling in points
    pub max_page_width_pt: f32,
    /// Portrait page height ceiling in points
    pub max_page_height_pt: f32,
    /// Slack allowed on page measurements before a page counts as oversized
    pub tolerance_pt: f32,
    /// Resolution used to relate the page bound to raster pixels
    pub reference_dpi: f32,
    /// Portrait raster width ceiling in pixels
    pub max_raster_width_px: u32,
    /// Portrait raster height ceiling in pixels
    pub max_raster_height_px: u32,
    /// Whether every asset must be single-channel
    pub require_grayscale: bool,
    /// Ceiling on visible assets in the working directory
    pub max_asset_count: usize,
}

impl ComplianceProfile {
    /// Build a profile from a page size, deriving the raster bound at `dpi`.
    pub fn from_page(page: PageDimensions, tolerance_pt: f32, dpi: f32, max_asset_count: usize) -> Self {
        Self {
            max_page_width_pt: page.width.pt().round() as f32,
            max_page_height_pt: page.height.pt().round() as f32,
            tolerance_pt,
            reference_dpi: dpi,
            max_raster_width_px: page.width.px(dpi as f64).round() as u32,
            max_raster_height_px: page.height.px(dpi as f64).round() as u32,
            require_grayscale: true,
            max_asset_count,
        }
    }

    /// The publication profile: US Letter, 1pt tolerance, 300 DPI, grayscale,
    /// at most 100 assets.
    pub fn publication() -> Self {
        Self::from_page(PageDimensions::letter(), 1.0, 300.0, 100)
    }

    /// Re-derive the raster bound from the page bound at a new resolution.
    pub fn with_reference_dpi(mut self, dpi: f32) -> Self {
        self.reference_dpi = dpi;
        self.max_raster_width_px = (self.max_page_width_pt / 72.0 * dpi).round() as u32;
        self.max_raster_height_px = (self.max_page_height_pt / 72.0 * dpi).round() as u32;
        self
    }

    /// Portrait page bound in points
    pub fn page_bound(&self) -> Bound {
        Bound::new(self.max_page_width_pt, self.max_page_height_pt)
    }

    /// Portrait raster bound in pixels
    pub fn raster_bound(&self) -> Bound {
        Bound::new(self.max_raster_width_px as f32, self.max_raster_height_px as f32)
    }
}

impl Default for ComplianceProfile {
    fn default() -> Self {
        Self::publication()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_conversions() {
        let len = Length::from_inches(1.0);
        assert!((len.mm() - 25.4).abs() < 0.01);
        assert!((len.pt() - 72.0).abs() < 0.01);
        assert!((len.px(300.0) - 300.0).abs() < 0.01);
    }

    #[test]
    fn test_letter_is_larger_than_a4_in_width() {
        let letter = PageDimensions::letter();
        let a4 = PageDimensions::a4();
        assert!(letter.width.pt() > a4.width.pt());
    }

    #[test]
    fn test_publication_profile_constants() {
        let profile = ComplianceProfile::publication();
        assert_eq!(profile.max_page_width_pt, 612.0);
        assert_eq!(profile.max_page_height_pt, 792.0);
        assert_eq!(profile.tolerance_pt, 1.0);
        assert_eq!(profile.max_raster_width_px, 2550);
        assert_eq!(profile.max_raster_height_px, 3300);
        assert!(profile.require_grayscale);
        assert_eq!(profile.max_asset_count, 100);
    }

    #[test]
    fn test_with_reference_dpi() {
        let profile = ComplianceProfile::publication().with_reference_dpi(150.0);
        assert_eq!(profile.max_raster_width_px, 1275);
        assert_eq!(profile.max_raster_height_px, 1650);
    }

    #[test]
    fn test_bound_is_orientation_aware() {
        let bound = ComplianceProfile::publication().page_bound();

        // Letter landscape fits the rotated ceiling
        assert!(!bound.is_exceeded_by(792.0, 612.0, 1.0));
        // Within tolerance
        assert!(!bound.is_exceeded_by(612.5, 792.9, 1.0));
        // Portrait too tall
        assert!(bound.is_exceeded_by(612.0, 800.0, 1.0));
        // Landscape too wide for the rotated ceiling
        assert!(bound.is_exceeded_by(1000.0, 600.0, 1.0));
        // Landscape too tall for the rotated ceiling
        assert!(bound.is_exceeded_by(700.0, 650.0, 1.0));
    }

    #[test]
    fn test_square_is_portrait() {
        assert_eq!(Orientation::of(500.0, 500.0), Orientation::Portrait);
        assert_eq!(Orientation::of(501.0, 500.0), Orientation::Landscape);
    }
}
