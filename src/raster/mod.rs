//! Raster color normalization and standalone raster assets

pub mod file;
pub mod normalize;

pub use file::{audit_raster, fit_within, fix_raster, RasterAudit, RasterFix, RasterFormat};
pub use normalize::{
    Conversion, FallbackPolicy, GrayRaster, RasterColorNormalizer, RawRaster,
};
