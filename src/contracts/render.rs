use crate::contracts::error::RenderError;

/// Physical page size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width_mm: 210.0,
        height_mm: 297.0,
    };
}

/// Turns a filled-in HTML page into a single-page PDF.
///
/// Layout fidelity is the rasterizer's business; callers only rely on
/// getting one page of `page` size back.
pub trait DocumentRasterizer: Send + Sync {
    fn rasterize(&self, html: &str, page: PageSize) -> Result<Vec<u8>, RenderError>;
}
