//! Bordereau rendering: per-kind HTML templates filled from slip data.
//!
//! Turning the filled page into a PDF is delegated to a
//! [`DocumentRasterizer`]; this module only guarantees the HTML it hands over.
//! The HTTP surface serves HTML only (`/slips/:kind/:id/document`). Embedders
//! that bring their own rasterizer call [`DocumentRenderer::render_pdf`].

mod fields;
mod template;

use std::path::{Path, PathBuf};

pub use fields::{bordereau_fields, BordereauContext};
pub use template::render_template;

use crate::contracts::{DocumentRasterizer, PageSize, RenderError, SlipKind};

/// Template file name for each slip kind.
pub fn template_name(kind: SlipKind) -> &'static str {
    match kind {
        SlipKind::Transport => "cmr.html",
        SlipKind::Freight => "affretement.html",
    }
}

/// Loads templates from a directory and fills them in.
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    template_dir: PathBuf,
}

impl DocumentRenderer {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
        }
    }

    /// Reads `BORDEREAU_TEMPLATE_DIR` (default: `./templates`).
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("BORDEREAU_TEMPLATE_DIR").unwrap_or_else(|_| "./templates".into()),
        )
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn template_path(&self, kind: SlipKind) -> PathBuf {
        self.template_dir.join(template_name(kind))
    }

    fn load_template(&self, kind: SlipKind) -> Result<String, RenderError> {
        let path = self.template_path(kind);
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                RenderError::TemplateNotFound(path.display().to_string())
            }
            _ => RenderError::Io(format!("{}: {}", path.display(), e)),
        })
    }

    /// Fills the slip's template and returns the HTML.
    pub fn render_html(&self, ctx: &BordereauContext<'_>) -> Result<String, RenderError> {
        let template = self.load_template(ctx.slip.kind)?;
        let values = bordereau_fields(ctx);
        Ok(render_template(&template, &values))
    }

    /// Fills the template and rasterizes it onto one A4 page.
    ///
    /// Library entry point; the server binary ships no rasterizer.
    pub fn render_pdf<R: DocumentRasterizer + ?Sized>(
        &self,
        rasterizer: &R,
        ctx: &BordereauContext<'_>,
    ) -> Result<Vec<u8>, RenderError> {
        let html = self.render_html(ctx)?;
        let pdf = rasterizer.rasterize(&html, PageSize::A4)?;
        tracing::debug!(
            kind = %ctx.slip.kind,
            number = %ctx.slip.number,
            bytes = pdf.len(),
            "Rendered bordereau PDF"
        );
        Ok(pdf)
    }
}
