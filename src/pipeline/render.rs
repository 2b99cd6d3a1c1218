//! PDF rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! Rendering is blocking and CPU-bound; callers on an async runtime run it
//! inside `spawn_blocking` (see [`crate::extract`]).

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable pointing at a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Pages of one document, rendered in document order.
pub struct RenderedDocument {
    /// Page count of the whole document (before page selection).
    pub total_pages: usize,
    /// `(page_index_0based, image)` for every selected page.
    pub pages: Vec<(usize, DynamicImage)>,
}

/// Bind to a pdfium library.
///
/// Lookup order: `PDFIUM_LIB_PATH` (file or directory), the current working
/// directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    if let Ok(configured) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        let configured = PathBuf::from(configured);
        let lib = if configured.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&configured)
        } else {
            configured
        };
        debug!("Binding pdfium from {}={}", PDFIUM_LIB_PATH_ENV, lib.display());
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)));
    }

    let bindings = Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Rasterise the selected pages of a PDF into images.
pub fn render_pages(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<RenderedDocument, ExtractError> {
    let pdfium = bind_pdfium()?;
    let password = config.password.as_deref();

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ExtractError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ExtractError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            ExtractError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded. Number of pages: {}", total_pages);

    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(ExtractError::PageOutOfRange { total: total_pages });
    }

    let render_config = render_config(config.dpi, config.max_rendered_pixels);
    let mut rendered = Vec::with_capacity(page_indices.len());

    for idx in page_indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ExtractError::RasterisationFailed {
                page: idx,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ExtractError::RasterisationFailed {
                page: idx,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx,
            image.width(),
            image.height()
        );
        rendered.push((idx, image));
    }

    Ok(RenderedDocument {
        total_pages,
        pages: rendered,
    })
}

fn render_config(dpi: u32, max_pixels: Option<u32>) -> PdfRenderConfig {
    let config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
    match max_pixels {
        Some(px) => config
            .set_maximum_width(px as i32)
            .set_maximum_height(px as i32),
        None => config,
    }
}
