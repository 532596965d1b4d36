//! PDF rasterisation: render every page of every input to a `DynamicImage`.
//!
//! The models read the statements as page images. pdfium does the
//! rendering inside `spawn_blocking`, since its C library keeps thread-local
//! state and would stall a Tokio worker for the length of the render.
//!
//! The longest page edge is capped at `max_rendered_pixels`. Statements are
//! A4 text, so 1568 px keeps 8-point table figures legible while staying
//! inside the provider's image budget.

use crate::config::GeneratorConfig;
use crate::error::BilancioError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One rendered page.
#[derive(Debug)]
pub struct RenderedPage {
    /// 0-based index of the source document in the input list.
    pub document: usize,
    /// 1-based page number within that document.
    pub page: usize,
    pub image: DynamicImage,
}

/// Rasterise all pages of `paths`, in input order.
///
/// Fails with [`BilancioError::TooManyPages`] before rendering anything when
/// the documents hold more than `config.max_document_pages` pages together.
pub async fn render_documents(
    paths: Vec<PathBuf>,
    config: &GeneratorConfig,
) -> Result<Vec<RenderedPage>, BilancioError> {
    let max_pixels = config.max_rendered_pixels;
    let max_pages = config.max_document_pages;

    tokio::task::spawn_blocking(move || render_documents_blocking(&paths, max_pixels, max_pages))
        .await
        .map_err(|e| BilancioError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_documents_blocking(
    paths: &[PathBuf],
    max_pixels: u32,
    max_pages: usize,
) -> Result<Vec<RenderedPage>, BilancioError> {
    let pdfium = load_pdfium()?;

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| map_load_error(path, e))?;
        documents.push((path, document));
    }

    let total: usize = documents.iter().map(|(_, d)| d.pages().len() as usize).sum();
    if total > max_pages {
        return Err(BilancioError::TooManyPages {
            total,
            max: max_pages,
        });
    }
    info!("Rendering {} pages from {} document(s)", total, documents.len());

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(total);
    for (doc_idx, (path, document)) in documents.iter().enumerate() {
        for (page_idx, page) in document.pages().iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                BilancioError::RasterisationFailed {
                    path: path.to_path_buf(),
                    page: page_idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered {} page {} → {}x{} px",
                path.display(),
                page_idx + 1,
                image.width(),
                image.height()
            );

            results.push(RenderedPage {
                document: doc_idx,
                page: page_idx + 1,
                image,
            });
        }
    }

    Ok(results)
}

/// Bind to pdfium: `PDFIUM_DYNAMIC_LIB_PATH`, then the executable's
/// directory, then the system library search path.
fn load_pdfium() -> Result<Pdfium, BilancioError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            BilancioError::PdfiumBindingFailed(format!("{path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| BilancioError::PdfiumBindingFailed(format!("{e}")))?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(path: &Path, e: PdfiumError) -> BilancioError {
    let detail = format!("{:?}", e);
    if detail.to_lowercase().contains("password") {
        BilancioError::PasswordRequired {
            path: path.to_path_buf(),
        }
    } else {
        BilancioError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}
