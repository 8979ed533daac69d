//! Image and text printing handlers.
//!
//! Image endpoints take `multipart/form-data` with an `image` file field
//! plus optional text fields:
//!
//! | Field | Meaning | Default |
//! |-------|---------|---------|
//! | `binarization` | dither algorithm name | `atkinson` |
//! | `threshold` | cut-off for `none` | 128 |
//! | `rotation` | degrees counter-clockwise | 0 |
//! | `contrast`, `brightness` | enhancement factors | 1.0 |
//! | `darkness` | preset or 0-100 (print only) | config concentration |
//! | `feed` | extra lines after the image (print only) | 15 |
//! | `raw` | send a 384-wide 1-bit image untouched (print only) | off |

use axum::{
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{MxError, Result};
use crate::printer::config::Darkness;
use crate::protocol::JobSettings;
use crate::render::dither::DitheringAlgorithm;
use crate::render::pipeline::{self, PipelineOptions};
use crate::render::text::{self, TextOptions};
use crate::render::{gray_to_png, Raster};
use crate::transport::Link;

use super::super::state::{AppState, ServerConfig};
use super::{finish, ApiError, JsonBody, Reply, Upload};

/// Dither used by the web form unless it asks for another.
const WEB_DITHER: DitheringAlgorithm = DitheringAlgorithm::Atkinson;

/// Extra feed after web prints.
const WEB_FEED: u16 = 15;

fn default_font_size() -> f32 {
    20.0
}

fn default_feed() -> u16 {
    WEB_FEED
}

/// Request body for `/print-text`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRequest {
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_feed")]
    pub feed: u16,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub darkness: Option<String>,
}

fn pipeline_options(upload: &Upload) -> Result<PipelineOptions> {
    let defaults = PipelineOptions::default();
    Ok(PipelineOptions {
        dither: upload
            .field("binarization")
            .or_else(|| upload.field("dither"))
            .map(DitheringAlgorithm::from_name)
            .unwrap_or(WEB_DITHER),
        threshold: upload.number("threshold", defaults.threshold)?,
        rotation: upload.number("rotation", defaults.rotation)?,
        contrast: upload.number("contrast", defaults.contrast)?,
        brightness: upload.number("brightness", defaults.brightness)?,
        ..defaults
    })
}

fn job_settings(config: &ServerConfig, darkness: Option<&str>, feed: u16) -> Result<JobSettings> {
    let energy = match darkness {
        Some(d) => Darkness::parse(d)?.concentration(),
        None => config.defaults.concentration,
    };
    Ok(JobSettings {
        energy,
        extra_feed: feed,
    })
}

/// Run CPU-heavy image work off the async runtime.
async fn render<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MxError::Image(format!("processing task failed: {}", e)))?
}

async fn print<L: Link>(state: &AppState<L>, raster: Raster, settings: JobSettings) -> Result<()> {
    let mut printer = state.printer.lock().await;
    printer.connect().await?;
    let result = printer.print_raster(&raster, &settings).await;
    finish(&mut *printer, result).await
}

/// POST /preview-image - the dithered image as PNG.
pub async fn preview_image(
    multipart: Multipart,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let upload = Upload::read(multipart).await?;
    let options = pipeline_options(&upload)?;
    let source = upload.image()?.to_vec();

    let png = render(move || {
        let raster = pipeline::preprocess(&source, &options)?;
        gray_to_png(&raster.to_gray())
    })
    .await?;

    tracing::debug!("preview with {} ({} bytes)", options.dither, png.len());
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// POST /print-image
pub async fn print_image<L: Link + 'static>(
    State(state): State<Arc<AppState<L>>>,
    multipart: Multipart,
) -> std::result::Result<Json<Reply>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let options = pipeline_options(&upload)?;
    let settings = job_settings(
        &state.config,
        upload.field("darkness"),
        upload.number("feed", WEB_FEED)?,
    )?;
    let raw = upload.flag("raw");
    let source = upload.image()?.to_vec();

    let raster = render(move || {
        if raw {
            pipeline::preprocess_raw(&source)
        } else {
            pipeline::preprocess(&source, &options)
        }
    })
    .await?;

    let rows = raster.height();
    print(&*state, raster, settings).await?;
    Ok(Reply::ok(format!("Image printed ({} rows)", rows)))
}

/// POST /print-text - `{"text": "...", "fontSize": 20, "feed": 15}`
pub async fn print_text<L: Link + 'static>(
    State(state): State<Arc<AppState<L>>>,
    JsonBody(req): JsonBody<TextRequest>,
) -> std::result::Result<Json<Reply>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(MxError::Validation("text cannot be empty".into()).into());
    }
    let settings = job_settings(&state.config, req.darkness.as_deref(), req.feed)?;
    let options = TextOptions {
        font: req.font.or_else(|| state.config.font.clone()),
        size: req.font_size,
        dither: WEB_DITHER,
        ..TextOptions::default()
    };
    let body = req.text;

    let raster = render(move || text::preprocess_text(&body, &options)).await?;

    print(&*state, raster, settings).await?;
    Ok(Reply::ok("Text printed successfully"))
}
