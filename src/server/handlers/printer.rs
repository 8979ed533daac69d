//! Printer query and paper-handling handlers.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::transport::Link;

use super::super::state::AppState;
use super::{finish, ApiError, JsonBody, Reply};

fn default_amount() -> u16 {
    10
}

/// Request body for `/feed`.
#[derive(Debug, Deserialize)]
pub struct FeedRequest {
    #[serde(default = "default_amount")]
    pub amount: u16,
}

/// POST /status - succeed only when the printer reports no faults.
pub async fn status<L: Link + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Reply>, ApiError> {
    let mut printer = state.printer.lock().await;
    printer.connect().await?;
    let result = printer.ensure_ready().await;
    finish(&mut *printer, result).await?;
    Ok(Reply::ok("Printer is ready"))
}

/// POST /serial
pub async fn serial<L: Link + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Reply>, ApiError> {
    let mut printer = state.printer.lock().await;
    printer.connect().await?;
    let result = printer.serial_number().await;
    let serial = finish(&mut *printer, result).await?;

    let Json(mut reply) = Reply::ok(format!("Serial number: {}", serial));
    reply.serial = Some(serial);
    Ok(Json(reply))
}

/// POST /feed - `{"amount": 10}`
pub async fn feed<L: Link + 'static>(
    State(state): State<Arc<AppState<L>>>,
    JsonBody(req): JsonBody<FeedRequest>,
) -> Result<Json<Reply>, ApiError> {
    let mut printer = state.printer.lock().await;
    printer.connect().await?;
    let result = printer.feed(req.amount).await;
    finish(&mut *printer, result).await?;
    Ok(Reply::ok(format!("Fed {} lines", req.amount)))
}

/// POST /calibrate
pub async fn calibrate<L: Link + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Reply>, ApiError> {
    let mut printer = state.printer.lock().await;
    printer.connect().await?;
    let result = printer.calibrate_label().await;
    finish(&mut *printer, result).await?;
    Ok(Reply::ok("Label calibration sent"))
}
