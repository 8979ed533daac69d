//! HTTP handlers for the server.
//!
//! Every JSON reply carries `success` and `message`. Failures add `kind`,
//! the stable name from [`MxError::kind`].

pub mod image;
pub mod printer;

use axum::{
    extract::{
        multipart::{Multipart, MultipartError},
        rejection::JsonRejection,
        FromRequest, Request,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

use crate::error::{MxError, Result};
use crate::printer::Printer;
use crate::transport::Link;

/// JSON reply body.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            kind: None,
            serial: None,
        })
    }
}

/// An [`MxError`] answered as a JSON failure.
#[derive(Debug)]
pub struct ApiError(pub MxError);

impl From<MxError> for ApiError {
    fn from(e: MxError) -> Self {
        ApiError(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError(MxError::Validation(format!("multipart error: {}", e)))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError(MxError::Validation(format!("invalid JSON body: {}", e.body_text())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MxError::Validation(_) | MxError::UnknownPreset { .. } | MxError::Image(_) => {
                StatusCode::BAD_REQUEST
            }
            MxError::NotReady(_) => StatusCode::CONFLICT,
            MxError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MxError::Connection(_) | MxError::Decode(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!("request failed: {}", self.0);
        let body = Reply {
            success: false,
            message: self.0.to_string(),
            kind: Some(self.0.kind()),
            serial: None,
        };
        (status, Json(body)).into_response()
    }
}

/// [`Json`] extractor whose rejection is a JSON failure reply.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Close the connection whatever happened, then hand back `result`.
pub(crate) async fn finish<L: Link, T>(printer: &mut Printer<L>, result: Result<T>) -> Result<T> {
    if let Err(e) = printer.disconnect().await {
        tracing::warn!("disconnect failed: {}", e);
    }
    result
}

/// Multipart upload split into the file field and plain text fields.
#[derive(Debug, Default)]
pub struct Upload {
    pub image: Option<Vec<u8>>,
    pub fields: HashMap<String, String>,
}

impl Upload {
    pub async fn read(mut multipart: Multipart) -> std::result::Result<Self, ApiError> {
        let mut upload = Upload::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            if name == "image" {
                upload.image = Some(field.bytes().await?.to_vec());
            } else {
                upload.fields.insert(name, field.text().await?);
            }
        }
        Ok(upload)
    }

    pub fn image(&self) -> Result<&[u8]> {
        self.image
            .as_deref()
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| MxError::Validation("no image data found".into()))
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parse a numeric field, falling back to `default` when absent.
    pub fn number<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.field(name) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| MxError::Validation(format!("invalid {} '{}'", name, raw))),
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.field(name), Some("1" | "true" | "on" | "yes"))
    }
}
