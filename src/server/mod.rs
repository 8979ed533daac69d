//! # HTTP Server for Web Printing
//!
//! A small web form for printing images and text, plus the JSON endpoints
//! behind it.
//!
//! ## Usage
//!
//! ```bash
//! mxprint serve --listen 0.0.0.0:8080 --mac 48:0F:57:12:34:56
//! ```
//!
//! Then open http://localhost:8080 in a browser.
//!
//! ## Routes
//!
//! | Route | Body | Reply |
//! |-------|------|-------|
//! | `GET /` | | web form |
//! | `POST /status` | | JSON |
//! | `POST /serial` | | JSON with `serial` |
//! | `POST /preview-image` | multipart | `image/png` |
//! | `POST /print-image` | multipart | JSON |
//! | `POST /print-text` | JSON | JSON |
//! | `POST /feed` | JSON | JSON |
//! | `POST /calibrate` | | JSON |

mod handlers;
mod state;
mod static_files;

pub use state::{AppState, ServerConfig};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::{MxError, Result};
use crate::transport::{Link, RfcommLink};

/// Largest accepted upload.
const UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

/// Build the router over any link.
pub fn router<L: Link + 'static>(state: Arc<AppState<L>>) -> Router {
    Router::new()
        .route("/", get(static_files::index_handler))
        .route("/static/*path", get(static_files::asset_handler))
        .route("/status", post(handlers::printer::status::<L>))
        .route("/serial", post(handlers::printer::serial::<L>))
        .route("/feed", post(handlers::printer::feed::<L>))
        .route("/calibrate", post(handlers::printer::calibrate::<L>))
        .route(
            "/preview-image",
            post(handlers::image::preview_image).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route(
            "/print-image",
            post(handlers::image::print_image::<L>).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/print-text", post(handlers::image::print_text::<L>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on an RFCOMM link.
///
/// ## Example
///
/// ```no_run
/// use mxprint::config::Defaults;
/// use mxprint::server::{serve, ServerConfig};
///
/// # async fn example() -> mxprint::error::Result<()> {
/// let config = ServerConfig {
///     listen_addr: "0.0.0.0:8080".to_string(),
///     printer_address: "48:0F:57:12:34:56".to_string(),
///     defaults: Defaults::default(),
///     font: None,
/// };
///
/// serve(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve(config: ServerConfig) -> Result<()> {
    let listen_addr = config.listen_addr.clone();
    tracing::info!("printer: {}", config.printer_address);

    let state = Arc::new(AppState::new(config, RfcommLink::new()));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| MxError::Connection(format!("Failed to bind to {}: {}", listen_addr, e)))?;

    tracing::info!("listening on http://{}/", listen_addr);
    println!("mxprint web interface running at http://{}/", listen_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| MxError::Connection(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Defaults;
    use crate::protocol::commands;
    use crate::render::gray_to_png;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use image::{GrayImage, Luma};
    use std::collections::VecDeque;
    use tower::ServiceExt;

    #[derive(Default)]
    struct MockLink {
        written: Vec<u8>,
        responses: VecDeque<Vec<u8>>,
        connects: usize,
        disconnects: usize,
    }

    #[async_trait]
    impl Link for MockLink {
        async fn connect(&mut self, _address: &str) -> crate::error::Result<()> {
            self.connects += 1;
            Ok(())
        }
        async fn write(&mut self, data: &[u8]) -> crate::error::Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }
        async fn subscribe(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn next_notification(&mut self) -> crate::error::Result<Vec<u8>> {
            match self.responses.pop_front() {
                Some(r) => Ok(r),
                None => Err(MxError::Connection("no scripted response".into())),
            }
        }
        async fn unsubscribe(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn disconnect(&mut self) -> crate::error::Result<()> {
            self.disconnects += 1;
            Ok(())
        }
    }

    fn state(responses: Vec<Vec<u8>>) -> Arc<AppState<MockLink>> {
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".into(),
            printer_address: "48:0F:57:12:34:56".into(),
            defaults: Defaults::default(),
            font: None,
        };
        let link = MockLink {
            responses: responses.into(),
            ..Default::default()
        };
        let printer = crate::printer::Printer::from_session(
            crate::transport::Session::new(link, "48:0F:57:12:34:56")
                .with_pacing(512, std::time::Duration::ZERO),
        );
        Arc::new(AppState::with_printer(config, printer))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart(image: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
        let boundary = "mxprint-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    boundary, name, value
                )
                .into_bytes(),
            );
        }
        body.extend(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n",
                boundary
            )
            .into_bytes(),
        );
        body.extend_from_slice(image);
        body.extend(format!("\r\n--{}--\r\n", boundary).into_bytes());

        Request::builder()
            .method("POST")
            .uri("/preview-image")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn sample_png() -> Vec<u8> {
        let img = GrayImage::from_fn(96, 48, |x, _| Luma([if x < 48 { 0 } else { 255 }]));
        gray_to_png(&img).unwrap()
    }

    #[tokio::test]
    async fn test_index_page() {
        let app = router(state(vec![]));
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_ready() {
        let st = state(vec![vec![0x51, 0x78, 0xa3, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00, 0xff]]);
        let app = router(st.clone());
        let response = app
            .oneshot(Request::post("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);

        let printer = st.printer.lock().await;
        let link = printer.session().link();
        assert_eq!((link.connects, link.disconnects), (1, 1));
        assert_eq!(link.written, commands::get_status().to_bytes());
    }

    #[tokio::test]
    async fn test_status_fault_is_structured_failure() {
        let st = state(vec![vec![0x51, 0x78, 0xa3, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0xff]]);
        let response = router(st.clone())
            .oneshot(Request::post("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "not_ready");
        assert!(body["message"].as_str().unwrap().contains("no paper"));

        // Connection is closed even on failure
        let printer = st.printer.lock().await;
        assert_eq!(printer.session().link().disconnects, 1);
    }

    #[tokio::test]
    async fn test_feed() {
        let st = state(vec![]);
        let response = router(st.clone())
            .oneshot(
                Request::post("/feed")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"amount": 30}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Fed 30 lines");

        let printer = st.printer.lock().await;
        assert_eq!(
            printer.session().link().written,
            commands::feed_paper(30).to_bytes()
        );
    }

    #[tokio::test]
    async fn test_preview_returns_png() {
        let request = multipart(&sample_png(), &[("binarization", "bayer")]);
        let response = router(state(vec![])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (384, 192));
    }

    #[tokio::test]
    async fn test_preview_without_image() {
        let boundary = "b";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"binarization\"\r\n\r\nnone\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::post("/preview-image")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let response = router(state(vec![])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "validation");
    }

    #[tokio::test]
    async fn test_print_text_rejects_empty() {
        let response = router(state(vec![]))
            .oneshot(
                Request::post("/print-text")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text": "   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_print_text_streams_job() {
        let st = state(vec![]);
        let response = router(st.clone())
            .oneshot(
                Request::post("/print-text")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text": "hello", "darkness": "max"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let printer = st.printer.lock().await;
        let written = &printer.session().link().written;
        let (first, _) = commands::Frame::parse(written).unwrap();
        assert_eq!(first, commands::get_status());
        // energy frame follows status and quality
        let energy = commands::set_energy(150).to_bytes();
        assert!(written.windows(energy.len()).any(|w| w == energy.as_slice()));
    }

    async fn post_json(st: Arc<AppState<MockLink>>, uri: &str, body: &str) -> axum::response::Response {
        router(st)
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bad_json_is_structured_failure() {
        let cases = [
            ("/feed", "{not json"),
            ("/feed", r#"{"amount": 70000}"#),
            ("/print-text", r#"{"txt": 1}"#),
        ];
        for (uri, body) in cases {
            let st = state(vec![]);
            let response = post_json(st.clone(), uri, body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", uri, body);
            let reply = json_body(response).await;
            assert_eq!(reply["success"], false);
            assert_eq!(reply["kind"], "validation");
            assert!(reply["message"].as_str().unwrap().contains("invalid JSON body"));

            // Rejected before the printer is touched
            let printer = st.printer.lock().await;
            assert_eq!(printer.session().link().connects, 0);
        }
    }
}
