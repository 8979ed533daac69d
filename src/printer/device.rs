//! # Printer Device
//!
//! High-level operations on one connected printer: queries, settings and
//! complete print jobs. Everything goes through a [`Session`], so any
//! [`Link`] implementation works.
//!
//! ## Example
//!
//! ```no_run
//! use mxprint::printer::{Printer, config::Darkness};
//! use mxprint::protocol::JobSettings;
//! use mxprint::render::pipeline::PipelineOptions;
//! use mxprint::transport::RfcommLink;
//!
//! # async fn run() -> mxprint::error::Result<()> {
//! let mut printer = Printer::new(RfcommLink::new(), "48:0F:57:12:34:56");
//! printer.connect().await?;
//! printer.ensure_ready().await?;
//!
//! let png = std::fs::read("cat.png")?;
//! let settings = JobSettings {
//!     energy: Darkness::MAX.concentration(),
//!     ..JobSettings::default()
//! };
//! printer.print_image(&png, &PipelineOptions::default(), &settings).await?;
//! printer.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{MxError, Result};
use crate::printer::config::PrinterProfile;
use crate::protocol::commands::{self, JobSettings};
use crate::protocol::status::{decode_serial, decode_status, PrinterStatus};
use crate::render::pipeline::{self, PipelineOptions};
use crate::render::text::{self, TextOptions};
use crate::render::Raster;
use crate::transport::{Link, Session};

/// A V5G-family printer reached over a [`Link`].
pub struct Printer<L: Link> {
    session: Session<L>,
    profile: PrinterProfile,
}

impl<L: Link> Printer<L> {
    pub fn new(link: L, address: impl Into<String>) -> Self {
        Self::from_session(Session::new(link, address))
    }

    /// Wrap an already-configured session.
    pub fn from_session(session: Session<L>) -> Self {
        Self {
            session,
            profile: PrinterProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: PrinterProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn profile(&self) -> &PrinterProfile {
        &self.profile
    }

    pub fn session(&self) -> &Session<L> {
        &self.session
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Query and decode the status byte.
    pub async fn status(&mut self) -> Result<PrinterStatus> {
        let response = self.session.request(&commands::get_status()).await?;
        let status = decode_status(&response)?;
        tracing::info!("printer status: {}", status);
        Ok(status)
    }

    /// Fail with [`MxError::NotReady`] unless the printer reports no faults.
    pub async fn ensure_ready(&mut self) -> Result<PrinterStatus> {
        let status = self.status().await?;
        if !status.is_ready() {
            return Err(MxError::NotReady(status.faults().join(", ")));
        }
        Ok(status)
    }

    pub async fn serial_number(&mut self) -> Result<String> {
        let response = self.session.request(&commands::get_serial()).await?;
        let serial = decode_serial(&response)?;
        tracing::info!("serial number: {}", serial);
        Ok(serial)
    }

    pub async fn set_speed(&mut self, speed: u8) -> Result<()> {
        tracing::debug!("setting speed to {}", speed);
        self.session.send(&commands::set_speed(speed)).await
    }

    pub async fn set_concentration(&mut self, value: u16) -> Result<()> {
        tracing::debug!("setting concentration to {}", value);
        self.session.send(&commands::set_concentration(value)).await
    }

    pub async fn feed(&mut self, lines: u16) -> Result<()> {
        tracing::info!("feeding {} lines", lines);
        self.session.send(&commands::feed_paper(lines)).await
    }

    /// Run label-gap calibration and return the printer's raw answer.
    pub async fn calibrate_label(&mut self) -> Result<Vec<u8>> {
        if !self.profile.supports_labels {
            return Err(MxError::Validation(format!(
                "{} printers do not support label calibration",
                self.profile.name
            )));
        }
        tracing::info!("calibrating label gap");
        self.session.request(&commands::label_calibrate()).await
    }

    /// Stream a complete job for `raster`.
    pub async fn print_raster(&mut self, raster: &Raster, settings: &JobSettings) -> Result<()> {
        let frames = commands::print_job(raster, settings)?;
        let bytes = commands::frames_to_bytes(&frames);
        tracing::info!(
            "printing {} rows ({} frames, {} bytes)",
            raster.height(),
            frames.len(),
            bytes.len()
        );
        self.session.stream(&bytes).await?;
        tracing::info!("print job sent");
        Ok(())
    }

    /// Check readiness, set the feed speed, then stream the job.
    ///
    /// Darkness travels inside the job as its energy frame; no separate
    /// concentration write is sent.
    pub async fn run_job(&mut self, raster: &Raster, settings: &JobSettings, speed: u8) -> Result<()> {
        self.ensure_ready().await?;
        self.set_speed(speed).await?;
        self.print_raster(raster, settings).await
    }

    /// Decode, prepare and print an image file's bytes.
    pub async fn print_image(
        &mut self,
        source: &[u8],
        options: &PipelineOptions,
        settings: &JobSettings,
    ) -> Result<()> {
        let raster = pipeline::preprocess(source, options)?;
        self.print_raster(&raster, settings).await
    }

    /// Print a pre-converted 1-bit image that is already full width.
    pub async fn print_raw(&mut self, source: &[u8], settings: &JobSettings) -> Result<()> {
        let raster = pipeline::preprocess_raw(source)?;
        self.print_raster(&raster, settings).await
    }

    pub async fn print_text(
        &mut self,
        body: &str,
        options: &TextOptions,
        settings: &JobSettings,
    ) -> Result<()> {
        let raster = text::preprocess_text(body, options)?;
        self.print_raster(&raster, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Answers every notification request from a script.
    #[derive(Default)]
    struct ScriptedLink {
        written: Vec<u8>,
        responses: VecDeque<Vec<u8>>,
    }

    #[async_trait]
    impl Link for ScriptedLink {
        async fn connect(&mut self, _address: &str) -> Result<()> {
            Ok(())
        }
        async fn write(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }
        async fn subscribe(&mut self) -> Result<()> {
            Ok(())
        }
        async fn next_notification(&mut self) -> Result<Vec<u8>> {
            match self.responses.pop_front() {
                Some(r) => Ok(r),
                None => std::future::pending().await,
            }
        }
        async fn unsubscribe(&mut self) -> Result<()> {
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn status_response(byte: u8) -> Vec<u8> {
        vec![0x51, 0x78, 0xa3, 0x01, 0x03, 0x00, byte, 0x00, 0x00, 0xff]
    }

    async fn printer(responses: Vec<Vec<u8>>) -> Printer<ScriptedLink> {
        let link = ScriptedLink {
            responses: responses.into(),
            ..Default::default()
        };
        let session = Session::new(link, "test")
            .with_pacing(20, Duration::ZERO)
            .with_timeout(Duration::from_millis(50));
        let mut printer = Printer::from_session(session);
        printer.connect().await.unwrap();
        printer
    }

    #[tokio::test]
    async fn test_ensure_ready() {
        let mut p = printer(vec![status_response(0x00)]).await;
        assert!(p.ensure_ready().await.unwrap().is_ready());
        assert_eq!(
            p.session().link().written,
            commands::get_status().to_bytes()
        );
    }

    #[tokio::test]
    async fn test_ensure_ready_reports_faults() {
        let mut p = printer(vec![status_response(0b1001)]).await;
        match p.ensure_ready().await {
            Err(MxError::NotReady(msg)) => {
                assert!(msg.contains("no paper"));
                assert!(msg.contains("low battery"));
            }
            other => panic!("expected NotReady, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_status_timeout() {
        let mut p = printer(vec![]).await;
        assert!(matches!(p.status().await, Err(MxError::Timeout(50))));
        assert!(p.session().is_connected());
    }

    #[tokio::test]
    async fn test_serial_number() {
        let mut response = vec![0x51, 0x78, 0xa8, 0x01, 0x06, 0x00];
        response.extend_from_slice(b"MX1101");
        response.extend_from_slice(&[0x00, 0xff]);
        let mut p = printer(vec![response]).await;
        assert_eq!(p.serial_number().await.unwrap(), "MX1101");
    }

    #[tokio::test]
    async fn test_feed_and_settings() {
        let mut p = printer(vec![]).await;
        p.set_speed(3).await.unwrap();
        p.feed(20).await.unwrap();

        let mut expected = commands::set_speed(3).to_bytes();
        expected.extend(commands::feed_paper(20).to_bytes());
        assert_eq!(p.session().link().written, expected);
    }

    #[tokio::test]
    async fn test_run_job_sequence() {
        let mut p = printer(vec![status_response(0x00)]).await;
        let raster = Raster::new(crate::printer::config::PRINT_WIDTH, 2);
        let settings = JobSettings {
            energy: 0x4000,
            extra_feed: 0,
        };
        p.run_job(&raster, &settings, 2).await.unwrap();

        let mut expected = commands::get_status().to_bytes();
        expected.extend(commands::set_speed(2).to_bytes());
        expected.extend(commands::frames_to_bytes(
            &commands::print_job(&raster, &settings).unwrap(),
        ));
        assert_eq!(p.session().link().written, expected);

        let concentration = commands::set_concentration(0x4000).to_bytes();
        let written = &p.session().link().written;
        assert!(!written.windows(concentration.len()).any(|w| w == concentration.as_slice()));
    }

    #[tokio::test]
    async fn test_run_job_stops_when_not_ready() {
        let mut p = printer(vec![status_response(0x01)]).await;
        let raster = Raster::new(crate::printer::config::PRINT_WIDTH, 1);
        assert!(matches!(
            p.run_job(&raster, &JobSettings::default(), 1).await,
            Err(MxError::NotReady(_))
        ));
        assert_eq!(p.session().link().written, commands::get_status().to_bytes());
    }

    #[tokio::test]
    async fn test_calibrate_requires_label_support() {
        let profile = PrinterProfile {
            supports_labels: false,
            ..PrinterProfile::V5G
        };
        let mut p = printer(vec![]).await.with_profile(profile);
        assert!(matches!(
            p.calibrate_label().await,
            Err(MxError::Validation(_))
        ));
        assert!(p.session().link().written.is_empty());
    }

    #[tokio::test]
    async fn test_print_raster_rejects_wrong_width() {
        let mut p = printer(vec![]).await;
        let raster = Raster::new(100, 2);
        assert!(matches!(
            p.print_raster(&raster, &JobSettings::default()).await,
            Err(MxError::Validation(_))
        ));
        assert!(p.session().link().written.is_empty());
    }
}
