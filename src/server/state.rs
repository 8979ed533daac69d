//! Server state and configuration.

use tokio::sync::Mutex;

use crate::config::Defaults;
use crate::printer::Printer;
use crate::transport::Link;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
    /// Printer MAC address or device path
    pub printer_address: String,
    /// Job defaults from the config file
    pub defaults: Defaults,
    /// Font used by `/print-text` when the request names none
    pub font: Option<String>,
}

/// Application state shared across handlers.
///
/// The printer sits behind a mutex: one request talks to it at a time and
/// each request opens and closes its own connection.
pub struct AppState<L: Link> {
    pub config: ServerConfig,
    pub printer: Mutex<Printer<L>>,
}

impl<L: Link> AppState<L> {
    pub fn new(config: ServerConfig, link: L) -> Self {
        let printer = Printer::new(link, config.printer_address.clone());
        Self::with_printer(config, printer)
    }

    pub fn with_printer(config: ServerConfig, printer: Printer<L>) -> Self {
        Self {
            config,
            printer: Mutex::new(printer),
        }
    }
}
