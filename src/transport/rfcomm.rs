//! # RFCOMM Character-Device Link
//!
//! A [`Link`] over a Bluetooth serial device node such as `/dev/rfcomm0`.
//! Writes go straight to the device; notifications are whatever the printer
//! sends back, one read at a time.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must be paired and bound to an RFCOMM device first:
//!
//! ```bash
//! # 1. Find the printer's Bluetooth address
//! $ bluetoothctl
//! [bluetooth]# scan on
//! # Look for "MX11" or similar
//!
//! # 2. Pair and bind
//! [bluetooth]# pair 48:0F:57:XX:XX:XX
//! $ sudo rfcomm bind 0 48:0F:57:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! The address given to [`Link::connect`] may be either a MAC address, which
//! is resolved to the bound device, or a device path.
//!
//! ## TTY Configuration
//!
//! The device is opened in raw mode so binary frames pass unmodified:
//!
//! - **No input processing**: IGNBRK, BRKINT, PARMRK, ISTRIP, etc. cleared
//! - **No output processing**: OPOST cleared (no CR/LF translation)
//! - **8-bit characters**: CS8, no parity
//! - **Non-canonical, no echo**
//! - **Reads return after 100 ms** of silence (VMIN 0, VTIME 1)
//!
//! All file I/O runs on tokio's blocking pool. A read abandoned by a timed
//! out request stays attached to the link and is drained before the next
//! request, so it cannot steal that request's response.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::Link;
use crate::error::{MxError, Result};

/// Default RFCOMM device path
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Largest single read
const READ_BUFFER: usize = 256;

/// # RFCOMM Link
///
/// ## Example
///
/// ```no_run
/// use mxprint::transport::{RfcommLink, Session};
/// use mxprint::protocol::commands;
///
/// # async fn run() -> mxprint::error::Result<()> {
/// let mut session = Session::new(RfcommLink::new(), "/dev/rfcomm0");
/// session.connect().await?;
/// let response = session.request(&commands::get_status()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RfcommLink {
    device: Option<PathBuf>,
    file: Option<Arc<File>>,
    /// Read still running on the blocking pool.
    pending: Option<JoinHandle<Result<Vec<u8>>>>,
}

impl RfcommLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always open `device`, whatever address `connect` is given.
    pub fn with_device(device: impl Into<PathBuf>) -> Self {
        Self {
            device: Some(device.into()),
            ..Self::default()
        }
    }

    fn file(&self) -> Result<Arc<File>> {
        self.file
            .clone()
            .ok_or_else(|| MxError::Connection("link is not open".into()))
    }

    /// Wait out an abandoned read and throw its bytes away.
    async fn drain_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            match handle.await {
                Ok(Ok(stale)) if !stale.is_empty() => {
                    tracing::debug!("discarding {} stale bytes", stale.len());
                }
                Ok(Err(e)) => tracing::debug!("abandoned read failed: {}", e),
                _ => {}
            }
        }
    }

    /// Work out which device node to open for `address`.
    fn resolve(&self, address: &str) -> Result<PathBuf> {
        if let Some(device) = &self.device {
            return Ok(device.clone());
        }
        if is_valid_mac(address) {
            return match find_rfcomm_for_mac(address)? {
                Some(path) => Ok(PathBuf::from(path)),
                None => Err(MxError::Connection(format!(
                    "no RFCOMM device bound to {}; run `rfcomm bind 0 {}`",
                    address, address
                ))),
            };
        }
        if address.starts_with('/') {
            return Ok(PathBuf::from(address));
        }
        Err(MxError::Connection(format!(
            "'{}' is neither a MAC address nor a device path",
            address
        )))
    }
}

#[async_trait]
impl Link for RfcommLink {
    async fn connect(&mut self, address: &str) -> Result<()> {
        let path = self.resolve(address)?;
        let file = blocking(move || {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    MxError::Connection(format!("Failed to open {}: {}", path.display(), e))
                })?;
            configure_tty_raw(file.as_raw_fd())?;
            tracing::debug!("opened {}", path.display());
            Ok(file)
        })
        .await?;
        self.file = Some(Arc::new(file));
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file()?;
        let data = data.to_vec();
        blocking(move || {
            let mut f = &*file;
            f.write_all(&data)
                .and_then(|_| f.flush())
                .map_err(|e| MxError::Connection(format!("Write failed: {}", e)))
        })
        .await
    }

    async fn subscribe(&mut self) -> Result<()> {
        let file = self.file()?;
        self.drain_pending().await;
        // Drop anything the printer sent before this request.
        blocking(move || {
            let result = unsafe { libc::tcflush(file.as_raw_fd(), libc::TCIFLUSH) };
            if result != 0 {
                tracing::warn!("tcflush failed: {}", io::Error::last_os_error());
            }
            Ok(())
        })
        .await
    }

    async fn next_notification(&mut self) -> Result<Vec<u8>> {
        let file = self.file()?;
        loop {
            let handle = self
                .pending
                .get_or_insert_with(|| spawn_read(Arc::clone(&file)));
            let joined = handle.await;
            // Only a completed read is cleared; a cancelled wait keeps it.
            self.pending = None;
            let chunk = joined
                .map_err(|e| MxError::Connection(format!("I/O task failed: {}", e)))??;
            if !chunk.is_empty() {
                return Ok(chunk);
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.pending = None;
        self.file = None;
        Ok(())
    }
}

/// Start one read of up to [`READ_BUFFER`] bytes on the blocking pool.
fn spawn_read(file: Arc<File>) -> JoinHandle<Result<Vec<u8>>> {
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; READ_BUFFER];
        let n = (&*file)
            .read(&mut buf)
            .map_err(|e| MxError::Connection(format!("Read failed: {}", e)))?;
        buf.truncate(n);
        Ok(buf)
    })
}

/// Run blocking file I/O off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MxError::Connection(format!("I/O task failed: {}", e)))?
}

/// Configure a file descriptor for raw TTY mode with a 100 ms read timeout.
///
/// Note: IXON/IXOFF/IXANY disable XON/XOFF software flow control. 0x11 and
/// 0x13 appear freely in checksums and run-length tokens.
fn configure_tty_raw(fd: i32) -> Result<()> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(MxError::Connection(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    // Return whatever arrived after 100 ms
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 1;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(MxError::Connection(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

// ============================================================================
// RFCOMM LOOKUP
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Device path from one line of `/proc/net/rfcomm` or `rfcomm -a`, if the
/// line mentions `mac_upper`.
fn device_from_line(line: &str, mac_upper: &str) -> Option<String> {
    if !line.to_uppercase().contains(mac_upper) {
        return None;
    }
    let dev_name = line.split(':').next()?.trim();
    Some(format!("/dev/{}", dev_name))
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to the `rfcomm -a` command.
pub fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>> {
    let mac_upper = mac.to_uppercase();

    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        let found = contents
            .lines()
            .filter_map(|line| device_from_line(line, &mac_upper))
            .find(|path| Path::new(path).exists());
        if found.is_some() {
            return Ok(found);
        }
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| MxError::Connection(format!("Failed to run 'rfcomm -a': {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter_map(|line| device_from_line(line, &mac_upper))
        .find(|path| Path::new(path).exists()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_path() {
        assert_eq!(DEFAULT_DEVICE, "/dev/rfcomm0");
    }

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("48:0F:57:12:34:56"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("XX:XX:XX:XX:XX:XX")); // placeholder
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_device_from_line() {
        let line = "rfcomm0: 48:0F:57:12:34:56 channel 1 clean";
        assert_eq!(
            device_from_line(line, "48:0F:57:12:34:56"),
            Some("/dev/rfcomm0".to_string())
        );
        assert_eq!(device_from_line(line, "00:00:00:00:00:00"), None);
    }

    #[test]
    fn test_resolve_prefers_fixed_device() {
        let link = RfcommLink::with_device("/dev/rfcomm3");
        assert_eq!(
            link.resolve("48:0F:57:12:34:56").unwrap(),
            PathBuf::from("/dev/rfcomm3")
        );
    }

    #[test]
    fn test_resolve_device_path_and_garbage() {
        let link = RfcommLink::new();
        assert_eq!(
            link.resolve("/dev/rfcomm1").unwrap(),
            PathBuf::from("/dev/rfcomm1")
        );
        assert!(matches!(
            link.resolve("printer-please"),
            Err(MxError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_io_before_connect_fails() {
        let mut link = RfcommLink::new();
        assert!(matches!(
            link.write(&[0x51]).await,
            Err(MxError::Connection(_))
        ));
        assert!(link.next_notification().await.is_err());
        link.disconnect().await.unwrap();
    }

    /// A link over one end of a socket pair, standing in for the device.
    fn socket_link() -> (RfcommLink, std::os::unix::net::UnixStream) {
        use std::os::fd::OwnedFd;
        use std::os::unix::net::UnixStream;

        let (ours, printer) = UnixStream::pair().unwrap();
        let link = RfcommLink {
            file: Some(Arc::new(File::from(OwnedFd::from(ours)))),
            ..RfcommLink::default()
        };
        (link, printer)
    }

    #[tokio::test]
    async fn test_abandoned_read_does_not_steal_next_response() {
        let (mut link, mut printer) = socket_link();

        // Request times out while the read is still blocked
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            link.next_notification(),
        )
        .await;
        assert!(waited.is_err());
        assert!(link.pending.is_some());

        // Late answer to the abandoned request
        printer.write_all(b"late").unwrap();

        link.subscribe().await.unwrap();
        assert!(link.pending.is_none());

        printer.write_all(b"fresh").unwrap();
        assert_eq!(link.next_notification().await.unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_connect_missing_device() {
        let mut link = RfcommLink::new();
        let err = link.connect("/dev/mxprint-does-not-exist").await.unwrap_err();
        assert!(matches!(err, MxError::Connection(_)));
    }
}
