//! # AXIS-JTAG Driver Library
//!
//! This crate drives a JTAG chain that sits behind a word-oriented transport of limited
//! and variable capacity: a hardware FIFO, a UDP link, or an in-process emulator.
//!
//! ## Architecture
//!
//! The crate is built around three components:
//!
//! - **[`Transport`] Trait**: one-shot, word-level request/response exchange with a target.
//!   Implemented by the transports in [`transports`] and by dynamically loaded plugins.
//! - **[`registry::Registry`]**: maps transport names to factories, so the transport can be
//!   selected at runtime.
//! - **[`driver::Driver`]**: the protocol engine. It negotiates the target capabilities,
//!   reformats TMS/TDI bit vectors into word-interleaved requests and retries timed out
//!   exchanges, matching replies by transaction id.
//!
//! ## How It Works
//!
//! 1. The transport is created by name through the [`registry::Registry`]
//! 2. It is wrapped in a [`driver::Driver`], which queries the target once
//! 3. Each shift is packed into a request, sent, and the TDO reply is unpacked
//!
//! ## Basic Usage
//!
//! ```
//! use axis_jtag_driver::{driver::Driver, registry::Registry};
//!
//! let registry = Registry::with_builtin_transports();
//! let args = vec!["--word-size".to_string(), "8".to_string()];
//! let transport = registry.create("loopback", &args, None).unwrap();
//!
//! let mut driver = Driver::new(transport);
//! let params = driver.negotiate().unwrap();
//! assert_eq!(params.word_size, 8);
//!
//! // The loopback peer echoes TDI on TDO
//! let tdo = driver.shift(12, &[0x00, 0x00], &[0xa5, 0x0f]).unwrap();
//! assert_eq!(&tdo[..], &[0xa5, 0x0f]);
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::Result`]. Errors fall into four kinds (configuration,
//! system, protocol, timeout); only timeouts are retried, and only by the driver.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Session setup and transport
//! registration are logged at `info`, retries at `warn`, individual requests at
//! `debug` and raw vector contents at `trace`.
//!
//! ## Thread Model
//!
//! A driver serves exactly one session and blocks the caller for the duration of each
//! operation. Only the UDP loopback peer ([`emulator::UdpPeer`]) runs on its own thread.
pub mod driver;
pub mod emulator;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod transports;

use error::Result;

/// Trait that every transport must implement.
///
/// A transport moves one already framed request to the target and returns the reply.
/// It never retries on its own; retrying is the job of [`driver::Driver`].
pub trait Transport {
    /// Puts the transport into a known idle state. Must be idempotent.
    fn reset(&mut self) -> Result<()>;

    /// The fixed word size of the transport in bytes, if the hardware imposes one.
    ///
    /// The driver verifies that the target announces the same word size.
    fn word_size(&self) -> Option<usize>;

    /// Maximum number of bits per vector such that two vectors (TMS and TDI)
    /// plus one header word fit in a single frame.
    fn max_vector_bits(&self) -> u32;

    /// Performs exactly one request/response exchange.
    ///
    /// # Arguments
    ///
    /// * `request` - Header word plus payload
    /// * `header` - Receives the reply header; its length is the current word size
    /// * `data` - Receives the reply payload
    ///
    /// # Returns
    ///
    /// The number of payload bytes written into `data`. This may be less than
    /// `data.len()` for a short reply. Excess payload is discarded so that the next
    /// exchange starts clean.
    ///
    /// # Errors
    ///
    /// [`error::Error::Timeout`] if no reply arrives in time.
    fn transfer_once(&mut self, request: &[u8], header: &mut [u8], data: &mut [u8])
    -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn word_size(&self) -> Option<usize> {
        (**self).word_size()
    }

    fn max_vector_bits(&self) -> u32 {
        (**self).max_vector_bits()
    }

    fn transfer_once(
        &mut self,
        request: &[u8],
        header: &mut [u8],
        data: &mut [u8],
    ) -> Result<usize> {
        (**self).transfer_once(request, header, data)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn word_size(&self) -> Option<usize> {
        (**self).word_size()
    }

    fn max_vector_bits(&self) -> u32 {
        (**self).max_vector_bits()
    }

    fn transfer_once(
        &mut self,
        request: &[u8],
        header: &mut [u8],
        data: &mut [u8],
    ) -> Result<usize> {
        (**self).transfer_once(request, header, data)
    }
}
