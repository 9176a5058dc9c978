//! Simulated target firmware.
//!
//! The [`Emulator`] answers requests the way the AXI-Stream to JTAG firmware does,
//! with a JTAG chain that loops TDI straight back to TDO. It backs the loopback
//! transports and can be served over UDP with [`UdpPeer`].
use std::{
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    thread::{self, JoinHandle},
};

use axis_jtag_protocol::{
    Capabilities, ControlWord, ErrorCode, HEADER_SIZE, VectorLayout, error::HeaderError,
};

use crate::driver::TestMode;
use crate::error::{Error, Result};

/// Largest datagram the UDP peer accepts.
const MAX_DATAGRAM: usize = 65536;

pub struct Emulator {
    capabilities: Capabilities,
    test_mode: TestMode,
    replies: u32,
}

impl Emulator {
    /// Creates a target with the given word size (bytes), memory depth (words)
    /// and TCK period.
    pub fn new(word_size: usize, memory_depth: u32, period_ns: Option<u32>) -> Result<Emulator> {
        Ok(Emulator {
            capabilities: Capabilities::new(word_size, memory_depth, period_ns)?,
            test_mode: TestMode::default(),
            replies: 0,
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// With [`TestMode::DROP_REPLIES`] set, every 256th reply is swallowed.
    pub fn set_test_mode(&mut self, flags: u32) {
        self.test_mode = TestMode::from_flags(flags);
    }

    pub fn test_mode(&self) -> TestMode {
        self.test_mode
    }

    /// Processes one request frame.
    ///
    /// Returns the reply frame, or `None` if the reply got dropped.
    pub fn handle(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let reply = self.process(request);
        if self.test_mode.drops_replies() {
            self.replies = self.replies.wrapping_add(1);
            if self.replies & 0xff == 0 {
                log::warn!("Emulator: dropping reply");
                return None;
            }
        }
        Some(reply)
    }

    fn process(&self, request: &[u8]) -> Vec<u8> {
        let ws = self.capabilities.word_size();
        let header = match ControlWord::read_header(request) {
            Ok(header) => header,
            Err(HeaderError::UnsupportedVersion(_)) => return self.error(ErrorCode::BadVersion),
            Err(HeaderError::OutOfRange { .. }) => return self.error(ErrorCode::Truncated),
            Err(_) => return self.error(ErrorCode::BadCommand),
        };
        log::trace!("Emulator: received {}", header);

        match header {
            ControlWord::Query(_) => self.header_frame(ControlWord::Query(self.capabilities)),
            ControlWord::Shift(shift) => {
                let layout = VectorLayout::new(shift.length(), ws);
                let depth = self.capabilities.memory_depth() as usize;
                if request.len() < layout.request_len() {
                    return self.error(ErrorCode::Truncated);
                }
                if depth > 0 && layout.words_per_vector() > depth {
                    return self.error(ErrorCode::Truncated);
                }
                let (_tms, tdi) = layout.unpack(&request[ws..]);
                let mut reply = self.header_frame(ControlWord::Shift(shift));
                reply.extend_from_slice(&tdi);
                reply.resize(reply.len() + layout.padded_byte_count() - tdi.len(), 0);
                reply
            }
            ControlWord::Error(_) => self.error(ErrorCode::BadCommand),
        }
    }

    fn error(&self, code: ErrorCode) -> Vec<u8> {
        log::debug!("Emulator: rejecting request ({})", code);
        self.header_frame(ControlWord::error(code))
    }

    fn header_frame(&self, word: ControlWord) -> Vec<u8> {
        let mut frame = vec![0; self.capabilities.word_size().max(HEADER_SIZE)];
        word.write_header(&mut frame);
        frame
    }
}

/// Serves an [`Emulator`] over UDP, one datagram per request.
pub struct UdpPeer {
    socket: UdpSocket,
    emulator: Emulator,
    rx_buf: Vec<u8>,
}

impl UdpPeer {
    pub fn bind(addr: impl ToSocketAddrs, emulator: Emulator) -> Result<UdpPeer> {
        let socket =
            UdpSocket::bind(addr).map_err(|e| Error::system("Unable to bind UDP peer", e))?;
        Ok(UdpPeer {
            socket,
            emulator,
            rx_buf: vec![0; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::system("Unable to get local address", e))
    }

    pub fn emulator(&self) -> &Emulator {
        &self.emulator
    }

    pub fn emulator_mut(&mut self) -> &mut Emulator {
        &mut self.emulator
    }

    /// Waits for one request and answers it.
    pub fn serve_one(&mut self) -> Result<()> {
        let (len, peer) = match self.socket.recv_from(&mut self.rx_buf) {
            Ok(received) => received,
            // a previous reply bounced off a closed port
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => return Ok(()),
            Err(e) => return Err(Error::system("Unable to receive request", e)),
        };
        log::trace!("UDP peer: {} bytes from {}", len, peer);
        if let Some(reply) = self.emulator.handle(&self.rx_buf[..len]) {
            self.socket
                .send_to(&reply, peer)
                .map_err(|e| Error::system("Unable to send reply", e))?;
        }
        Ok(())
    }

    /// Serves requests until an I/O error occurs.
    pub fn run(mut self) -> Result<()> {
        log::info!("UDP peer listening on {}", self.local_addr()?);
        loop {
            self.serve_one()?;
        }
    }

    /// Runs the peer on a background thread.
    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("udp-peer".to_string())
            .spawn(move || self.run())
            .map_err(|e| Error::system("Unable to launch UDP loopback thread", e))
    }
}
