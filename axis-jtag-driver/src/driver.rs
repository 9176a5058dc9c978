use std::fmt::Display;

use axis_jtag_protocol::{
    ControlWord, HEADER_SIZE, MAX_SHIFT_BITS, MAX_WORD_SIZE, VectorLayout, Xid, XidGenerator,
};

use crate::Transport;
use crate::error::{Error, Result};

/// Retry budget used for targets that buffer requests.
pub const DEFAULT_RETRIES: u32 = 5;

/// Initial size of the request buffer. It grows once the target is queried.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Retries after a timeout, for targets with a non-zero memory depth.
    pub retries: u32,
    /// Initial request buffer size in bytes.
    pub buffer_size: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Builder to create a [Driver] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use axis_jtag_driver::driver::Builder;
///
/// let driver = Builder::new()
///     .retries(3)
///     .buffer_size(4096)
///     .build(my_transport);
/// ```
#[derive(Default)]
pub struct Builder {
    config: DriverConfig,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the number of retries after a timed out exchange.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the initial size of the request buffer.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Build and return the driver
    pub fn build<T: Transport>(self, transport: T) -> Driver<T> {
        Driver::with_config(transport, self.config)
    }
}

/// Target parameters learned during negotiation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TargetParameters {
    /// Transfer granularity in bytes
    pub word_size: usize,
    /// Target buffer capacity in words; zero means streaming
    pub memory_depth: u32,
    /// TCK period, if the target knows it
    pub period_ns: Option<u32>,
}

/// Test flags, see [`Driver::set_test_mode`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TestMode {
    drop_replies: bool,
}

impl TestMode {
    /// Pretend that every 256th reply got lost.
    pub const DROP_REPLIES: u32 = 1 << 0;

    pub fn from_flags(flags: u32) -> TestMode {
        TestMode {
            drop_replies: flags & Self::DROP_REPLIES != 0,
        }
    }

    pub fn drops_replies(&self) -> bool {
        self.drop_replies
    }
}

/// Negotiated parameters, for operator visibility.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverInfo {
    pub word_size: usize,
    pub memory_depth_bytes: usize,
    pub max_vector_bytes: usize,
    pub period_ns: Option<u32>,
}

impl Display for DriverInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Word size:                  {}", self.word_size)?;
        writeln!(f, "Target Memory Depth (bytes) {}", self.memory_depth_bytes)?;
        writeln!(f, "Max. Vector Length  (bytes) {}", self.max_vector_bytes)?;
        match self.period_ns {
            Some(period) => write!(f, "TCK Period             (ns) {}", period),
            None => write!(f, "TCK Period             (ns) unknown"),
        }
    }
}

/// The protocol engine for one session with a target.
///
/// Call [`negotiate`](Driver::negotiate) once before shifting.
pub struct Driver<T: Transport> {
    transport: T,
    config: DriverConfig,
    params: TargetParameters,
    retries: u32,
    xids: XidGenerator,
    tx_buf: Vec<u8>,
    hdr_buf: [u8; MAX_WORD_SIZE],
    test_mode: TestMode,
    drop_counter: u32,
    debug: u32,
}

impl<T: Transport> Driver<T> {
    pub fn new(transport: T) -> Driver<T> {
        Driver::with_config(transport, DriverConfig::default())
    }

    pub fn with_config(transport: T, config: DriverConfig) -> Driver<T> {
        let tx_buf = vec![0; config.buffer_size.max(MAX_WORD_SIZE)];
        Driver {
            transport,
            retries: config.retries,
            config,
            // until the target tells otherwise, a word is one control word
            params: TargetParameters {
                word_size: HEADER_SIZE,
                memory_depth: 1,
                period_ns: None,
            },
            xids: XidGenerator::new(),
            tx_buf,
            hdr_buf: [0; MAX_WORD_SIZE],
            test_mode: TestMode::default(),
            drop_counter: 0,
            debug: 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn parameters(&self) -> TargetParameters {
        self.params
    }

    /// Current retry budget. Zero for streaming targets.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Current size of the request buffer in bytes.
    pub fn buffer_size(&self) -> usize {
        self.tx_buf.len()
    }

    pub fn set_test_mode(&mut self, flags: u32) {
        self.test_mode = TestMode::from_flags(flags);
        log::debug!("Test mode set to {:?}", self.test_mode);
    }

    pub fn test_mode(&self) -> TestMode {
        self.test_mode
    }

    /// Above level 1, every packed vector word is traced.
    pub fn set_debug_level(&mut self, level: u32) {
        self.debug = level;
    }

    pub fn debug_level(&self) -> u32 {
        self.debug
    }

    /// Queries the target and sizes the internal buffers accordingly.
    ///
    /// May be called again; all parameters are re-derived from the new reply.
    pub fn negotiate(&mut self) -> Result<TargetParameters> {
        self.transport.reset()?;

        let ws = self.params.word_size;
        ControlWord::query().write_header(&mut self.tx_buf[..ws]);
        log::debug!("Sending query");
        let (_, reply) = self.transfer_reliable(ws, &mut [])?;
        let caps = reply.capabilities()?;

        if caps.word_size() < HEADER_SIZE {
            return Err(Error::protocol(format!(
                "Received invalid word size {}",
                caps.word_size()
            )));
        }
        if let Some(fixed) = self.transport.word_size()
            && fixed != caps.word_size()
        {
            return Err(Error::config(format!(
                "Firmware misconfigured: transport word size {} /= target word size {}",
                fixed,
                caps.word_size()
            )));
        }

        self.params = TargetParameters {
            word_size: caps.word_size(),
            memory_depth: caps.memory_depth(),
            period_ns: caps.period_ns(),
        };
        log::info!(
            "Query result: word_size={}, memory_depth={}, period_ns={:?}",
            self.params.word_size,
            self.params.memory_depth,
            self.params.period_ns
        );

        // Without buffering on the target side a lost reply cannot be recovered
        self.retries = if self.params.memory_depth == 0 {
            0
        } else {
            self.config.retries
        };

        let largest_request = (2 * self.params.memory_depth as usize + 1) * self.params.word_size;
        self.grow_buffer(largest_request);
        Ok(self.params)
    }

    /// Longest vector a single shift may carry, in bits.
    pub fn max_vector_bits(&self) -> u32 {
        let mut max = self.transport.max_vector_bits().min(MAX_SHIFT_BITS);
        if self.params.memory_depth > 0 {
            let target_bits = self.params.memory_depth as usize * self.params.word_size * 8;
            max = max.min(u32::try_from(target_bits).unwrap_or(u32::MAX));
        }
        max
    }

    /// Negotiates the TCK period.
    ///
    /// A request of `0` only queries. If the target period is unknown, the request
    /// is echoed back; otherwise the target's fixed period is returned.
    pub fn set_tck(&self, period_ns: u32) -> u32 {
        match (period_ns, self.params.period_ns) {
            (0, current) => current.unwrap_or(0),
            (requested, None) => requested,
            (_, Some(current)) => current,
        }
    }

    pub fn info(&self) -> DriverInfo {
        DriverInfo {
            word_size: self.params.word_size,
            memory_depth_bytes: self.params.memory_depth as usize * self.params.word_size,
            max_vector_bytes: self.max_vector_bits().div_ceil(8) as usize,
            period_ns: self.params.period_ns,
        }
    }

    /// Shifts `num_bits` of `tms` and `tdi` and returns the captured TDO bits.
    ///
    /// `tms` and `tdi` must hold at least ⌈num_bits / 8⌉ bytes.
    /// The returned vector is exactly that long.
    pub fn shift(&mut self, num_bits: u32, tms: &[u8], tdi: &[u8]) -> Result<Box<[u8]>> {
        let mut tdo = vec![0; num_bits.div_ceil(8) as usize].into_boxed_slice();
        self.shift_into(num_bits, tms, tdi, &mut tdo)?;
        Ok(tdo)
    }

    /// Like [`shift`](Driver::shift), but writes TDO into a caller supplied buffer.
    pub fn shift_into(
        &mut self,
        num_bits: u32,
        tms: &[u8],
        tdi: &[u8],
        tdo: &mut [u8],
    ) -> Result<()> {
        if num_bits == 0 {
            return Err(Error::config("Cannot shift zero bits"));
        }
        let max = self.max_vector_bits();
        if num_bits > max {
            return Err(Error::config(format!(
                "Vector of {} bits exceeds the maximum of {} bits",
                num_bits, max
            )));
        }

        let ws = self.params.word_size;
        let layout = VectorLayout::new(num_bits, ws);
        let num_bytes = layout.byte_count();
        for (name, len) in [("TMS", tms.len()), ("TDI", tdi.len()), ("TDO", tdo.len())] {
            if len < num_bytes {
                return Err(Error::config(format!(
                    "{} buffer too small: need {} bytes, got {}",
                    name, num_bytes, len
                )));
            }
        }

        let request_len = layout.request_len();
        self.grow_buffer(request_len);
        log::debug!(
            "Shift: num_bits={}, num_bytes={}, request_len={}",
            num_bits,
            num_bytes,
            request_len
        );

        let header = ControlWord::shift(self.xids.next_xid(), num_bits)?;
        header.write_header(&mut self.tx_buf[..ws]);
        let body = &mut self.tx_buf[ws..request_len];
        body.fill(0);
        layout.pack(tms, tdi, body);
        if self.debug > 1 {
            trace_words("TMS", &tms[..num_bytes], Some(&tdi[..num_bytes]), &layout);
        }

        let (got, _) = self.transfer_reliable(request_len, &mut tdo[..num_bytes])?;
        if got < num_bytes {
            return Err(Error::protocol(format!(
                "Truncated reply: expected {} TDO bytes, got {}",
                num_bytes, got
            )));
        }
        if self.debug > 1 {
            trace_words("TDO", &tdo[..num_bytes], None, &layout);
        }
        Ok(())
    }

    /// One logical exchange of the first `request_len` bytes of the request buffer.
    ///
    /// Timeouts are retried up to the retry budget, and replies with a foreign
    /// transaction id are discarded. Error replies fail immediately.
    fn transfer_reliable(
        &mut self,
        request_len: usize,
        rx: &mut [u8],
    ) -> Result<(usize, ControlWord)> {
        let xid = ControlWord::read_header(&self.tx_buf[..request_len])?
            .xid()
            .unwrap_or(Xid::ANY);
        let ws = self.params.word_size;

        for attempt in 0..=self.retries {
            let got = match self.transport.transfer_once(
                &self.tx_buf[..request_len],
                &mut self.hdr_buf[..ws],
                rx,
            ) {
                Ok(got) => got,
                Err(Error::Timeout(msg)) => {
                    log::warn!("Attempt {} (xid {}) timed out: {}", attempt, xid, msg);
                    continue;
                }
                Err(other) => return Err(other),
            };

            if self.inject_drop() {
                log::warn!("Test mode: dropping reply to xid {}", xid);
                continue;
            }

            let reply = ControlWord::read_header(&self.hdr_buf[..ws])?;
            if let ControlWord::Error(code) = reply {
                return Err(Error::protocol(format!(
                    "Got error response from server -- {}",
                    code
                )));
            }
            match reply.xid() {
                Some(reply_xid) if xid.accepts(reply_xid) => return Ok((got, reply)),
                _ => log::debug!(
                    "Discarding stale reply {} while waiting for xid {}",
                    reply,
                    xid
                ),
            }
        }

        Err(Error::timeout(format!(
            "too many retries failed ({} attempts)",
            self.retries + 1
        )))
    }

    fn inject_drop(&mut self) -> bool {
        if !self.test_mode.drops_replies() {
            return false;
        }
        self.drop_counter = self.drop_counter.wrapping_add(1);
        self.drop_counter & 0xff == 0
    }

    fn grow_buffer(&mut self, size: usize) {
        if size > self.tx_buf.len() {
            log::debug!("Growing request buffer to {} bytes", size);
            self.tx_buf.resize(size, 0);
        }
    }
}

/// Traces vectors word by word, most significant byte first.
fn trace_words(name: &str, first: &[u8], second: Option<&[u8]>, layout: &VectorLayout) {
    let ws = layout.word_size();
    let mut bits_left = layout.bit_count();
    for (idx, word) in first.chunks(ws).enumerate() {
        let nbits = bits_left.min(8 * ws as u32);
        bits_left -= nbits;
        match second {
            Some(tdi) => {
                let tdi_word = &tdi[idx * ws..(idx * ws + ws).min(tdi.len())];
                log::trace!(
                    "( {} => x\"{}\", TDI => x\"{}\", nbits => {} ),",
                    name,
                    hex_word(word, ws),
                    hex_word(tdi_word, ws),
                    nbits
                );
            }
            None => log::trace!(
                "( {} => x\"{}\", nbits => {} ),",
                name,
                hex_word(word, ws),
                nbits
            ),
        }
    }
}

fn hex_word(bytes: &[u8], ws: usize) -> String {
    let mut out = "00".repeat(ws - bytes.len());
    for byte in bytes.iter().rev() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
