//! The 32-bit control word that frames every request and reply.
//!
//! Layout (bit ranges, LSB first):
//!
//! | bits   | Query             | Shift          | Error      |
//! |--------|-------------------|----------------|------------|
//! | 30..32 | version           | version        | version    |
//! | 28..30 | tag `0`           | tag `1`        | tag `2`    |
//! | 20..28 | clock period code | xid            | -          |
//! | 4..20  | memory depth      | length - 1     | -          |
//! | 0..4   | word size - 1     | (length - 1)   | error code |
//!
//! The shift length occupies bits `0..20`, the error code bits `0..8`.
use std::fmt::Display;

use crate::error::HeaderError;
use crate::period::{self, PeriodCode};

const VERSION_SHIFT: u32 = 30;
const VERSION_MASK: u32 = 0x3;
const CMD_SHIFT: u32 = 28;
const CMD_MASK: u32 = 0x3;
const XID_SHIFT: u32 = 20;
const XID_MASK: u32 = 0xff;
const LEN_SHIFT: u32 = 0;
const LEN_MASK: u32 = 0xf_ffff;
const ERR_SHIFT: u32 = 0;
const ERR_MASK: u32 = 0xff;
const WORD_SIZE_SHIFT: u32 = 0;
const WORD_SIZE_MASK: u32 = 0xf;
const MEM_DEPTH_SHIFT: u32 = 4;
const MEM_DEPTH_MASK: u32 = 0xffff;

const CMD_QUERY: u32 = 0;
const CMD_SHIFT_VALUE: u32 = 1;
const CMD_ERROR: u32 = 2;

/// Size of a control word on the wire, in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest word size a target may announce, in bytes.
pub const MAX_WORD_SIZE: usize = 16;

/// Largest number of bits a single shift request can carry.
pub const MAX_SHIFT_BITS: u32 = LEN_MASK + 1;

/// The protocol version carried in every control word.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version(u8);

impl Version {
    /// Version 0 of the protocol, the only one supported.
    pub const V0: Version = Version(0);

    /// The version that this implementation speaks.
    pub const SUPPORTED: Version = Version::V0;

    pub fn new(raw: u8) -> Version {
        Version(raw)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::SUPPORTED
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command tag of a control word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Query,
    Shift,
    Error,
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Query => write!(f, "Query"),
            Command::Shift => write!(f, "Shift"),
            Command::Error => write!(f, "Error"),
        }
    }
}

/// Transaction id matching a shift request to its reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Xid(u8);

impl Xid {
    /// Accept any reply. Used for queries.
    pub const ANY: Xid = Xid(0);

    pub fn new(raw: u8) -> Xid {
        Xid(raw)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Whether a reply carrying `reply` answers a request sent with `self`.
    pub fn accepts(&self, reply: Xid) -> bool {
        *self == Xid::ANY || *self == reply
    }
}

impl Display for Xid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Session-scoped source of fresh transaction ids.
///
/// Ids cycle through all 8-bit values but never hand out [`Xid::ANY`].
#[derive(Clone, Debug, Default)]
pub struct XidGenerator {
    last: u8,
}

impl XidGenerator {
    pub fn new() -> XidGenerator {
        XidGenerator::default()
    }

    pub fn next_xid(&mut self) -> Xid {
        self.last = self.last.wrapping_add(1);
        if self.last == Xid::ANY.0 {
            self.last = self.last.wrapping_add(1);
        }
        Xid(self.last)
    }
}

/// Target capabilities, announced in a Query reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Capabilities {
    word_size: u8,
    memory_depth: u16,
    period: PeriodCode,
}

impl Capabilities {
    /// Validates and builds the capability set of a Query reply.
    ///
    /// `word_size` is in bytes (`1..=16`), `memory_depth` in words (`0` means streaming),
    /// `period_ns` is the TCK period or `None` if unknown.
    pub fn new(
        word_size: usize,
        memory_depth: u32,
        period_ns: Option<u32>,
    ) -> Result<Capabilities, HeaderError> {
        if !(1..=MAX_WORD_SIZE).contains(&word_size) {
            return Err(HeaderError::OutOfRange {
                field: "word size",
                value: word_size as u64,
                min: 1,
                max: MAX_WORD_SIZE as u64,
            });
        }
        if memory_depth > MEM_DEPTH_MASK {
            return Err(HeaderError::OutOfRange {
                field: "memory depth",
                value: memory_depth as u64,
                min: 0,
                max: MEM_DEPTH_MASK as u64,
            });
        }
        Ok(Capabilities {
            word_size: word_size as u8,
            memory_depth: memory_depth as u16,
            period: period::encode(period_ns)?,
        })
    }

    /// Word size in bytes
    pub fn word_size(&self) -> usize {
        self.word_size as usize
    }

    /// Target buffer capacity in words. Zero means unbounded.
    pub fn memory_depth(&self) -> u32 {
        self.memory_depth as u32
    }

    pub fn period_code(&self) -> PeriodCode {
        self.period
    }

    pub fn period_ns(&self) -> Option<u32> {
        period::decode(self.period)
    }
}

/// Header of a shift request or reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ShiftHeader {
    xid: Xid,
    length: u32,
}

impl ShiftHeader {
    pub fn new(xid: Xid, bit_count: u32) -> Result<ShiftHeader, HeaderError> {
        if !(1..=MAX_SHIFT_BITS).contains(&bit_count) {
            return Err(HeaderError::OutOfRange {
                field: "shift length",
                value: bit_count as u64,
                min: 1,
                max: MAX_SHIFT_BITS as u64,
            });
        }
        Ok(ShiftHeader {
            xid,
            length: bit_count,
        })
    }

    pub fn xid(&self) -> Xid {
        self.xid
    }

    /// Number of bits shifted.
    pub fn length(&self) -> u32 {
        self.length
    }
}

/// Reason carried by an Error reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    BadVersion,
    BadCommand,
    Truncated,
    NotPresent,
    Other(u8),
}

impl ErrorCode {
    pub fn from_raw(raw: u8) -> ErrorCode {
        match raw {
            1 => ErrorCode::BadVersion,
            2 => ErrorCode::BadCommand,
            3 => ErrorCode::Truncated,
            4 => ErrorCode::NotPresent,
            other => ErrorCode::Other(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            ErrorCode::BadVersion => 1,
            ErrorCode::BadCommand => 2,
            ErrorCode::Truncated => 3,
            ErrorCode::NotPresent => 4,
            ErrorCode::Other(raw) => *raw,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::BadVersion => write!(f, "Unsupported Protocol Version"),
            ErrorCode::BadCommand => write!(f, "Unsupported Command"),
            ErrorCode::Truncated => write!(f, "Truncated Message"),
            ErrorCode::NotPresent => write!(f, "JTAG Support not Instantiated in Firmware"),
            ErrorCode::Other(raw) => write!(f, "Unknown error {}", raw),
        }
    }
}

/// A decoded control word.
///
/// Each variant only carries the fields that are meaningful for its command tag,
/// so the shared bit ranges can never be read under the wrong interpretation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlWord {
    Query(Capabilities),
    Shift(ShiftHeader),
    Error(ErrorCode),
}

impl ControlWord {
    /// A capability query. It carries the wildcard xid and no payload.
    pub fn query() -> ControlWord {
        ControlWord::Query(Capabilities {
            word_size: 1,
            memory_depth: 0,
            period: PeriodCode::UNKNOWN,
        })
    }

    /// A shift request for `bit_count` bits, tagged with `xid`.
    pub fn shift(xid: Xid, bit_count: u32) -> Result<ControlWord, HeaderError> {
        Ok(ControlWord::Shift(ShiftHeader::new(xid, bit_count)?))
    }

    /// The reply a target sends to a query.
    pub fn query_reply(
        version: Version,
        word_size: usize,
        memory_depth: u32,
        period_ns: Option<u32>,
    ) -> Result<ControlWord, HeaderError> {
        if version != Version::SUPPORTED {
            return Err(HeaderError::OutOfRange {
                field: "protocol version",
                value: version.raw() as u64,
                min: Version::SUPPORTED.raw() as u64,
                max: Version::SUPPORTED.raw() as u64,
            });
        }
        Ok(ControlWord::Query(Capabilities::new(
            word_size,
            memory_depth,
            period_ns,
        )?))
    }

    pub fn error(code: ErrorCode) -> ControlWord {
        ControlWord::Error(code)
    }

    pub fn command(&self) -> Command {
        match self {
            ControlWord::Query(_) => Command::Query,
            ControlWord::Shift(_) => Command::Shift,
            ControlWord::Error(_) => Command::Error,
        }
    }

    /// The transaction id used for reply matching.
    /// Queries always match with the wildcard, errors carry no id.
    pub fn xid(&self) -> Option<Xid> {
        match self {
            ControlWord::Query(_) => Some(Xid::ANY),
            ControlWord::Shift(shift) => Some(shift.xid()),
            ControlWord::Error(_) => None,
        }
    }

    /// Shift length in bits. Fails for any tag but Shift.
    pub fn length(&self) -> Result<u32, HeaderError> {
        match self {
            ControlWord::Shift(shift) => Ok(shift.length()),
            other => Err(HeaderError::WrongCommand {
                field: "length",
                found: other.command(),
            }),
        }
    }

    /// Error code. Fails for any tag but Error.
    pub fn error_code(&self) -> Result<ErrorCode, HeaderError> {
        match self {
            ControlWord::Error(code) => Ok(*code),
            other => Err(HeaderError::WrongCommand {
                field: "error code",
                found: other.command(),
            }),
        }
    }

    /// Capabilities. Fails for any tag but Query.
    pub fn capabilities(&self) -> Result<Capabilities, HeaderError> {
        match self {
            ControlWord::Query(caps) => Ok(*caps),
            other => Err(HeaderError::WrongCommand {
                field: "capabilities",
                found: other.command(),
            }),
        }
    }

    /// Host-order value of this control word.
    pub fn to_word(&self) -> u32 {
        let version = (Version::SUPPORTED.raw() as u32 & VERSION_MASK) << VERSION_SHIFT;
        match self {
            ControlWord::Query(caps) => {
                version
                    | CMD_QUERY << CMD_SHIFT
                    | (caps.period.raw() as u32 & XID_MASK) << XID_SHIFT
                    | (caps.memory_depth as u32 & MEM_DEPTH_MASK) << MEM_DEPTH_SHIFT
                    | ((caps.word_size as u32 - 1) & WORD_SIZE_MASK) << WORD_SIZE_SHIFT
            }
            ControlWord::Shift(shift) => {
                version
                    | CMD_SHIFT_VALUE << CMD_SHIFT
                    | (shift.xid.raw() as u32 & XID_MASK) << XID_SHIFT
                    | ((shift.length - 1) & LEN_MASK) << LEN_SHIFT
            }
            ControlWord::Error(code) => {
                version | CMD_ERROR << CMD_SHIFT | (code.raw() as u32 & ERR_MASK) << ERR_SHIFT
            }
        }
    }

    /// Interprets a host-order word.
    pub fn from_word(word: u32) -> Result<ControlWord, HeaderError> {
        let version = (word >> VERSION_SHIFT) & VERSION_MASK;
        if version != Version::SUPPORTED.raw() as u32 {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        match (word >> CMD_SHIFT) & CMD_MASK {
            CMD_QUERY => Ok(ControlWord::Query(Capabilities {
                word_size: (((word >> WORD_SIZE_SHIFT) & WORD_SIZE_MASK) + 1) as u8,
                memory_depth: ((word >> MEM_DEPTH_SHIFT) & MEM_DEPTH_MASK) as u16,
                period: PeriodCode::new(((word >> XID_SHIFT) & XID_MASK) as u8),
            })),
            CMD_SHIFT_VALUE => Ok(ControlWord::Shift(ShiftHeader {
                xid: Xid(((word >> XID_SHIFT) & XID_MASK) as u8),
                length: ((word >> LEN_SHIFT) & LEN_MASK) + 1,
            })),
            CMD_ERROR => Ok(ControlWord::Error(ErrorCode::from_raw(
                ((word >> ERR_SHIFT) & ERR_MASK) as u8,
            ))),
            other => Err(HeaderError::UnknownCommand(other)),
        }
    }

    /// Writes this control word into the start of `buf` and zero-fills the
    /// rest of `buf`, which is expected to be exactly one transport word.
    ///
    /// # Panics
    ///
    /// If `buf` is shorter than [`HEADER_SIZE`].
    pub fn write_header(&self, buf: &mut [u8]) {
        buf[..HEADER_SIZE].copy_from_slice(&self.to_word().to_le_bytes());
        buf[HEADER_SIZE..].fill(0);
    }

    /// Reads a control word from the first [`HEADER_SIZE`] bytes of `buf`.
    pub fn read_header(buf: &[u8]) -> Result<ControlWord, HeaderError> {
        let bytes: [u8; HEADER_SIZE] =
            buf.get(..HEADER_SIZE)
                .and_then(|b| b.try_into().ok())
                .ok_or(HeaderError::OutOfRange {
                    field: "header buffer",
                    value: buf.len() as u64,
                    min: HEADER_SIZE as u64,
                    max: MAX_WORD_SIZE as u64,
                })?;
        ControlWord::from_word(u32::from_le_bytes(bytes))
    }
}

impl Display for ControlWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlWord::Query(caps) => write!(
                f,
                "Query(word_size={}, memory_depth={}, period_code={})",
                caps.word_size(),
                caps.memory_depth(),
                caps.period.raw()
            ),
            ControlWord::Shift(shift) => {
                write!(f, "Shift(xid={}, bits={})", shift.xid, shift.length)
            }
            ControlWord::Error(code) => write!(f, "Error({})", code),
        }
    }
}
