//! # AXIS-JTAG Protocol Library
//!
//! This crate implements the framing used to drive a JTAG chain that sits behind a
//! word-oriented AXI-Stream transport (a hardware FIFO, a UDP link, an emulator).
//!
//! ## Overview
//!
//! Every request and every reply starts with one 32-bit control word, padded to the
//! transport's word size. The control word carries a protocol version, a command tag
//! and, depending on the tag, further fields:
//!
//! - **Query**: asks the target for its capabilities. The reply announces the word size,
//!   the target memory depth and the TCK period.
//! - **Shift**: shifts `length` bits of TMS/TDI into the chain. Requests and replies are
//!   matched by an 8-bit transaction id.
//! - **Error**: the target rejected a request.
//!
//! ## Basic Usage
//!
//! ### Building and decoding control words
//!
//! ```
//! use axis_jtag_protocol::{ControlWord, Version, XidGenerator};
//!
//! let mut xids = XidGenerator::new();
//! let shift = ControlWord::shift(xids.next_xid(), 13).expect("13 bits fit a request");
//! let decoded = ControlWord::from_word(shift.to_word()).expect("valid control word");
//! assert_eq!(decoded.length(), Ok(13));
//!
//! let reply = ControlWord::query_reply(Version::V0, 4, 512, Some(500)).unwrap();
//! let caps = ControlWord::from_word(reply.to_word()).unwrap().capabilities().unwrap();
//! assert_eq!(caps.word_size(), 4);
//! assert_eq!(caps.memory_depth(), 512);
//! assert_eq!(caps.period_ns(), Some(500));
//! ```
//!
//! ### Packing vectors
//!
//! ```
//! use axis_jtag_protocol::VectorLayout;
//!
//! let layout = VectorLayout::new(12, 4);
//! let mut body = vec![0; layout.body_len()];
//! layout.pack(&[0xaa, 0x0b], &[0x55, 0x04], &mut body);
//! assert_eq!(body, [0xaa, 0x0b, 0, 0, 0x55, 0x04, 0, 0]);
//! assert_eq!(layout.request_len(), 12);
//! ```
//!
//! ## Byte Order
//!
//! Control words are little-endian on the wire. [`ControlWord::write_header`] and
//! [`ControlWord::read_header`] convert at the boundary so that all values handled
//! by callers are in host order.
//!
//! ## Error Handling
//!
//! Construction and decoding failures are reported as [`error::HeaderError`].

pub mod error;
pub mod header;
pub mod period;
pub mod vector;

pub use header::*;
pub use period::PeriodCode;
pub use vector::VectorLayout;
