//! Shared fixtures for the integration tests.
//!
//! [`ScriptedTransport`] answers each exchange with the next queued [`Outcome`] and
//! falls back to an [`Emulator`] once the script runs out.
use std::collections::VecDeque;

use axis_jtag_driver::{
    Transport,
    emulator::Emulator,
    error::{Error, Result},
};
use axis_jtag_protocol::{ControlWord, ErrorCode, HEADER_SIZE, Xid};

/// What the transport does on one call to `transfer_once`.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// No reply arrives.
    Timeout,
    /// The given frame (header plus payload) arrives.
    Reply(Vec<u8>),
    /// The emulator answers the request.
    Answer,
}

pub struct ScriptedTransport {
    emulator: Emulator,
    script: VecDeque<Outcome>,
    requests: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new(emulator: Emulator) -> ScriptedTransport {
        ScriptedTransport {
            emulator,
            script: VecDeque::new(),
            requests: Vec::new(),
        }
    }

    /// A transport for a target with word size 4, memory depth 64 and unknown period.
    pub fn with_default_target() -> ScriptedTransport {
        ScriptedTransport::new(Emulator::new(4, 64, None).unwrap())
    }

    pub fn push(&mut self, outcome: Outcome) -> &mut Self {
        self.script.push_back(outcome);
        self
    }

    pub fn push_n(&mut self, outcome: Outcome, count: usize) -> &mut Self {
        for _ in 0..count {
            self.push(outcome.clone());
        }
        self
    }

    /// Number of calls to `transfer_once` so far.
    pub fn attempts(&self) -> usize {
        self.requests.len()
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }

    /// Outcomes that were queued but not yet used.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Transport for ScriptedTransport {
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn word_size(&self) -> Option<usize> {
        None
    }

    fn max_vector_bits(&self) -> u32 {
        1 << 16
    }

    fn transfer_once(
        &mut self,
        request: &[u8],
        header: &mut [u8],
        data: &mut [u8],
    ) -> Result<usize> {
        self.requests.push(request.to_vec());
        let frame = match self.script.pop_front().unwrap_or(Outcome::Answer) {
            Outcome::Timeout => return Err(Error::timeout("scripted timeout")),
            Outcome::Reply(frame) => frame,
            Outcome::Answer => self
                .emulator
                .handle(request)
                .ok_or_else(|| Error::timeout("emulator dropped the reply"))?,
        };
        if frame.len() < header.len() {
            return Err(Error::protocol("scripted reply shorter than a header"));
        }
        let (head, payload) = frame.split_at(header.len());
        header.copy_from_slice(head);
        let got = payload.len().min(data.len());
        data[..got].copy_from_slice(&payload[..got]);
        Ok(got)
    }
}

fn frame(word: ControlWord, word_size: usize, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0; word_size.max(HEADER_SIZE)];
    word.write_header(&mut frame);
    frame.extend_from_slice(payload);
    frame
}

/// A shift reply frame carrying `xid` and `tdo`.
pub fn shift_reply(word_size: usize, xid: u8, bits: u32, tdo: &[u8]) -> Vec<u8> {
    frame(
        ControlWord::shift(Xid::new(xid), bits).unwrap(),
        word_size,
        tdo,
    )
}

/// An error reply frame.
pub fn error_reply(word_size: usize, code: ErrorCode) -> Vec<u8> {
    frame(ControlWord::error(code), word_size, &[])
}

/// A query reply frame announcing the given capabilities.
pub fn query_reply(word_size: usize, memory_depth: u32, period_ns: Option<u32>) -> Vec<u8> {
    let word = ControlWord::query_reply(
        axis_jtag_protocol::Version::SUPPORTED,
        word_size,
        memory_depth,
        period_ns,
    )
    .unwrap();
    frame(word, word_size, &[])
}

/// Converts a list of strings to owned arguments.
pub fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
