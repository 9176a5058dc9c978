//! # Word FIFO Transport
//!
//! For targets reached through a FIFO of 32-bit words, such as an AXI-Stream FIFO
//! that is memory-mapped into the host. The register-level access is provided by an
//! implementation of [`WordFifo`]; this module only handles framing.
//!
//! A request is pushed word by word and terminated with an end-of-frame marker.
//! The reply frame is then popped: header words first, then payload. Words beyond
//! what the caller asked for are popped and discarded.
use std::collections::VecDeque;

use crate::Transport;
use crate::emulator::Emulator;
use crate::error::{Error, Result};

/// Word size of the FIFO in bytes.
pub const FIFO_WORD_SIZE: usize = 4;

/// Word-level access to a FIFO device.
pub trait WordFifo {
    /// Clears both directions of the FIFO.
    fn reset(&mut self) -> Result<()>;

    /// Capacity of the FIFO in words.
    fn capacity_words(&self) -> usize;

    /// Queues one word of the outgoing frame.
    fn push(&mut self, word: u32) -> Result<()>;

    /// Marks the end of the outgoing frame.
    fn end_frame(&mut self) -> Result<()>;

    /// Waits until a reply frame is available and returns its length in words.
    ///
    /// Fails with a timeout if none arrives, by polling or by blocking on an
    /// interrupt, as the device supports.
    fn wait_frame(&mut self) -> Result<usize>;

    /// Pops one word of the reply frame.
    fn pop(&mut self) -> Result<u32>;
}

pub struct FifoTransport<F: WordFifo> {
    fifo: F,
    max_vector_bytes: usize,
}

impl<F: WordFifo> FifoTransport<F> {
    pub fn new(fifo: F) -> Result<FifoTransport<F>> {
        let max_words = fifo.capacity_words();
        if max_words < 3 {
            return Err(Error::config(format!(
                "FIFO capacity of {} words is too small",
                max_words
            )));
        }
        // one header word plus two vectors of whole words must fit
        let words_per_vector = (max_words - 1) / 2;
        Ok(FifoTransport {
            fifo,
            max_vector_bytes: words_per_vector * FIFO_WORD_SIZE,
        })
    }

    pub fn fifo_mut(&mut self) -> &mut F {
        &mut self.fifo
    }
}

impl<F: WordFifo> Transport for FifoTransport<F> {
    fn reset(&mut self) -> Result<()> {
        self.fifo.reset()
    }

    fn word_size(&self) -> Option<usize> {
        Some(FIFO_WORD_SIZE)
    }

    fn max_vector_bits(&self) -> u32 {
        u32::try_from(self.max_vector_bytes * 8).unwrap_or(u32::MAX)
    }

    fn transfer_once(
        &mut self,
        request: &[u8],
        header: &mut [u8],
        data: &mut [u8],
    ) -> Result<usize> {
        if header.len() % FIFO_WORD_SIZE != 0 {
            return Err(Error::config(
                "FIFO only supports word sizes that are a multiple of 4",
            ));
        }

        for chunk in request.chunks(FIFO_WORD_SIZE) {
            let mut word = [0; FIFO_WORD_SIZE];
            word[..chunk.len()].copy_from_slice(chunk);
            self.fifo.push(u32::from_le_bytes(word))?;
        }
        self.fifo.end_frame()?;

        let words = self.fifo.wait_frame()?;
        if words * FIFO_WORD_SIZE < header.len() {
            for _ in 0..words {
                self.fifo.pop()?;
            }
            return Err(Error::protocol("Didn't receive enough data for header"));
        }
        for chunk in header.chunks_mut(FIFO_WORD_SIZE) {
            chunk.copy_from_slice(&self.fifo.pop()?.to_le_bytes());
        }

        let payload_words = words - header.len() / FIFO_WORD_SIZE;
        let copied = data.len().min(payload_words * FIFO_WORD_SIZE);
        for chunk in data[..copied].chunks_mut(FIFO_WORD_SIZE) {
            let word = self.fifo.pop()?.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }

        let excess = payload_words - copied.div_ceil(FIFO_WORD_SIZE);
        if excess > 0 {
            log::trace!("Discarding {} excess FIFO words", excess);
        }
        for _ in 0..excess {
            self.fifo.pop()?;
        }
        Ok(copied)
    }
}

/// In-memory FIFO whose far end is an [`Emulator`].
pub struct EmulatedFifo {
    emulator: Emulator,
    capacity: usize,
    outgoing: Vec<u8>,
    incoming: VecDeque<u32>,
}

impl EmulatedFifo {
    pub fn new(emulator: Emulator, capacity_words: usize) -> EmulatedFifo {
        EmulatedFifo {
            emulator,
            capacity: capacity_words,
            outgoing: Vec::new(),
            incoming: VecDeque::new(),
        }
    }

    pub fn emulator_mut(&mut self) -> &mut Emulator {
        &mut self.emulator
    }

    /// Words still waiting to be popped.
    pub fn pending_words(&self) -> usize {
        self.incoming.len()
    }
}

impl WordFifo for EmulatedFifo {
    fn reset(&mut self) -> Result<()> {
        self.outgoing.clear();
        self.incoming.clear();
        Ok(())
    }

    fn capacity_words(&self) -> usize {
        self.capacity
    }

    fn push(&mut self, word: u32) -> Result<()> {
        if self.outgoing.len() / FIFO_WORD_SIZE >= self.capacity {
            return Err(Error::protocol("FIFO overflow"));
        }
        self.outgoing.extend_from_slice(&word.to_le_bytes());
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        let request = std::mem::take(&mut self.outgoing);
        if let Some(reply) = self.emulator.handle(&request) {
            self.incoming.extend(reply.chunks(FIFO_WORD_SIZE).map(|chunk| {
                let mut word = [0; FIFO_WORD_SIZE];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(word)
            }));
        }
        Ok(())
    }

    fn wait_frame(&mut self) -> Result<usize> {
        match self.incoming.len() {
            0 => Err(Error::timeout("FIFO stayed empty")),
            words => Ok(words),
        }
    }

    fn pop(&mut self) -> Result<u32> {
        self.incoming
            .pop_front()
            .ok_or_else(|| Error::protocol("FIFO underrun"))
    }
}

#[derive(clap::Parser, Debug)]
#[command(about = "Word FIFO loopback transport options")]
struct FifoLoopbackOptions {
    #[arg(long, help = "FIFO capacity in words", default_value = "4096")]
    capacity: usize,
    #[arg(
        long,
        help = "Memory depth of the emulated target in words",
        default_value = "1024"
    )]
    memory_depth: u32,
    #[arg(long, help = "TCK period of the emulated target in nanoseconds")]
    period_ns: Option<u32>,
}

pub(crate) fn create_loopback(args: &[String], _target: &str) -> Result<Box<dyn Transport>> {
    let options: FifoLoopbackOptions = super::parse_options("fifoLoopback", args)?;
    let emulator = Emulator::new(FIFO_WORD_SIZE, options.memory_depth, options.period_ns)?;
    Ok(Box::new(FifoTransport::new(EmulatedFifo::new(
        emulator,
        options.capacity,
    ))?))
}

pub(crate) fn usage() -> String {
    super::options_help::<FifoLoopbackOptions>()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::Driver;
    use crate::error::ErrorKind;

    fn fifo_driver(capacity: usize, depth: u32) -> Driver<FifoTransport<EmulatedFifo>> {
        let emulator = Emulator::new(FIFO_WORD_SIZE, depth, Some(100)).unwrap();
        Driver::new(FifoTransport::new(EmulatedFifo::new(emulator, capacity)).unwrap())
    }

    #[test]
    fn vector_limit_from_capacity() {
        let transport =
            FifoTransport::new(EmulatedFifo::new(Emulator::new(4, 0, None).unwrap(), 1024))
                .unwrap();
        assert_eq!(transport.max_vector_bits(), (1023 / 2) * 4 * 8);
    }

    #[test]
    fn longest_vector_fits_the_fifo() {
        // 64 and 1024 leave an odd number of words after the header
        for capacity in [3, 64, 65, 1024] {
            let mut driver = fifo_driver(capacity, 0);
            driver.negotiate().unwrap();
            let bits = driver.max_vector_bits();
            let layout = axis_jtag_protocol::VectorLayout::new(bits, FIFO_WORD_SIZE);
            assert!(layout.request_len() <= capacity * FIFO_WORD_SIZE);

            let bytes = (bits as usize).div_ceil(8);
            let tdi: Vec<u8> = (0..bytes).map(|i| (i * 13) as u8).collect();
            let tdo = driver.shift(bits, &vec![0; bytes], &tdi).unwrap();
            assert_eq!(&tdo[..], &tdi[..], "capacity {}", capacity);
        }
    }

    #[test]
    fn shifts_through_fifo() {
        let mut driver = fifo_driver(1024, 256);
        driver.negotiate().unwrap();
        for bits in [1, 8, 31, 32, 33, 1000] {
            let bytes = (bits as usize).div_ceil(8);
            let tdi: Vec<u8> = (0..bytes).map(|i| (i * 7) as u8).collect();
            let tdo = driver.shift(bits, &vec![0; bytes], &tdi).unwrap();
            assert_eq!(&tdo[..], &tdi[..]);
            assert_eq!(driver.transport_mut().fifo_mut().pending_words(), 0);
        }
    }

    #[test]
    fn excess_words_are_drained() {
        let mut transport =
            FifoTransport::new(EmulatedFifo::new(Emulator::new(4, 16, None).unwrap(), 64))
                .unwrap();
        let mut driver = Driver::new(&mut transport);
        driver.negotiate().unwrap();
        // 9 bits: two TDO bytes requested, one padded word returned
        let tdo = driver.shift(9, &[0, 0], &[0x12, 0x01]).unwrap();
        assert_eq!(&tdo[..], &[0x12, 0x01]);
        drop(driver);
        assert_eq!(transport.fifo_mut().pending_words(), 0);

        let mut request = [0; 4];
        axis_jtag_protocol::ControlWord::query().write_header(&mut request);
        let mut header = [0; 4];
        // the query reply carries no payload, but ask for some anyway
        let got = transport
            .transfer_once(&request, &mut header, &mut [0; 8])
            .unwrap();
        assert_eq!(got, 0);
    }

    #[test]
    fn word_size_mismatch_is_config_error() {
        let emulator = Emulator::new(8, 1024, None).unwrap();
        let mut driver =
            Driver::new(FifoTransport::new(EmulatedFifo::new(emulator, 64)).unwrap());
        assert_eq!(driver.negotiate().unwrap_err().kind(), ErrorKind::Config);

        // the rejected target leaves the session as it was
        let params = driver.parameters();
        assert_eq!(params.word_size, FIFO_WORD_SIZE);
        assert_eq!(params.memory_depth, 1);
        assert_eq!(driver.retries(), crate::driver::DEFAULT_RETRIES);
        assert_eq!(driver.buffer_size(), crate::driver::DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn lost_replies_are_retried() {
        let mut driver = fifo_driver(64, 16);
        driver.negotiate().unwrap();
        driver
            .transport_mut()
            .fifo_mut()
            .emulator_mut()
            .set_test_mode(crate::driver::TestMode::DROP_REPLIES);
        // every 256th reply is lost and recovered by a retry
        for _ in 0..300 {
            driver.shift(8, &[0], &[0x5a]).unwrap();
        }
    }
}
