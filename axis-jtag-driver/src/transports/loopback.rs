//! # Loopback Transport
//!
//! Talks to an in-process [`Emulator`]. Useful for testing without hardware.
use clap::Parser;
use clap_num::maybe_hex;

use axis_jtag_protocol::MAX_SHIFT_BITS;

use crate::Transport;
use crate::emulator::Emulator;
use crate::error::{Error, Result};
use crate::transports::{options_help, parse_options, split_reply};

#[derive(Parser, Debug)]
#[command(about = "In-process loopback transport options")]
struct LoopbackOptions {
    #[arg(long, help = "Word size of the emulated target in bytes", default_value = "4")]
    word_size: usize,
    #[arg(
        long,
        help = "Memory depth of the emulated target in words (0 = streaming)",
        default_value = "1024",
        value_parser = maybe_hex::<u32>
    )]
    memory_depth: u32,
    #[arg(long, help = "TCK period of the emulated target in nanoseconds")]
    period_ns: Option<u32>,
}

pub struct LoopbackTransport {
    emulator: Emulator,
}

impl LoopbackTransport {
    pub fn new(emulator: Emulator) -> LoopbackTransport {
        LoopbackTransport { emulator }
    }

    pub fn emulator_mut(&mut self) -> &mut Emulator {
        &mut self.emulator
    }
}

impl Transport for LoopbackTransport {
    fn reset(&mut self) -> Result<()> {
        log::debug!("Loopback reset");
        Ok(())
    }

    fn word_size(&self) -> Option<usize> {
        None
    }

    fn max_vector_bits(&self) -> u32 {
        let caps = self.emulator.capabilities();
        match caps.memory_depth() {
            0 => MAX_SHIFT_BITS,
            depth => depth * caps.word_size() as u32 * 8,
        }
    }

    fn transfer_once(
        &mut self,
        request: &[u8],
        header: &mut [u8],
        data: &mut [u8],
    ) -> Result<usize> {
        log::trace!("Loopback request: {:02x?}", request);
        match self.emulator.handle(request) {
            Some(reply) => split_reply(&reply, header, data),
            None => Err(Error::timeout("no reply from loopback target")),
        }
    }
}

pub(crate) fn create(args: &[String], _target: &str) -> Result<Box<dyn Transport>> {
    let options: LoopbackOptions = parse_options("loopback", args)?;
    log::debug!("Creating loopback transport: {:?}", options);
    let emulator = Emulator::new(options.word_size, options.memory_depth, options.period_ns)?;
    Ok(Box::new(LoopbackTransport::new(emulator)))
}

pub(crate) fn usage() -> String {
    options_help::<LoopbackOptions>()
}
