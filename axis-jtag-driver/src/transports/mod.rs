//! Built-in transports.
//!
//! - [`loopback`]: in-process emulated target
//! - [`udp`]: one datagram per request
//! - [`fifo`]: any 32-bit word FIFO, such as a memory-mapped AXI-Stream FIFO
use crate::error::{Error, Result};
use crate::registry::{Registry, RegistryEntry};

pub mod fifo;
pub mod loopback;
pub mod udp;

/// Registers all built-in transports.
pub fn register_builtin(registry: &mut Registry) {
    registry.register(RegistryEntry::new(
        "loopback",
        loopback::create,
        loopback::usage,
        false,
    ));
    registry.register(RegistryEntry::new(
        "fifoLoopback",
        fifo::create_loopback,
        fifo::usage,
        false,
    ));
    registry.register(RegistryEntry::new("udp", udp::create, udp::usage, true));
}

/// Splits a reply frame into header and payload.
///
/// Returns the number of payload bytes copied into `data`; anything beyond is discarded.
pub(crate) fn split_reply(reply: &[u8], header: &mut [u8], data: &mut [u8]) -> Result<usize> {
    if reply.len() < header.len() {
        return Err(Error::protocol("Didn't receive enough data for header"));
    }
    let (reply_header, payload) = reply.split_at(header.len());
    header.copy_from_slice(reply_header);
    let copied = payload.len().min(data.len());
    data[..copied].copy_from_slice(&payload[..copied]);
    if payload.len() > copied {
        log::trace!("Discarding {} excess reply bytes", payload.len() - copied);
    }
    Ok(copied)
}

/// Parses transport options with clap. The program name is taken from `name`.
pub(crate) fn parse_options<P: clap::Parser>(name: &str, args: &[String]) -> Result<P> {
    P::try_parse_from(std::iter::once(name).chain(args.iter().map(String::as_str)))
        .map_err(|e| Error::config(format!("Invalid options for transport '{}': {}", name, e)))
}

/// Help text for transport options.
pub(crate) fn options_help<P: clap::CommandFactory>() -> String {
    P::command().render_help().to_string()
}
