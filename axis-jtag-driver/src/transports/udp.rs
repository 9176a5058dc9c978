//! # UDP Transport
//!
//! Sends each request as one datagram to `<host>[:port]` and waits for a single
//! reply datagram. Lost datagrams surface as timeouts; late replies to earlier
//! attempts are filtered out by the driver through their transaction id.
use std::{
    io::ErrorKind,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use clap::Parser;
use clap_num::maybe_hex;

use axis_jtag_protocol::MAX_WORD_SIZE;

use crate::Transport;
use crate::error::{Error, Result};
use crate::transports::{options_help, parse_options, split_reply};

pub const DEFAULT_PORT: u16 = 2542;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_MTU: usize = 1450;

const MAX_DATAGRAM: usize = 65536;

/// Smallest MTU that still carries a header and one byte per vector.
pub const MIN_MTU: usize = 3 * MAX_WORD_SIZE;

#[derive(Parser, Debug)]
#[command(about = "UDP transport options")]
struct UdpOptions {
    #[arg(long, help = "Reply timeout in milliseconds", default_value = "500")]
    timeout_ms: u64,
    #[arg(
        long,
        help = "Largest datagram the link carries, in bytes",
        default_value = "1450",
        value_parser = maybe_hex::<usize>
    )]
    mtu: usize,
}

pub struct UdpTransport {
    socket: UdpSocket,
    rx_buf: Vec<u8>,
    mtu: usize,
    timeout: Duration,
}

/// Longest vector, in bytes, whose request fits into `mtu` whatever word size the
/// target announces.
///
/// The header takes up to [`MAX_WORD_SIZE`] bytes and each vector is padded by up to
/// `MAX_WORD_SIZE - 1` bytes to whole words.
fn max_vector_bytes(mtu: usize) -> usize {
    ((mtu - MAX_WORD_SIZE) / 2).saturating_sub(MAX_WORD_SIZE - 1)
}

/// Appends the default port if `target` does not name one.
fn target_with_port(target: &str) -> String {
    let has_port = match target.rsplit_once(':') {
        // a bare IPv6 address contains colons but no port
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && (!host.contains(':') || host.ends_with(']'))
        }
        None => false,
    };
    if has_port {
        target.to_string()
    } else if target.contains(':') && !target.starts_with('[') {
        format!("[{}]:{}", target, DEFAULT_PORT)
    } else {
        format!("{}:{}", target, DEFAULT_PORT)
    }
}

impl UdpTransport {
    pub fn connect(target: &str, timeout: Duration, mtu: usize) -> Result<UdpTransport> {
        if mtu < MIN_MTU {
            return Err(Error::config(format!(
                "MTU of {} bytes is too small, need at least {}",
                mtu, MIN_MTU
            )));
        }
        let target = target_with_port(target);
        let addr = target
            .to_socket_addrs()
            .map_err(|e| Error::system(format!("Unable to look up {}", target), e))?
            .next()
            .ok_or_else(|| Error::config(format!("No address found for {}", target)))?;

        let local = match addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket =
            UdpSocket::bind(local).map_err(|e| Error::system("Unable to create socket", e))?;
        socket
            .connect(addr)
            .map_err(|e| Error::system(format!("Unable to connect to {}", addr), e))?;
        socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| Error::system("Unable to set socket timeout", e))?;
        log::info!("UDP transport connected to {}", addr);

        Ok(UdpTransport {
            socket,
            rx_buf: vec![0; MAX_DATAGRAM],
            mtu,
            timeout,
        })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.socket
            .peer_addr()
            .map_err(|e| Error::system("Unable to get peer address", e))
    }
}

impl Transport for UdpTransport {
    /// Discards datagrams that are still queued from earlier exchanges.
    fn reset(&mut self) -> Result<()> {
        self.socket
            .set_nonblocking(true)
            .map_err(|e| Error::system("Unable to make socket non-blocking", e))?;
        let mut discarded = 0;
        let drained = loop {
            match self.socket.recv(&mut self.rx_buf) {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                // ICMP errors from earlier sends carry no data
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => continue,
                Err(e) => break Err(Error::system("Unable to drain socket", e)),
            }
        };
        self.socket
            .set_nonblocking(false)
            .map_err(|e| Error::system("Unable to make socket blocking", e))?;
        if discarded > 0 {
            log::debug!("UDP reset discarded {} stale datagrams", discarded);
        }
        drained
    }

    fn word_size(&self) -> Option<usize> {
        None
    }

    fn max_vector_bits(&self) -> u32 {
        u32::try_from(max_vector_bytes(self.mtu) * 8).unwrap_or(u32::MAX)
    }

    fn transfer_once(
        &mut self,
        request: &[u8],
        header: &mut [u8],
        data: &mut [u8],
    ) -> Result<usize> {
        self.socket
            .send(request)
            .map_err(|e| Error::system("Unable to send datagram", e))?;
        match self.socket.recv(&mut self.rx_buf) {
            Ok(len) => {
                log::trace!("UDP received {} bytes", len);
                split_reply(&self.rx_buf[..len], header, data)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(Error::timeout(format!(
                    "no reply within {} ms",
                    self.timeout.as_millis()
                )))
            }
            Err(e) => Err(Error::system("Unable to receive datagram", e)),
        }
    }
}

pub(crate) fn create(args: &[String], target: &str) -> Result<Box<dyn Transport>> {
    let options: UdpOptions = parse_options("udp", args)?;
    log::debug!("Creating UDP transport to {}: {:?}", target, options);
    Ok(Box::new(UdpTransport::connect(
        target,
        Duration::from_millis(options.timeout_ms),
        options.mtu,
    )?))
}

pub(crate) fn usage() -> String {
    format!(
        "-t <host>[:port] (default port {})\n{}",
        DEFAULT_PORT,
        options_help::<UdpOptions>()
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::emulator::{Emulator, UdpPeer};
    use axis_jtag_protocol::{ControlWord, VectorLayout};

    #[test]
    fn default_port_is_appended() {
        assert_eq!(target_with_port("localhost"), "localhost:2542");
        assert_eq!(target_with_port("10.0.0.1:3000"), "10.0.0.1:3000");
        assert_eq!(target_with_port("::1"), "[::1]:2542");
        assert_eq!(target_with_port("[::1]:7"), "[::1]:7");
    }

    #[test]
    fn vector_limit_follows_mtu() {
        let transport = UdpTransport::connect("127.0.0.1:9", DEFAULT_TIMEOUT, 1450).unwrap();
        assert_eq!(transport.max_vector_bits(), ((1450 - 16) / 2 - 15) * 8);
        assert!(UdpTransport::connect("127.0.0.1:9", DEFAULT_TIMEOUT, 16).is_err());
        assert!(UdpTransport::connect("127.0.0.1:9", DEFAULT_TIMEOUT, MIN_MTU - 1).is_err());
        assert!(UdpTransport::connect("127.0.0.1:9", DEFAULT_TIMEOUT, MIN_MTU).is_ok());
    }

    #[test]
    fn longest_request_fits_mtu_for_every_word_size() {
        for mtu in [MIN_MTU, MIN_MTU + 1, 100, 577, DEFAULT_MTU, 9000] {
            let bits = max_vector_bytes(mtu) as u32 * 8;
            assert!(bits > 0);
            for ws in 1..=MAX_WORD_SIZE {
                let request_len = VectorLayout::new(bits, ws).request_len();
                assert!(
                    request_len <= mtu,
                    "mtu {} word size {}: request of {} bytes",
                    mtu,
                    ws,
                    request_len
                );
            }
        }
    }

    #[test]
    fn exchanges_with_udp_peer() {
        let peer = UdpPeer::bind("127.0.0.1:0", Emulator::new(4, 8, None).unwrap()).unwrap();
        let addr = peer.local_addr().unwrap();
        peer.spawn().unwrap();

        let mut transport =
            UdpTransport::connect(&addr.to_string(), Duration::from_secs(5), DEFAULT_MTU).unwrap();
        transport.reset().unwrap();
        let mut request = [0; 4];
        ControlWord::query().write_header(&mut request);
        let mut header = [0; 4];
        assert_eq!(transport.transfer_once(&request, &mut header, &mut []).unwrap(), 0);
        let caps = ControlWord::read_header(&header)
            .unwrap()
            .capabilities()
            .unwrap();
        assert_eq!(caps.memory_depth(), 8);
    }

    #[test]
    fn silence_is_a_timeout() {
        // a bound socket that never answers
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();
        let mut transport =
            UdpTransport::connect(&addr.to_string(), Duration::from_millis(20), DEFAULT_MTU)
                .unwrap();
        let err = transport
            .transfer_once(&[0; 4], &mut [0; 4], &mut [])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
    }
}
