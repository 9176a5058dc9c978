//! # AXIS-JTAG Command Line Bridge
//!
//! Operator front end for the transports of [`axis_jtag_driver`]. Selects a transport by
//! name (loading it as a plugin if it is not built in), negotiates with the target and
//! either prints the negotiated parameters or performs a single shift.
//!
//! Transport specific options follow a trailing `--`:
//!
//! ```text
//! axis-jtag -D loopback info -- --word-size 8
//! axis-jtag -D udp -t 10.0.0.5 shift --bits 12 --tdi a50f -- --timeout-ms 100
//! axis-jtag emulate --port 2542 --memory-depth 512
//! ```
use std::error::Error;

use clap::{Args, Parser, Subcommand};
use clap_num::maybe_hex;
use env_logger::Env;

use axis_jtag_driver::{
    driver::Driver,
    emulator::{Emulator, UdpPeer},
    registry::Registry,
};
use axis_jtag_protocol::ControlWord;

/// Port of the emulator behind the `udpLoopback` pseudo-driver.
const UDP_LOOPBACK_PORT: u16 = 2543;
const UDP_LOOPBACK: &str = "udpLoopback";

#[derive(Parser)]
#[command(about = "Drive a JTAG chain through an AXI-Stream transport", long_about = None)]
struct Cli {
    #[arg(
        short = 'D',
        long,
        global = true,
        default_value = "udp",
        help = "Transport name, or path of a transport plugin"
    )]
    driver: String,

    #[arg(short, long, global = true, help = "Target address, if the transport needs one")]
    target: Option<String>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity")]
    verbose: u8,

    #[arg(
        short = 'T',
        long,
        global = true,
        default_value = "0",
        value_parser = maybe_hex::<u32>,
        help = "Test mode flags; bit 0 drops every 256th reply"
    )]
    test_mode: u32,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug, Default)]
struct DriverArgs {
    /// Options forwarded to the transport
    #[arg(last = true)]
    driver_args: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List the registered transports
    List,
    /// Print the options of the selected transport
    Usage,
    /// Negotiate with the target and print its parameters
    Info {
        #[command(flatten)]
        args: DriverArgs,
    },
    /// Shift a single vector and print the captured TDO bits as hex
    Shift {
        #[arg(long, help = "Number of bits to shift")]
        bits: u32,
        #[arg(long, help = "TMS bits as hex, LSB first; zeros if omitted")]
        tms: Option<String>,
        #[arg(long, help = "TDI bits as hex, LSB first")]
        tdi: String,
        #[command(flatten)]
        args: DriverArgs,
    },
    /// Serve an emulated target over UDP
    Emulate {
        #[arg(short, long, default_value = "2542")]
        port: u16,
        #[arg(long, default_value = "4")]
        word_size: usize,
        #[arg(long, default_value = "1024", value_parser = maybe_hex::<u32>)]
        memory_depth: u32,
        #[arg(long)]
        period_ns: Option<u32>,
    },
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Binds the emulator behind the `udpLoopback` pseudo-driver.
fn loopback_peer(addr: &str, test_mode: u32) -> Result<UdpPeer, Box<dyn Error>> {
    let mut peer = UdpPeer::bind(addr, Emulator::new(4, 1024, None)?)?;
    peer.emulator_mut().set_test_mode(test_mode);
    log::info!("Started UDP loopback peer on {}", peer.local_addr()?);
    Ok(peer)
}

/// Creates the transport selected on the command line and wraps it in a driver.
fn open(
    cli: &Cli,
    registry: &mut Registry,
    driver_args: &[String],
) -> Result<Driver<Box<dyn axis_jtag_driver::Transport>>, Box<dyn Error>> {
    let transport = if cli.driver == UDP_LOOPBACK {
        let peer = loopback_peer(&format!("127.0.0.1:{}", UDP_LOOPBACK_PORT), cli.test_mode)?;
        let target = peer.local_addr()?.to_string();
        peer.spawn()?;
        registry.create("udp", driver_args, Some(&target))?
    } else {
        let name = registry.resolve(&cli.driver)?;
        registry.create(&name, driver_args, cli.target.as_deref())?
    };

    let mut driver = Driver::new(transport);
    driver.set_test_mode(cli.test_mode);
    driver.set_debug_level(u32::from(cli.verbose));
    driver.negotiate()?;
    Ok(driver)
}

fn decode_vector(
    name: &str,
    hex_bits: &str,
    num_bytes: usize,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut bytes = hex::decode(hex_bits)?;
    if bytes.len() < num_bytes {
        return Err(format!(
            "{} holds {} bytes, {} are needed",
            name,
            bytes.len(),
            num_bytes
        )
        .into());
    }
    bytes.truncate(num_bytes);
    Ok(bytes)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(log_filter(cli.verbose)))
        .init();
    log::debug!("Driver '{}', target {:?}", cli.driver, cli.target);

    let mut registry = Registry::with_builtin_transports();

    match &cli.command {
        Command::List => {
            for name in registry.names() {
                println!("{}", name);
            }
            println!("{}", UDP_LOOPBACK);
        }
        Command::Usage => {
            let name = if cli.driver == UDP_LOOPBACK {
                "udp".to_string()
            } else {
                registry.resolve(&cli.driver)?
            };
            println!("Options for transport '{}':", cli.driver);
            println!("{}", registry.usage(&name)?);
        }
        Command::Info { args } => {
            let driver = open(&cli, &mut registry, &args.driver_args)?;
            print!("{}", driver.info());
        }
        Command::Shift {
            bits,
            tms,
            tdi,
            args,
        } => {
            let num_bytes = bits.div_ceil(8) as usize;
            let tdi = decode_vector("TDI", tdi, num_bytes)?;
            let tms = match tms {
                Some(tms) => decode_vector("TMS", tms, num_bytes)?,
                None => vec![0; num_bytes],
            };
            let mut driver = open(&cli, &mut registry, &args.driver_args)?;
            let tdo = driver.shift(*bits, &tms, &tdi)?;
            println!("{}", hex::encode(tdo));
        }
        Command::Emulate {
            port,
            word_size,
            memory_depth,
            period_ns,
        } => {
            let emulator = Emulator::new(*word_size, *memory_depth, *period_ns)?;
            log::info!("Emulating {}", ControlWord::Query(emulator.capabilities()));
            let mut peer = UdpPeer::bind(("0.0.0.0", *port), emulator)?;
            peer.emulator_mut().set_test_mode(cli.test_mode);
            peer.run()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use axis_jtag_driver::driver::TestMode;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn driver_args_follow_double_dash() {
        let cli = Cli::try_parse_from([
            "axis-jtag",
            "-D",
            "loopback",
            "-vv",
            "info",
            "--",
            "--word-size",
            "8",
        ])
        .unwrap();
        assert_eq!(cli.driver, "loopback");
        assert_eq!(log_filter(cli.verbose), "trace");
        match cli.command {
            Command::Info { args } => assert_eq!(args.driver_args, ["--word-size", "8"]),
            _ => panic!("expected info"),
        }
    }

    #[test]
    fn test_mode_accepts_hex() {
        let cli = Cli::try_parse_from(["axis-jtag", "-T", "0x1", "list"]).unwrap();
        assert_eq!(cli.test_mode, 1);
        assert_eq!(cli.driver, "udp");
    }

    #[test]
    fn vectors_are_truncated_to_bit_count() {
        assert_eq!(decode_vector("TDI", "a50fff", 2).unwrap(), vec![0xa5, 0x0f]);
        assert!(decode_vector("TDI", "a5", 2).is_err());
        assert!(decode_vector("TDI", "xyz", 1).is_err());
    }

    #[test]
    fn loopback_peer_follows_test_mode() {
        let peer = loopback_peer("127.0.0.1:0", TestMode::DROP_REPLIES).unwrap();
        assert!(peer.emulator().test_mode().drops_replies());
        let peer = loopback_peer("127.0.0.1:0", 0).unwrap();
        assert!(!peer.emulator().test_mode().drops_replies());
    }

    #[test]
    fn shift_over_loopback() {
        let cli = Cli::try_parse_from([
            "axis-jtag", "-D", "loopback", "shift", "--bits", "12", "--tdi", "a50f",
        ])
        .unwrap();
        let mut registry = Registry::with_builtin_transports();
        let mut driver = open(&cli, &mut registry, &[]).unwrap();
        let tdo = driver.shift(12, &[0, 0], &[0xa5, 0x0f]).unwrap();
        assert_eq!(hex::encode(tdo), "a50f");
    }
}
