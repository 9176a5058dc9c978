use std::time::Duration;

use axis_jtag_driver::{
    driver::{Driver, TestMode},
    emulator::{Emulator, UdpPeer},
    registry::Registry,
    transports::udp::{DEFAULT_MTU, UdpTransport},
};
use axis_jtag_protocol::{ControlWord, VectorLayout, period};
use axis_jtag_tests::{Outcome, ScriptedTransport, args, query_reply};
use pretty_assertions::assert_eq;

fn pattern(bits: u32, seed: u8) -> Vec<u8> {
    (0..bits.div_ceil(8))
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn assert_loops_back<T: axis_jtag_driver::Transport>(driver: &mut Driver<T>, bits: u32) {
    let tms = pattern(bits, 0x11);
    let tdi = pattern(bits, 0x5c);
    let tdo = driver.shift(bits, &tms, &tdi).unwrap();
    assert_eq!(&tdo[..], &tdi[..], "{} bits", bits);
}

#[test]
fn negotiation_sizes_the_session() {
    let registry = Registry::with_builtin_transports();
    let options = args(&[
        "--word-size",
        "4",
        "--memory-depth",
        "512",
        "--period-ns",
        "500",
    ]);
    let mut driver = Driver::new(registry.create("loopback", &options, None).unwrap());
    let params = driver.negotiate().unwrap();

    assert_eq!(params.word_size, 4);
    assert_eq!(params.memory_depth, 512);
    let step = period::quantization_step();
    let period_ns = params.period_ns.unwrap() as f64;
    assert!(period_ns >= 500.0 / step && period_ns <= 500.0 * step);
    assert!(driver.buffer_size() >= (2 * 512 + 1) * 4);
    assert_eq!(driver.retries(), 5);
    assert_eq!(driver.max_vector_bits(), 512 * 4 * 8);
}

#[test]
fn period_code_128() {
    let reply = query_reply(4, 512, Some(500));
    let caps = ControlWord::read_header(&reply)
        .unwrap()
        .capabilities()
        .unwrap();
    assert_eq!(caps.period_code().raw(), 128);

    let mut transport = ScriptedTransport::with_default_target();
    transport.push(Outcome::Reply(reply));
    let mut driver = Driver::new(transport);
    let params = driver.negotiate().unwrap();
    assert_eq!(params.period_ns, Some(500));
    assert_eq!(driver.set_tck(0), 500);
    assert_eq!(driver.set_tck(100), 500);
}

#[test]
fn buffer_never_shrinks() {
    let registry = Registry::with_builtin_transports();
    let mut driver = Driver::new(
        registry
            .create("loopback", &args(&["--memory-depth", "4096"]), None)
            .unwrap(),
    );
    driver.negotiate().unwrap();
    let large = driver.buffer_size();
    assert!(large >= (2 * 4096 + 1) * 4);
    driver.negotiate().unwrap();
    assert_eq!(driver.buffer_size(), large);
}

#[test]
fn shifts_over_loopback() {
    let registry = Registry::with_builtin_transports();
    for word_size in [4, 8, 16] {
        let word_size_arg = word_size.to_string();
        let options = args(&["--word-size", &word_size_arg, "--memory-depth", "64"]);
        let mut driver = Driver::new(registry.create("loopback", &options, None).unwrap());
        driver.negotiate().unwrap();
        let word_bits = 8 * word_size as u32;
        for bits in [1, 7, 8, 9, word_bits - 1, word_bits, word_bits + 1, 64 * word_bits] {
            assert_loops_back(&mut driver, bits);
        }
    }
}

#[test]
fn shifts_over_fifo() {
    let registry = Registry::with_builtin_transports();
    let mut driver = Driver::new(registry.create("fifoLoopback", &[], None).unwrap());
    assert_eq!(driver.negotiate().unwrap().word_size, 4);
    for bits in [1, 31, 32, 33, 4096] {
        assert_loops_back(&mut driver, bits);
    }
}

#[test]
fn shifts_over_udp() {
    let peer = UdpPeer::bind("127.0.0.1:0", Emulator::new(8, 256, Some(100)).unwrap()).unwrap();
    let target = peer.local_addr().unwrap().to_string();
    peer.spawn().unwrap();

    let registry = Registry::with_builtin_transports();
    let transport = registry
        .create("udp", &args(&["--timeout-ms", "2000"]), Some(&target))
        .unwrap();
    let mut driver = Driver::new(transport);
    let params = driver.negotiate().unwrap();
    assert_eq!(params.word_size, 8);
    assert_eq!(params.memory_depth, 256);

    // bounded by the MTU rather than the target memory
    let max = driver.max_vector_bits();
    assert!(max < 256 * 8 * 8);
    assert!(VectorLayout::new(max, 8).request_len() <= DEFAULT_MTU);
    for bits in [1, 63, 64, 65, max] {
        assert_loops_back(&mut driver, bits);
    }
}

#[test]
fn longest_datagram_fits_mtu() {
    for word_size in [16, 5] {
        let peer =
            UdpPeer::bind("127.0.0.1:0", Emulator::new(word_size, 1024, None).unwrap()).unwrap();
        let target = peer.local_addr().unwrap().to_string();
        peer.spawn().unwrap();

        let transport =
            UdpTransport::connect(&target, Duration::from_secs(2), DEFAULT_MTU).unwrap();
        let mut driver = Driver::new(transport);
        assert_eq!(driver.negotiate().unwrap().word_size, word_size);

        let max = driver.max_vector_bits();
        let request_len = VectorLayout::new(max, word_size).request_len();
        assert!(
            request_len <= DEFAULT_MTU,
            "word size {}: {} bytes",
            word_size,
            request_len
        );
        assert_loops_back(&mut driver, max);
    }
}

#[test]
fn lost_datagrams_are_recovered() {
    let mut peer = UdpPeer::bind("127.0.0.1:0", Emulator::new(4, 64, None).unwrap()).unwrap();
    peer.emulator_mut().set_test_mode(TestMode::DROP_REPLIES);
    let target = peer.local_addr().unwrap().to_string();
    peer.spawn().unwrap();

    let transport = UdpTransport::connect(&target, Duration::from_millis(50), DEFAULT_MTU).unwrap();
    let mut driver = Driver::new(transport);
    driver.negotiate().unwrap();
    for i in 0..300u32 {
        let tdi = [(i & 0xff) as u8, (i >> 8) as u8];
        let tdo = driver.shift(16, &[0, 0], &tdi).unwrap();
        assert_eq!(&tdo[..], &tdi);
    }
}

#[test]
fn info_dump() {
    let registry = Registry::with_builtin_transports();
    let options = args(&["--memory-depth", "512", "--period-ns", "500"]);
    let mut driver = Driver::new(registry.create("loopback", &options, None).unwrap());
    driver.negotiate().unwrap();
    let info = driver.info().to_string();
    assert!(info.contains("Word size:"));
    assert!(info.contains("2048"));
    assert!(info.contains("500"));
}
