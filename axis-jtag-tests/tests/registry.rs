use axis_jtag_driver::{
    Transport,
    driver::Driver,
    emulator::Emulator,
    error::{Error, ErrorKind},
    registry::{Registry, RegistryEntry},
};
use axis_jtag_tests::{ScriptedTransport, args};
use pretty_assertions::assert_eq;

fn scripted_entry(name: &str, word_size: usize, needs_target: bool) -> RegistryEntry {
    RegistryEntry::new(
        name,
        move |_: &[String], _: &str| -> Result<Box<dyn Transport>, Error> {
            let emulator = Emulator::new(word_size, 16, None)?;
            Ok(Box::new(ScriptedTransport::new(emulator)))
        },
        move || format!("scripted target with word size {}", word_size),
        needs_target,
    )
}

#[test]
fn later_registration_wins() {
    let mut registry = Registry::with_builtin_transports();
    registry.register(scripted_entry("loopback", 8, false));

    assert_eq!(
        registry.usage("loopback").unwrap(),
        "scripted target with word size 8"
    );
    let transport = registry.create("loopback", &[], None).unwrap();
    let mut driver = Driver::new(transport);
    assert_eq!(driver.negotiate().unwrap().word_size, 8);
}

#[test]
fn shadowing_keeps_registration_order() {
    let mut registry = Registry::new();
    registry.register(scripted_entry("a", 4, false));
    registry.register(scripted_entry("b", 4, false));
    registry.register(scripted_entry("a", 8, false));
    assert_eq!(registry.names(), vec!["a", "b", "a"]);
    assert_eq!(
        registry.find("a").map(RegistryEntry::usage),
        Some("scripted target with word size 8".to_string())
    );
}

#[test]
fn target_is_enforced() {
    let mut registry = Registry::new();
    registry.register(scripted_entry("remote", 4, true));

    let err = registry.create("remote", &[], Some("")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(registry.create("remote", &[], Some("host")).is_ok());
}

#[test]
fn unknown_transport_is_a_config_error() {
    let registry = Registry::with_builtin_transports();
    let err = registry.create("jtagFifo", &[], None).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn unloadable_plugin_is_a_config_error() {
    let mut registry = Registry::with_builtin_transports();
    let err = registry.resolve("./libno_such_transport.so").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    // a failed load registers nothing
    assert_eq!(registry.names(), vec!["loopback", "fifoLoopback", "udp"]);
}

#[test]
fn transport_options_are_validated() {
    let registry = Registry::with_builtin_transports();
    let err = registry
        .create("loopback", &args(&["--word-size", "0"]), None)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
    let err = registry
        .create("udp", &args(&["--mtu", "8"]), Some("127.0.0.1"))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}
