//! # Transport Registry
//!
//! Maps transport names to factories. Entries form an append-only list; a lookup
//! returns the last entry with a matching name, so a later registration (for example
//! from a plugin) shadows an earlier one.
//!
//! ```
//! use axis_jtag_driver::registry::Registry;
//!
//! let registry = Registry::with_builtin_transports();
//! assert!(registry.has("loopback"));
//! assert!(registry.create("udp", &[], None).is_err()); // needs a target
//! ```
use std::fmt::{Debug, Formatter};
use std::path::Path;

use crate::Transport;
use crate::error::{Error, Result};
use crate::plugin::Plugin;

type Factory = dyn Fn(&[String], &str) -> Result<Box<dyn Transport>>;
type Usage = dyn Fn() -> String;

/// One named transport: a factory, a help text and whether a target is mandatory.
pub struct RegistryEntry {
    name: String,
    factory: Box<Factory>,
    usage: Box<Usage>,
    needs_target: bool,
}

impl RegistryEntry {
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn(&[String], &str) -> Result<Box<dyn Transport>> + 'static,
        usage: impl Fn() -> String + 'static,
        needs_target: bool,
    ) -> RegistryEntry {
        RegistryEntry {
            name: name.into(),
            factory: Box::new(factory),
            usage: Box::new(usage),
            needs_target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn needs_target(&self) -> bool {
        self.needs_target
    }

    pub fn usage(&self) -> String {
        (self.usage)()
    }

    /// Calls the factory. `target` is empty when none was given.
    pub fn create(&self, args: &[String], target: &str) -> Result<Box<dyn Transport>> {
        (self.factory)(args, target)
    }
}

impl Debug for RegistryEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("needs_target", &self.needs_target)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct Registry {
    // Declared before `plugins`: entries may hold code from a plugin and must be
    // dropped before the library is unloaded.
    entries: Vec<RegistryEntry>,
    plugins: Vec<Plugin>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// A registry holding the transports of [`crate::transports`].
    pub fn with_builtin_transports() -> Registry {
        let mut registry = Registry::new();
        crate::transports::register_builtin(&mut registry);
        registry
    }

    pub fn register(&mut self, entry: RegistryEntry) {
        log::info!("Registering transport '{}'", entry.name());
        if self.has(entry.name()) {
            log::debug!("Transport '{}' shadows an earlier entry", entry.name());
        }
        self.entries.push(entry);
    }

    /// The last registered entry called `name`.
    pub fn find(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().rev().find(|entry| entry.name() == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Names in registration order. Shadowed names appear more than once.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(RegistryEntry::name).collect()
    }

    pub fn usage(&self, name: &str) -> Result<String> {
        self.lookup(name).map(RegistryEntry::usage)
    }

    /// Creates the transport registered as `name`.
    ///
    /// # Errors
    ///
    /// A configuration error if no entry matches, or if the entry needs a target
    /// and `target` is missing or empty.
    pub fn create(
        &self,
        name: &str,
        args: &[String],
        target: Option<&str>,
    ) -> Result<Box<dyn Transport>> {
        let entry = self.lookup(name)?;
        let target = target.unwrap_or("");
        if entry.needs_target() && target.is_empty() {
            return Err(Error::config(format!(
                "Transport '{}' requires a target (-t)",
                name
            )));
        }
        log::debug!("Creating transport '{}' with args {:?}", name, args);
        entry.create(args, target)
    }

    /// Loads a plugin and registers all of its transports.
    ///
    /// Returns the names that were registered, in order.
    pub fn load_plugin(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let plugin = Plugin::load(path)?;
        let entries = plugin.entries()?;
        // keep the library alive before any of its code is stored
        self.plugins.push(plugin);
        let names: Vec<String> = entries.iter().map(|e| e.name().to_string()).collect();
        for entry in entries {
            self.register(entry);
        }
        Ok(names)
    }

    /// Resolves a driver name to a registered transport name.
    ///
    /// Registered names resolve to themselves. Any other name is taken as the path of
    /// a plugin. After loading it, the name resolves to itself if the plugin registered
    /// it, otherwise to the last transport the plugin registered.
    pub fn resolve(&mut self, name: &str) -> Result<String> {
        if self.has(name) {
            return Ok(name.to_string());
        }
        log::info!("Transport '{}' not registered, loading it as a plugin", name);
        let names = self.load_plugin(name)?;
        if self.has(name) {
            return Ok(name.to_string());
        }
        names
            .last()
            .cloned()
            .ok_or_else(|| Error::config(format!("Plugin '{}' registered no transports", name)))
    }

    fn lookup(&self, name: &str) -> Result<&RegistryEntry> {
        self.find(name)
            .ok_or_else(|| Error::config(format!("No transport registered as '{}'", name)))
    }
}
