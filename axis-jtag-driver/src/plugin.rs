//! # Transport Plugins
//!
//! A plugin is a shared library, built against this crate with the same toolchain,
//! that exports the symbol [`REGISTRATION_SYMBOL`]. Loading a plugin does not touch
//! any registry; the caller asks it for its entries and registers them.
//!
//! A plugin crate (with `crate-type = ["cdylib"]`) declares its transports with
//! [`export_transports!`](crate::export_transports):
//!
//! ```ignore
//! axis_jtag_driver::export_transports!(|| vec![
//!     RegistryEntry::new("myFifo", my_fifo::create, my_fifo::usage, false),
//! ]);
//! ```
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::error::{Error, Result};
use crate::registry::RegistryEntry;

/// Name of the registration function every plugin exports.
pub const REGISTRATION_SYMBOL: &[u8] = b"axis_jtag_transports";

/// Signature of the registration function.
pub type RegistrationFn = fn() -> Vec<RegistryEntry>;

/// Exports the registration function of a plugin.
#[macro_export]
macro_rules! export_transports {
    ($entries:expr) => {
        #[unsafe(no_mangle)]
        pub fn axis_jtag_transports() -> ::std::vec::Vec<$crate::registry::RegistryEntry> {
            ($entries)()
        }
    };
}

#[derive(Debug)]
pub struct Plugin {
    path: PathBuf,
    library: Library,
}

impl Plugin {
    pub fn load(path: impl AsRef<Path>) -> Result<Plugin> {
        let path = path.as_ref();
        log::info!("Loading transport plugin {}", path.display());
        // SAFETY: initialisers of the library run here; plugins are trusted code
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::config(format!("Unable to load requested driver: {}", e)))?;
        let plugin = Plugin {
            path: path.to_path_buf(),
            library,
        };
        // fail early rather than on the first call to `entries`
        plugin.registration()?;
        Ok(plugin)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Calls the registration function of the plugin.
    ///
    /// Entries hold code from the library and must not outlive this plugin.
    pub fn entries(&self) -> Result<Vec<RegistryEntry>> {
        let register = self.registration()?;
        Ok(register())
    }

    fn registration(&self) -> Result<RegistrationFn> {
        // SAFETY: the symbol is generated by `export_transports!` with this signature
        let symbol: Symbol<RegistrationFn> =
            unsafe { self.library.get(REGISTRATION_SYMBOL) }.map_err(|e| {
                Error::config(format!(
                    "{} is not a transport plugin: {}",
                    self.path.display(),
                    e
                ))
            })?;
        Ok(*symbol)
    }
}
