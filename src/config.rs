//! Module `config` holds the engine parameters that used to live in a
//! global key-value store. A [Params] value is loaded from a TOML file
//! (or built with the `set_*` methods) and passed explicitly to
//! partitions and tables.

use serde::Deserialize;

use std::{ffi, path};

use crate::{util, Result};

/// Engine configuration, explicit replacement for global parameters.
///
/// ```toml
/// cache_directory = "/var/tmp/colbit"
/// verbose = 2
/// threads = 8
/// disable_index_on_failure = ["trades.price"]
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct Params {
    /// Scratch directory for out-of-core merge files. Defaults to the
    /// platform cache directory.
    pub cache_directory: Option<path::PathBuf>,
    /// Log verbosity threshold, mirrored into the `log` filter by the
    /// embedding application.
    #[serde(default)]
    pub verbose: u8,
    /// Upper bound on worker threads for partition fan-out.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// `"partition.column"` entries for which a failed index build
    /// marks the column no-index instead of retrying on next query.
    #[serde(default)]
    pub disable_index_on_failure: Vec<String>,
}

fn default_threads() -> usize {
    num_cpus::get()
}

impl Default for Params {
    fn default() -> Params {
        Params {
            cache_directory: None,
            verbose: 0,
            threads: num_cpus::get(),
            disable_index_on_failure: Vec::default(),
        }
    }
}

impl Params {
    /// Load parameters from a TOML file.
    pub fn from_file<P>(loc: P) -> Result<Params>
    where
        P: AsRef<path::Path>,
    {
        util::load_toml(loc)
    }

    pub fn set_cache_directory(&mut self, dir: &ffi::OsStr) -> &mut Self {
        self.cache_directory = Some(path::PathBuf::from(dir));
        self
    }

    pub fn set_verbose(&mut self, verbose: u8) -> &mut Self {
        self.verbose = verbose;
        self
    }

    pub fn set_threads(&mut self, threads: usize) -> &mut Self {
        self.threads = threads;
        self
    }

    pub fn set_disable_index_on_failure(&mut self, part: &str, col: &str) -> &mut Self {
        self.disable_index_on_failure.push(format!("{}.{}", part, col));
        self
    }

    /// Scratch directory for out-of-core sorting, falling back to the
    /// platform cache dir; `None` means scratch next to the data.
    pub fn to_cache_dir(&self) -> Option<path::PathBuf> {
        match &self.cache_directory {
            Some(dir) => Some(dir.clone()),
            None => dirs::cache_dir().map(|d| d.join("colbit")),
        }
    }

    pub fn is_index_disabled_on_failure(&self, part: &str, col: &str) -> bool {
        let key = format!("{}.{}", part, col);
        self.disable_index_on_failure.iter().any(|e| e == &key)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
