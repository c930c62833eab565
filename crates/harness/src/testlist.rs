//! Testlist loading.
//!
//! A testlist is a JSON file produced by the build flow, one descriptor per
//! intended simulation:
//!
//! ```json
//! {
//!     "runs": [
//!         { "elf": "sw/build/alive.elf" },
//!         { "elf": "sw/build/multi_cluster.elf", "retcode": 3 },
//!         {
//!             "elf": "sw/build/dma_verify.elf",
//!             "name": "dma_verify",
//!             "cmd": ["./scripts/verify.sh", "{sim_bin}", "{elf}", "{run_dir}"],
//!             "simulators": ["questa", "vcs"]
//!         }
//!     ]
//! }
//! ```
//!
//! Descriptors are immutable inputs; the harness never writes them back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// One intended simulation, as described by the testlist.
#[derive(Debug, Clone, Deserialize)]
pub struct TestDescriptor {
    /// Path of the program binary to simulate.
    pub elf: PathBuf,

    /// Display name; the ELF file stem when absent.
    #[serde(default)]
    pub name: Option<String>,

    /// Expected application exit code; 0 when absent.
    #[serde(default)]
    pub retcode: Option<i32>,

    /// Custom command template, ordered argv tokens.
    ///
    /// Tokens may contain the placeholders `{sim_bin}`, `{elf}` and
    /// `{run_dir}`, substituted when the simulation is built. A custom
    /// command on a log-scraping backend is taken to perform its own
    /// verification, so its exit code is authoritative.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,

    /// Backend allow-list; a descriptor without one runs anywhere.
    #[serde(default)]
    pub simulators: Option<Vec<String>>,

    /// Run-directory override, replacing `<run_root>/<name>`.
    #[serde(default)]
    pub run_dir: Option<PathBuf>,
}

impl TestDescriptor {
    /// Name used in status lines and default run-directory paths.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.elf.file_stem().map_or_else(
            || self.elf.display().to_string(),
            |stem| stem.to_string_lossy().into_owned(),
        )
    }

    /// Expected application exit code, defaulting to 0.
    pub fn expected_retcode(&self) -> i32 {
        self.retcode.unwrap_or(0)
    }
}

/// A parsed testlist.
#[derive(Debug, Clone, Deserialize)]
pub struct Testlist {
    /// Descriptors in launch order.
    pub runs: Vec<TestDescriptor>,
}

impl Testlist {
    /// Loads a testlist from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| HarnessError::Testlist {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| HarnessError::TestlistParse {
            path: path.to_path_buf(),
            source,
        })
    }
}
