//! JSON file state store.
//!
//! The record is written to a temporary file in the target directory and then
//! renamed over the old one, so a crash mid-write leaves either the previous
//! record or the new one on disk, never a torn file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::error::DivtraderError;
use crate::domain::forced_trade::ForcedTradeState;
use crate::ports::state_port::StatePort;

pub struct JsonStateAdapter {
    path: PathBuf,
}

impl JsonStateAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replace `path` with `bytes` via a sibling temporary file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DivtraderError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| DivtraderError::Io(e.error))?;
    Ok(())
}

impl StatePort for JsonStateAdapter {
    fn load(&self) -> Result<Option<ForcedTradeState>, DivtraderError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        let mut state: ForcedTradeState =
            serde_json::from_str(&content).map_err(|e| DivtraderError::StateCorrupt {
                file: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        state.repair();
        Ok(Some(state))
    }

    fn save(&self, state: &ForcedTradeState) -> Result<(), DivtraderError> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!(
            path = %self.path.display(),
            trade_id = %state.trade_id,
            active = state.active,
            "state saved"
        );
        Ok(())
    }
}
