use crate::{
    config::{Config, ReplaceStrategy},
    error::ReplaceError,
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::{NamedTempFile, PersistError};
use tracing::{debug, error, warn};

const TEMP_PREFIX: &str = ".srcshrink-";
const TEMP_SUFFIX: &str = ".tmp";

/// Overwrites original files with transformed text through a verified temporary file.
#[derive(Debug, Clone)]
pub struct SafeReplacer {
    strategy: ReplaceStrategy,
    scratch_dir: Option<PathBuf>,
}

impl SafeReplacer {
    /// Creates a replacer from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            strategy: config.replace_strategy,
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    /// Creates a replacer with an explicit strategy and scratch location.
    #[must_use]
    pub const fn with_strategy(strategy: ReplaceStrategy, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            strategy,
            scratch_dir,
        }
    }

    /// Replaces the content of `original` with `new_text`.
    ///
    /// # Process
    ///
    /// 1. Creates a uniquely named temporary file (next to the original
    ///    unless a scratch directory is configured)
    /// 2. Writes and syncs the full text
    /// 3. Refuses a zero-byte result; the original is not touched
    /// 4. Copies the original's permissions onto the temporary file
    /// 5. Moves the temporary file into place, either by a single rename
    ///    over the original or, for [`ReplaceStrategy::DeleteThenRename`],
    ///    by deleting the original first
    ///
    /// The temporary file is removed on every failure path except a failed
    /// move after the original was deleted, where it is kept for recovery.
    ///
    /// # Errors
    ///
    /// Returns the [`ReplaceError`] of the first step that failed.
    /// `MoveFailed { data_loss: true }` means the original was deleted and
    /// the new content never landed.
    pub fn replace(&self, original: &Path, new_text: &str) -> Result<(), ReplaceError> {
        let mut temp = self.create_temp(original)?;

        write_synced(&mut temp, new_text).map_err(|e| ReplaceError::Write {
            message: e.to_string(),
        })?;

        let written = temp
            .as_file()
            .metadata()
            .map_err(|e| ReplaceError::Write {
                message: e.to_string(),
            })?
            .len();

        if written == 0 {
            return Err(ReplaceError::EmptyOutput);
        }

        copy_permissions(original, temp.path());

        match self.strategy {
            ReplaceStrategy::Atomic => {
                temp.persist(original)
                    .map_err(|e| ReplaceError::MoveFailed {
                        message: e.error.to_string(),
                        data_loss: false,
                        kept: None,
                    })?;
            }
            ReplaceStrategy::DeleteThenRename => {
                fs::remove_file(original).map_err(|e| ReplaceError::DeleteFailed {
                    message: e.to_string(),
                })?;

                temp.persist(original).map_err(keep_after_data_loss)?;
            }
        }

        debug!("Replaced {} ({} bytes)", original.display(), written);
        Ok(())
    }

    fn create_temp(&self, original: &Path) -> Result<NamedTempFile, ReplaceError> {
        let dir = match self.scratch_dir {
            Some(ref dir) => dir.as_path(),
            None => original
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new(".")),
        };

        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| ReplaceError::TempFile {
                message: format!("{}: {e}", dir.display()),
            })
    }
}

/// The original is gone, so the temporary file is the only copy left; keep it.
fn keep_after_data_loss(err: PersistError) -> ReplaceError {
    let message = err.error.to_string();
    let kept = match err.file.keep() {
        Ok((_, path)) => {
            error!("New content for the lost file kept at {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("Could not keep temporary file: {}", e.error);
            None
        }
    };

    ReplaceError::MoveFailed {
        message,
        data_loss: true,
        kept,
    }
}

fn write_synced(temp: &mut NamedTempFile, text: &str) -> std::io::Result<()> {
    temp.write_all(text.as_bytes())?;
    temp.flush()?;
    temp.as_file().sync_all()
}

/// Gives the replacement the original's mode; a temp file starts out owner-only.
fn copy_permissions(original: &Path, temp: &Path) {
    let permissions = match fs::metadata(original) {
        Ok(metadata) => metadata.permissions(),
        Err(e) => {
            warn!("Cannot read permissions of {}: {}", original.display(), e);
            return;
        }
    };

    if let Err(e) = fs::set_permissions(temp, permissions) {
        warn!("Cannot copy permissions to {}: {}", temp.display(), e);
    }
}
