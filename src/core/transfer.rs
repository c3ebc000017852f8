/*!
 * Verified file copies
 *
 * Every copy carries content, permissions and timestamps. `copy_verified`
 * additionally rehashes the target and rejects it when it disagrees with the
 * digest captured when the file was staged.
 */

use std::fs;
use std::path::Path;

use fieldvault_core_manifest::calculate_checksum;
use tracing::{debug, error};

use super::metadata::preserve_metadata;
use crate::error::{FieldError, Result};

/// Copy `source` to `dest`, creating parent directories and preserving metadata
pub fn copy_preserving(source: &Path, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = fs::copy(source, dest)?;
    preserve_metadata(source, dest)?;
    debug!(
        "Copied {} -> {} ({} bytes)",
        source.display(),
        dest.display(),
        bytes
    );
    Ok(bytes)
}

/// Copy `origin` to `target` and check the copy against `expected_hash`
///
/// On mismatch the target is removed and a `CopyIntegrity` error is returned.
pub fn copy_verified(origin: &Path, target: &Path, expected_hash: &str) -> Result<()> {
    copy_preserving(origin, target)?;

    let actual = calculate_checksum(target)?;
    if actual != expected_hash {
        error!(
            "Integrity check failed for {}: expected {}, got {}",
            origin.display(),
            expected_hash,
            actual
        );
        if let Err(e) = fs::remove_file(target) {
            error!("Failed to remove bad copy {}: {}", target.display(), e);
        }
        return Err(FieldError::CopyIntegrity {
            origin: origin.to_path_buf(),
            expected: expected_hash.to_string(),
            actual,
        });
    }
    Ok(())
}
