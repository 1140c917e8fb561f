use std::path::Path;

use scdb_ledger::StateReader;
use scdb_types::record::LedgerImage;

use crate::error::NodeError;

/// Write the latest ledger state to `path` as pretty-printed JSON.
pub fn export(reader: &StateReader, path: &Path) -> Result<LedgerImage, NodeError> {
    let image = reader.image();
    let json = serde_json::to_string_pretty(&image).map_err(|e| NodeError::CheckpointError {
        reason: format!("failed to serialize checkpoint: {}", e),
    })?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json)?;
    tracing::info!(
        path = %path.display(),
        tip = ?image.tip.map(|t| t.height),
        proposals = image.proposals.len(),
        bundles = image.bundles.len(),
        "exported ledger checkpoint"
    );
    Ok(image)
}

/// Read a checkpoint written by [`export`].
pub fn load(path: &Path) -> Result<LedgerImage, NodeError> {
    let contents = std::fs::read_to_string(path).map_err(|e| NodeError::CheckpointError {
        reason: format!("failed to read checkpoint '{}': {}", path.display(), e),
    })?;
    serde_json::from_str(&contents).map_err(|e| NodeError::CheckpointError {
        reason: format!("failed to parse checkpoint '{}': {}", path.display(), e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scdb_ledger::ConsensusApplier;
    use scdb_types::vote::BlockCommitments;

    #[test]
    fn test_export_then_load() {
        let mut applier = ConsensusApplier::new(Default::default());
        applier
            .apply_block(&BlockCommitments {
                height: 10,
                block_hash: [4u8; 32],
                payloads: vec![],
                declared_root: None,
            })
            .unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("checkpoint.json");
        let exported = export(&applier.reader(), &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, exported);
        assert_eq!(loaded.tip.map(|t| t.height), Some(10));
    }

    #[test]
    fn test_load_garbage_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load(&path),
            Err(NodeError::CheckpointError { .. })
        ));
    }
}
