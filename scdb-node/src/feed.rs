//! Block feed: newline-delimited JSON describing connected and disconnected blocks.
//!
//! A connect line carries `{"height", "block_hash", "payloads": [hex], "state_root"?}`;
//! a disconnect line is `{"disconnect": height}`. Blank lines and lines starting
//! with `#` are skipped.

use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};

use scdb_types::primitives::{parse_hash_hex, Height};
use scdb_types::vote::BlockCommitments;

use crate::error::NodeError;

/// One connect line of a block feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedBlock {
    pub height: Height,
    pub block_hash: String,
    #[serde(default)]
    pub payloads: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_root: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedLine {
    Disconnect { disconnect: Height },
    Connect(FeedBlock),
}

/// A parsed feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEntry {
    Connect(BlockCommitments),
    Disconnect(Height),
}

impl FeedBlock {
    /// Convert into the ledger's block input, decoding every hex field.
    pub fn into_block(self) -> Result<BlockCommitments, String> {
        let block_hash = parse_hash_hex(&self.block_hash)?;
        let payloads = self
            .payloads
            .iter()
            .enumerate()
            .map(|(i, p)| {
                hex::decode(p.trim_start_matches("0x"))
                    .map_err(|e| format!("payload {}: invalid hex: {}", i, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let declared_root = self
            .state_root
            .as_deref()
            .map(parse_hash_hex)
            .transpose()?;
        Ok(BlockCommitments {
            height: self.height,
            block_hash,
            payloads,
            declared_root,
        })
    }

    pub fn from_block(block: &BlockCommitments) -> Self {
        Self {
            height: block.height,
            block_hash: hex::encode(block.block_hash),
            payloads: block.payloads.iter().map(hex::encode).collect(),
            state_root: block.declared_root.map(hex::encode),
        }
    }
}

/// Parse one feed line. `line_no` is 1-based and only used in errors.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<FeedEntry>, NodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let parsed: FeedLine = serde_json::from_str(trimmed).map_err(|e| NodeError::FeedError {
        line: line_no,
        reason: e.to_string(),
    })?;
    match parsed {
        FeedLine::Disconnect { disconnect } => Ok(Some(FeedEntry::Disconnect(disconnect))),
        FeedLine::Connect(block) => block
            .into_block()
            .map(|b| Some(FeedEntry::Connect(b)))
            .map_err(|reason| NodeError::FeedError {
                line: line_no,
                reason,
            }),
    }
}

/// Read every entry of a feed.
pub fn read_feed<R: BufRead>(reader: R) -> Result<Vec<FeedEntry>, NodeError> {
    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        if let Some(entry) = parse_line(&line?, i + 1)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Read a feed file.
pub fn read_feed_file(path: &Path) -> Result<Vec<FeedEntry>, NodeError> {
    let file = std::fs::File::open(path).map_err(|e| NodeError::FeedError {
        line: 0,
        reason: format!("failed to open '{}': {}", path.display(), e),
    })?;
    read_feed(std::io::BufReader::new(file))
}

/// Render a block as a feed line.
pub fn block_to_line(block: &BlockCommitments) -> Result<String, NodeError> {
    serde_json::to_string(&FeedBlock::from_block(block)).map_err(|e| NodeError::FeedError {
        line: 0,
        reason: e.to_string(),
    })
}
