use jsonrpsee::core::async_trait;
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::PendingSubscriptionSink;
use tokio::sync::broadcast::error::RecvError;

use scdb_ledger::{LedgerError, LedgerEvent};
use scdb_types::primitives::{parse_hash_hex, Hash};
use scdb_types::vote::{BlockCommitments, Vote, VoteTarget};

use super::types::{
    parse_bundle_vote_kind, BlockReceiptInfo, BundleInfo, CommitmentRecordInfo, CtipInfo,
    CustomVoteInfo, ProposalInfo, StateProofInfo, SubmitResult, TipInfo,
};
use crate::error::NodeError;
use crate::node::LedgerService;

/// Largest height range served by one `scdb_getCommitmentHistory` call.
pub const MAX_HISTORY_RANGE: u64 = 1_000;

/// JSON-RPC trait for the ledger node.
#[rpc(server)]
pub trait ScdbRpc {
    /// Connect the next block. Payloads are hex strings in declared order.
    #[method(name = "scdb_connectBlock")]
    async fn connect_block(
        &self,
        height: u64,
        block_hash: String,
        payloads: Vec<String>,
        state_root: Option<String>,
    ) -> Result<BlockReceiptInfo, ErrorObjectOwned>;

    /// Disconnect the tip block.
    #[method(name = "scdb_disconnectBlock")]
    async fn disconnect_block(&self, height: u64)
        -> Result<CommitmentRecordInfo, ErrorObjectOwned>;

    /// Get the chain tip and current state root.
    #[method(name = "scdb_getTip")]
    async fn get_tip(&self) -> Result<Option<TipInfo>, ErrorObjectOwned>;

    /// List active sidechains, one per occupied slot.
    #[method(name = "scdb_getActiveSidechains")]
    async fn get_active_sidechains(&self) -> Result<Vec<ProposalInfo>, ErrorObjectOwned>;

    /// List tracked proposals, optionally restricted to one slot.
    #[method(name = "scdb_getProposals")]
    async fn get_proposals(&self, slot: Option<u8>)
        -> Result<Vec<ProposalInfo>, ErrorObjectOwned>;

    /// Get the CTIP of a slot.
    #[method(name = "scdb_getCtip")]
    async fn get_ctip(&self, slot: u8) -> Result<Option<CtipInfo>, ErrorObjectOwned>;

    /// List Pending bundles of a slot.
    #[method(name = "scdb_getPendingBundles")]
    async fn get_pending_bundles(&self, slot: u8) -> Result<Vec<BundleInfo>, ErrorObjectOwned>;

    /// Commitment records with `from <= height <= to`.
    #[method(name = "scdb_getCommitmentHistory")]
    async fn get_commitment_history(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<CommitmentRecordInfo>, ErrorObjectOwned>;

    /// Inclusion proof of a Pending bundle when `bundle_hash` is given,
    /// otherwise of the slot's CTIP.
    #[method(name = "scdb_getStateProof")]
    async fn get_state_proof(
        &self,
        slot: u8,
        bundle_hash: Option<String>,
    ) -> Result<Option<StateProofInfo>, ErrorObjectOwned>;

    /// Cache an intent to ack a sidechain proposal.
    #[method(name = "scdb_cacheLocalAck")]
    async fn cache_local_ack(&self, proposal_hash: String)
        -> Result<SubmitResult, ErrorObjectOwned>;

    /// Drop a cached ack intent.
    #[method(name = "scdb_removeLocalAck")]
    async fn remove_local_ack(&self, proposal_hash: String)
        -> Result<SubmitResult, ErrorObjectOwned>;

    /// List cached ack intents.
    #[method(name = "scdb_getLocalAcks")]
    async fn get_local_acks(&self) -> Result<Vec<String>, ErrorObjectOwned>;

    /// Cache a bundle vote: "upvote", "downvote" or "abstain".
    #[method(name = "scdb_cacheCustomVote")]
    async fn cache_custom_vote(
        &self,
        slot: u8,
        bundle_hash: String,
        kind: String,
    ) -> Result<SubmitResult, ErrorObjectOwned>;

    /// Drop a cached bundle vote.
    #[method(name = "scdb_removeCustomVote")]
    async fn remove_custom_vote(&self, bundle_hash: String)
        -> Result<SubmitResult, ErrorObjectOwned>;

    /// List cached bundle votes.
    #[method(name = "scdb_getCustomVoteCache")]
    async fn get_custom_vote_cache(&self) -> Result<Vec<CustomVoteInfo>, ErrorObjectOwned>;

    /// Hex payloads this node would embed in its next block.
    #[method(name = "scdb_getVoteCommitments")]
    async fn get_vote_commitments(&self) -> Result<Vec<String>, ErrorObjectOwned>;

    /// Get node metrics in Prometheus text exposition format.
    #[method(name = "scdb_getMetrics")]
    async fn get_metrics(&self) -> Result<String, ErrorObjectOwned>;

    /// Subscribe to ledger events.
    #[subscription(name = "scdb_subscribeLedgerEvents" => "scdb_ledgerEvents", unsubscribe = "scdb_unsubscribeLedgerEvents", item = LedgerEvent)]
    async fn subscribe_ledger_events(&self) -> SubscriptionResult;
}

/// Implementation of the ScdbRpc trait.
pub struct ScdbRpcImpl {
    pub service: LedgerService,
}

fn invalid_params(msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32602, msg.into(), None::<()>)
}

/// Map a ledger error onto a JSON-RPC error object.
fn ledger_error(err: LedgerError) -> ErrorObjectOwned {
    let code = match err {
        LedgerError::HeightMismatch { .. } => -32010,
        LedgerError::ConsensusMismatch { .. } => -32011,
        LedgerError::ReorgDepthExceeded { .. } => -32012,
        LedgerError::Storage(_) => -32013,
        _ => -32000,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

/// Map a failed write through the ledger service.
fn write_error(err: NodeError) -> ErrorObjectOwned {
    match err {
        NodeError::LedgerError(e) => ledger_error(e),
        other => ErrorObjectOwned::owned(-32000, other.to_string(), None::<()>),
    }
}

fn parse_hash(name: &str, hex_str: &str) -> Result<Hash, ErrorObjectOwned> {
    parse_hash_hex(hex_str).map_err(|e| invalid_params(format!("{}: {}", name, e)))
}

fn changed(success: bool, reason: &str) -> SubmitResult {
    SubmitResult {
        success,
        reason: if success {
            None
        } else {
            Some(reason.to_string())
        },
    }
}

#[async_trait]
impl ScdbRpcServer for ScdbRpcImpl {
    async fn connect_block(
        &self,
        height: u64,
        block_hash: String,
        payloads: Vec<String>,
        state_root: Option<String>,
    ) -> Result<BlockReceiptInfo, ErrorObjectOwned> {
        let block_hash = parse_hash("block_hash", &block_hash)?;
        let payloads = payloads
            .iter()
            .map(|p| {
                hex::decode(p.trim_start_matches("0x"))
                    .map_err(|e| invalid_params(format!("invalid payload hex: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let declared_root = state_root
            .as_deref()
            .map(|r| parse_hash("state_root", r))
            .transpose()?;

        let block = BlockCommitments {
            height,
            block_hash,
            payloads,
            declared_root,
        };
        let receipt = self
            .service
            .connect_block(&block)
            .await
            .map_err(write_error)?;
        Ok(BlockReceiptInfo::from(&receipt))
    }

    async fn disconnect_block(
        &self,
        height: u64,
    ) -> Result<CommitmentRecordInfo, ErrorObjectOwned> {
        let record = self
            .service
            .disconnect_block(height)
            .await
            .map_err(write_error)?;
        Ok(CommitmentRecordInfo::from(&record))
    }

    async fn get_tip(&self) -> Result<Option<TipInfo>, ErrorObjectOwned> {
        let reader = self.service.reader();
        let state = reader.snapshot();
        Ok(state.tip.map(|tip| TipInfo {
            height: tip.height,
            block_hash: hex::encode(tip.block_hash),
            state_root: hex::encode(state.state_root()),
            oldest_undo_height: reader.oldest_undo_height(),
        }))
    }

    async fn get_active_sidechains(&self) -> Result<Vec<ProposalInfo>, ErrorObjectOwned> {
        Ok(self
            .service
            .reader()
            .active_sidechains()
            .iter()
            .map(ProposalInfo::from)
            .collect())
    }

    async fn get_proposals(
        &self,
        slot: Option<u8>,
    ) -> Result<Vec<ProposalInfo>, ErrorObjectOwned> {
        Ok(self
            .service
            .reader()
            .proposals(slot)
            .iter()
            .map(ProposalInfo::from)
            .collect())
    }

    async fn get_ctip(&self, slot: u8) -> Result<Option<CtipInfo>, ErrorObjectOwned> {
        Ok(self.service.reader().ctip(slot).as_ref().map(CtipInfo::from))
    }

    async fn get_pending_bundles(&self, slot: u8) -> Result<Vec<BundleInfo>, ErrorObjectOwned> {
        Ok(self
            .service
            .reader()
            .pending_bundles(slot)
            .iter()
            .map(BundleInfo::from)
            .collect())
    }

    async fn get_commitment_history(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<CommitmentRecordInfo>, ErrorObjectOwned> {
        if to.saturating_sub(from) >= MAX_HISTORY_RANGE {
            return Err(invalid_params(format!(
                "range too large, at most {} heights per call",
                MAX_HISTORY_RANGE
            )));
        }
        let records = self
            .service
            .reader()
            .commitment_history(from, to)
            .map_err(ledger_error)?;
        Ok(records.iter().map(CommitmentRecordInfo::from).collect())
    }

    async fn get_state_proof(
        &self,
        slot: u8,
        bundle_hash: Option<String>,
    ) -> Result<Option<StateProofInfo>, ErrorObjectOwned> {
        let reader = self.service.reader();
        let proof = match bundle_hash {
            Some(h) => {
                let hash = parse_hash("bundle_hash", &h)?;
                match reader.bundle(&hash) {
                    Some(b) if b.slot != slot => {
                        return Err(invalid_params(format!(
                            "bundle belongs to slot {}, not {}",
                            b.slot, slot
                        )))
                    }
                    _ => reader.bundle_proof(&hash),
                }
            }
            None => reader.ctip_proof(slot),
        };
        Ok(proof.map(|(root, proof)| StateProofInfo::new(&root, &proof)))
    }

    async fn cache_local_ack(
        &self,
        proposal_hash: String,
    ) -> Result<SubmitResult, ErrorObjectOwned> {
        let hash = parse_hash("proposal_hash", &proposal_hash)?;
        let added = self.service.reader().votes().cache_local_ack(hash);
        Ok(changed(added, "ack already cached"))
    }

    async fn remove_local_ack(
        &self,
        proposal_hash: String,
    ) -> Result<SubmitResult, ErrorObjectOwned> {
        let hash = parse_hash("proposal_hash", &proposal_hash)?;
        let removed = self.service.reader().votes().remove_local_ack(&hash);
        Ok(changed(removed, "ack not cached"))
    }

    async fn get_local_acks(&self) -> Result<Vec<String>, ErrorObjectOwned> {
        Ok(self
            .service
            .reader()
            .votes()
            .local_acks()
            .iter()
            .map(hex::encode)
            .collect())
    }

    async fn cache_custom_vote(
        &self,
        slot: u8,
        bundle_hash: String,
        kind: String,
    ) -> Result<SubmitResult, ErrorObjectOwned> {
        let bundle_hash = parse_hash("bundle_hash", &bundle_hash)?;
        let kind = parse_bundle_vote_kind(&kind).ok_or_else(|| {
            invalid_params(format!(
                "unknown vote kind '{}', expected 'upvote', 'downvote' or 'abstain'",
                kind
            ))
        })?;
        let reader = self.service.reader();
        let vote = Vote {
            target: VoteTarget::Bundle { slot, bundle_hash },
            kind,
            height: reader.tip().map(|t| t.height.saturating_add(1)).unwrap_or(0),
        };
        match reader.votes().cache_custom_vote(vote) {
            Ok(()) => Ok(changed(true, "")),
            Err(e) => Ok(SubmitResult {
                success: false,
                reason: Some(e.to_string()),
            }),
        }
    }

    async fn remove_custom_vote(
        &self,
        bundle_hash: String,
    ) -> Result<SubmitResult, ErrorObjectOwned> {
        let hash = parse_hash("bundle_hash", &bundle_hash)?;
        let removed = self.service.reader().votes().remove_custom_vote(&hash);
        Ok(changed(removed, "vote not cached"))
    }

    async fn get_custom_vote_cache(&self) -> Result<Vec<CustomVoteInfo>, ErrorObjectOwned> {
        Ok(self
            .service
            .reader()
            .votes()
            .custom_votes()
            .iter()
            .map(CustomVoteInfo::from)
            .collect())
    }

    async fn get_vote_commitments(&self) -> Result<Vec<String>, ErrorObjectOwned> {
        let payloads = self
            .service
            .reader()
            .vote_commitments()
            .map_err(ledger_error)?;
        Ok(payloads.iter().map(hex::encode).collect())
    }

    async fn get_metrics(&self) -> Result<String, ErrorObjectOwned> {
        Ok(self.service.metrics().encode())
    }

    async fn subscribe_ledger_events(&self, pending: PendingSubscriptionSink) -> SubscriptionResult {
        let mut rx = self.service.reader().subscribe();
        let sink = pending.accept().await?;

        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "ledger event subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                match jsonrpsee::SubscriptionMessage::from_json(&event) {
                    Ok(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scdb_ledger::codec;
    use scdb_ledger::ConsensusApplier;
    use scdb_types::bundle::BundlePayout;
    use scdb_types::params::ConsensusParams;
    use scdb_types::primitives::OutPoint;
    use scdb_types::sidechain::SidechainMetadata;
    use scdb_types::vote::VoteKind;

    fn rpc(params: ConsensusParams) -> ScdbRpcImpl {
        ScdbRpcImpl {
            service: LedgerService::new(ConsensusApplier::new(params)),
        }
    }

    fn small_params() -> ConsensusParams {
        ConsensusParams {
            required_acks: 1,
            ..ConsensusParams::default()
        }
    }

    fn block_hash(height: u64) -> String {
        hex::encode([height as u8; 32])
    }

    #[tokio::test]
    async fn test_connect_and_query() {
        let rpc = rpc(small_params());
        let metadata = SidechainMetadata {
            title: "thunder".to_string(),
            description: "payments".to_string(),
            version: 1,
        };
        let hash = codec::proposal_hash(&metadata).unwrap();
        let proposal = codec::encode_sidechain_proposal(0, &metadata).unwrap();
        let ack = codec::encode_ack(0, &hash, VoteKind::Ack).unwrap();

        let receipt = rpc
            .connect_block(1, block_hash(1), vec![hex::encode(proposal)], None)
            .await
            .unwrap();
        assert_eq!(receipt.applied, 1);
        let receipt = rpc
            .connect_block(2, block_hash(2), vec![hex::encode(ack)], None)
            .await
            .unwrap();
        assert_eq!(receipt.transitions.len(), 1);

        let active = rpc.get_active_sidechains().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "thunder");
        assert_eq!(active[0].status, "active");

        let tip = rpc.get_tip().await.unwrap().unwrap();
        assert_eq!(tip.height, 2);

        let history = rpc.get_commitment_history(1, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].state_root, tip.state_root);
    }

    #[tokio::test]
    async fn test_bad_hex_is_invalid_params() {
        let rpc = rpc(small_params());
        let err = rpc
            .connect_block(1, "nothex".to_string(), vec![], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn test_height_gap_maps_to_ledger_code() {
        let rpc = rpc(small_params());
        rpc.connect_block(1, block_hash(1), vec![], None)
            .await
            .unwrap();
        let err = rpc
            .connect_block(5, block_hash(5), vec![], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32010);

        let err = rpc.disconnect_block(4).await.unwrap_err();
        assert_eq!(err.code(), -32010);
        rpc.disconnect_block(1).await.unwrap();
        assert!(rpc.get_tip().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vote_cache_roundtrip() {
        let rpc = rpc(small_params());
        let bundle = hex::encode([9u8; 32]);

        let res = rpc
            .cache_custom_vote(3, bundle.clone(), "sideways".to_string())
            .await;
        assert!(res.is_err());

        let res = rpc
            .cache_custom_vote(3, bundle.clone(), "upvote".to_string())
            .await
            .unwrap();
        assert!(res.success);
        let cached = rpc.get_custom_vote_cache().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].kind, "upvote");

        // Bundle is not pending, so nothing is emitted.
        assert!(rpc.get_vote_commitments().await.unwrap().is_empty());

        assert!(rpc.remove_custom_vote(bundle.clone()).await.unwrap().success);
        assert!(!rpc.remove_custom_vote(bundle).await.unwrap().success);

        let ack = hex::encode([1u8; 32]);
        assert!(rpc.cache_local_ack(ack.clone()).await.unwrap().success);
        assert!(!rpc.cache_local_ack(ack.clone()).await.unwrap().success);
        assert_eq!(rpc.get_local_acks().await.unwrap(), vec![ack.clone()]);
        assert!(rpc.remove_local_ack(ack).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_state_proof_for_pending_bundle() {
        let params = small_params();
        let rpc = rpc(params);
        let metadata = SidechainMetadata {
            title: "zside".to_string(),
            description: String::new(),
            version: 1,
        };
        let hash = codec::proposal_hash(&metadata).unwrap();
        let payloads = vec![
            codec::encode_sidechain_proposal(2, &metadata).unwrap(),
            codec::encode_ack(2, &hash, VoteKind::Ack).unwrap(),
        ];
        rpc.connect_block(
            1,
            block_hash(1),
            payloads.iter().map(hex::encode).collect(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(rpc.get_active_sidechains().await.unwrap().len(), 1);

        let bundle_hash = [7u8; 32];
        let payout = BundlePayout {
            outpoint: OutPoint::new([8u8; 32], 0),
            amount: 5_000,
        };
        let proposal = codec::encode_bundle_proposal(2, &bundle_hash, &payout).unwrap();
        rpc.connect_block(2, block_hash(2), vec![hex::encode(proposal)], None)
            .await
            .unwrap();

        let pending = rpc.get_pending_bundles(2).await.unwrap();
        assert_eq!(pending.len(), 1);

        let proof = rpc
            .get_state_proof(2, Some(hex::encode(bundle_hash)))
            .await
            .unwrap()
            .unwrap();
        let tip = rpc.get_tip().await.unwrap().unwrap();
        assert_eq!(proof.state_root, tip.state_root);
        assert_eq!(proof.leaf_count, 1);

        assert!(rpc
            .get_state_proof(3, Some(hex::encode(bundle_hash)))
            .await
            .is_err());
        assert!(rpc.get_state_proof(2, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_range_limit() {
        let rpc = rpc(small_params());
        assert!(rpc.get_commitment_history(0, 5_000).await.is_err());
        assert!(rpc.get_commitment_history(0, 10).await.unwrap().is_empty());
    }
}
