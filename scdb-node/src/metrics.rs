use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use scdb_ledger::{BlockReceipt, StateReader};

/// Node-wide Prometheus metrics.
pub struct NodeMetrics {
    pub tip_height: Gauge,
    pub active_sidechains: Gauge,
    pub pending_bundles: Gauge,
    pub blocks_connected: Counter,
    pub blocks_disconnected: Counter,
    pub commitments_dropped: Counter,
    pub registry: Registry,
}

impl NodeMetrics {
    /// Create a new metrics registry with all node metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let tip_height = Gauge::default();
        let active_sidechains = Gauge::default();
        let pending_bundles = Gauge::default();
        let blocks_connected = Counter::default();
        let blocks_disconnected = Counter::default();
        let commitments_dropped = Counter::default();

        registry.register(
            "scdb_tip_height",
            "Height of the last applied block",
            tip_height.clone(),
        );
        registry.register(
            "scdb_active_sidechains",
            "Number of active sidechains",
            active_sidechains.clone(),
        );
        registry.register(
            "scdb_pending_bundles",
            "Number of pending withdrawal bundles",
            pending_bundles.clone(),
        );
        registry.register(
            "scdb_blocks_connected",
            "Total blocks connected",
            blocks_connected.clone(),
        );
        registry.register(
            "scdb_blocks_disconnected",
            "Total blocks disconnected",
            blocks_disconnected.clone(),
        );
        registry.register(
            "scdb_commitments_dropped",
            "Total commitments dropped as malformed or rejected",
            commitments_dropped.clone(),
        );

        Self {
            tip_height,
            active_sidechains,
            pending_bundles,
            blocks_connected,
            blocks_disconnected,
            commitments_dropped,
            registry,
        }
    }

    /// Account for a connected block.
    pub fn record_connect(&self, receipt: &BlockReceipt) {
        self.blocks_connected.inc();
        self.commitments_dropped.inc_by(receipt.dropped as u64);
    }

    /// Set the gauges from the latest published state.
    pub fn refresh(&self, reader: &StateReader) {
        let state = reader.snapshot();
        let height = state.tip.map(|t| t.height).unwrap_or(0);
        self.tip_height.set(i64::try_from(height).unwrap_or(i64::MAX));
        self.active_sidechains
            .set(state.registry.active_sidechains().len() as i64);
        self.pending_bundles
            .set(state.bundles.pending().count() as i64);
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buf, &self.registry) {
            tracing::warn!("failed to encode metrics: {}", e);
        }
        buf
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
