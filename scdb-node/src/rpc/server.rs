use jsonrpsee::server::{ServerBuilder, ServerHandle};

use super::handlers::{ScdbRpcImpl, ScdbRpcServer};
use crate::error::NodeError;
use crate::node::LedgerService;

/// Start the JSON-RPC HTTP+WS server.
pub async fn start_rpc_server(
    addr: &str,
    max_connections: u32,
    service: LedgerService,
) -> Result<ServerHandle, NodeError> {
    let server = ServerBuilder::default()
        .max_connections(max_connections)
        .build(addr)
        .await
        .map_err(|e| NodeError::RpcError {
            reason: format!("failed to build RPC server: {}", e),
        })?;

    let local_addr = server.local_addr().map_err(|e| NodeError::RpcError {
        reason: format!("failed to read RPC listen address: {}", e),
    })?;

    let rpc_impl = ScdbRpcImpl { service };
    let handle = server.start(rpc_impl.into_rpc());

    tracing::info!(addr = %local_addr, "RPC server started");

    Ok(handle)
}
