//! JSON-RPC 2.0 message shapes shared by every transport.

mod types;

pub use types::{
    Inbound, JSONRPC_VERSION, METHOD_NOT_FOUND, RpcError, RpcRequest, RpcResponse, numeric_id,
};
