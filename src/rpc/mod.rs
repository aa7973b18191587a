pub mod alloy_client;
pub mod client;
pub mod manager;
pub mod retry;

pub use alloy_client::AlloyConnector;
pub use client::{
    BlockSnapshot, BlockStream, ChainClient, ClientConnector, LogStream, ReceiptSnapshot,
    TxSnapshot,
};
pub use manager::{ConnectionState, RpcClientManager};
