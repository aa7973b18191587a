use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{B256, U256};
use bigdecimal::BigDecimal;
use chrono::DateTime;

use crate::chains::ChainRegistry;
use crate::error::MonitorError;
use crate::indexer::classifier::{classify_parts, fetch_tx_and_receipt};
use crate::indexer::types::EnrichedTransaction;
use crate::rpc::RpcClientManager;

/// On-demand enrichment: classification merged with block and gas data.
///
/// Read-only. The caller decides whether to store the result.
pub struct EnrichmentOrchestrator {
    registry: Arc<ChainRegistry>,
    clients: Arc<RpcClientManager>,
}

/// `raw / 10^decimals` without going through floating point.
pub fn to_native_units(raw: U256, decimals: u8) -> BigDecimal {
    BigDecimal::from_str(&format!("{}E-{}", raw, decimals))
        .map(|v| v.normalized())
        .unwrap_or_default()
}

impl EnrichmentOrchestrator {
    pub fn new(registry: Arc<ChainRegistry>, clients: Arc<RpcClientManager>) -> Self {
        Self { registry, clients }
    }

    pub async fn enrich(
        &self,
        tx_hash: B256,
        chain_key: &str,
    ) -> Result<EnrichedTransaction, MonitorError> {
        let chain = self.registry.require(chain_key)?;
        let (tx, receipt) = fetch_tx_and_receipt(&self.clients, tx_hash, chain_key).await?;

        let block_number = tx
            .block_number
            .ok_or_else(|| MonitorError::not_found("block for transaction", tx_hash))?;
        let block = {
            let client = self.clients.acquire(chain_key).await?;
            match client.block(block_number).await {
                Ok(block) => block,
                Err(e) => {
                    if e.is_connection_failure() {
                        self.clients.invalidate(chain_key).await?;
                    }
                    return Err(e);
                }
            }
        };

        let classified = classify_parts(&tx, &receipt.logs);

        let decimals = chain.native_currency.decimals;
        let gas_fee = U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price);

        tracing::debug!(
            chain = %chain_key,
            tx_hash = %tx_hash,
            block = block_number,
            activity = %classified.base_type,
            "Enriched transaction"
        );

        Ok(EnrichedTransaction {
            tx_hash,
            chain: chain.key.clone(),
            chain_name: chain.name.clone(),
            block_number,
            timestamp: DateTime::from_timestamp(block.timestamp as i64, 0).unwrap_or_default(),
            from: tx.from,
            to: tx.to,
            native_value: to_native_units(tx.value, decimals),
            native_symbol: chain.native_currency.symbol.clone(),
            gas_used: receipt.gas_used,
            gas_fee_native: to_native_units(gas_fee, decimals),
            usd_value: None,
            gas_fee_usd: None,
            activity_type: classified.base_type,
            sub_type: classified.sub_type,
            token_transfers: classified.token_transfers,
            decoded_events: classified.decoded_events,
            project_tag: None,
        })
    }
}
