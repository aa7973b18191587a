//! Transaction intent classification from call data and receipt logs.

use std::sync::Arc;

use alloy::primitives::{Address, Log, B256};

use super::decoder::{Movement, STANDARDS};
use super::selectors::match_selector;
use super::types::{BaseType, ClassifiedResult, DecodedEvent, SubType, TokenTransfer};
use crate::error::MonitorError;
use crate::rpc::{ReceiptSnapshot, RpcClientManager, TxSnapshot};

pub struct TransactionClassifier {
    clients: Arc<RpcClientManager>,
}

impl TransactionClassifier {
    pub fn new(clients: Arc<RpcClientManager>) -> Self {
        Self { clients }
    }

    /// Fetch the transaction and its receipt and classify them.
    pub async fn classify(
        &self,
        tx_hash: B256,
        chain_key: &str,
    ) -> Result<ClassifiedResult, MonitorError> {
        let (tx, receipt) = fetch_tx_and_receipt(&self.clients, tx_hash, chain_key).await?;
        let result = classify_parts(&tx, &receipt.logs);

        tracing::debug!(
            chain = %chain_key,
            tx_hash = %tx_hash,
            base_type = %result.base_type,
            sub_type = ?result.sub_type,
            transfers = result.token_transfers.len(),
            "Classified transaction"
        );

        Ok(result)
    }
}

/// Fetch a transaction and its receipt from the chain's current client.
/// A transport failure drops the cached client before propagating.
pub(crate) async fn fetch_tx_and_receipt(
    clients: &RpcClientManager,
    tx_hash: B256,
    chain_key: &str,
) -> Result<(TxSnapshot, ReceiptSnapshot), MonitorError> {
    let client = clients.acquire(chain_key).await?;

    let fetched = async {
        let tx = client.transaction(tx_hash).await?;
        let receipt = client.receipt(tx_hash).await?;
        Ok::<_, MonitorError>((tx, receipt))
    }
    .await;

    if let Err(e) = &fetched {
        if e.is_connection_failure() {
            clients.invalidate(chain_key).await?;
        }
    }
    fetched
}

/// Classify a fetched transaction. Pure: the same inputs always give the
/// same result.
///
/// Deployment and plain native transfers short-circuit. Otherwise every log
/// is tried against each token standard in order; the first standard that
/// decodes a log records the event, and value-moving events set the type.
/// Call-data selectors are consulted only if no log did.
pub fn classify_parts(tx: &TxSnapshot, logs: &[Log]) -> ClassifiedResult {
    if tx.to.is_none() {
        return ClassifiedResult::with_type(SubType::ContractDeployment);
    }
    if tx.input.is_empty() && !tx.value.is_zero() {
        return ClassifiedResult::with_type(SubType::NativeTransfer);
    }

    let mut result = ClassifiedResult::unknown();

    for log in logs {
        let Some(event) = STANDARDS.iter().find_map(|(_, decode)| decode(log)) else {
            continue;
        };

        if let Some(movement) = &event.movement {
            apply_movement(&mut result, log.address, movement);
        }

        result.decoded_events.push(DecodedEvent {
            name: event.name.to_string(),
            standard: event.standard.as_str(),
            args: event.args,
            emitting_address: log.address,
        });
    }

    if result.base_type == BaseType::Unknown {
        if let Some(sub_type) = match_selector(&tx.input) {
            result.set_type(sub_type);
        }
    }

    result
}

fn apply_movement(result: &mut ClassifiedResult, token: Address, movement: &Movement) {
    match movement {
        Movement::Fungible { from, to, value } => {
            result.set_type(SubType::Erc20Transfer);
            result.token_transfers.push(TokenTransfer {
                token,
                amount: value.to_string(),
                from: *from,
                to: *to,
                token_id: None,
            });
        }
        Movement::NonFungible { from, to, token_id } => {
            result.set_type(if from.is_zero() {
                SubType::NftMint
            } else {
                SubType::NftTransfer
            });
            result.token_transfers.push(TokenTransfer {
                token,
                amount: "1".to_string(),
                from: *from,
                to: *to,
                token_id: Some(token_id.to_string()),
            });
        }
        Movement::MultiToken { from, to, items } => {
            result.set_type(SubType::NftTransfer);
            result
                .token_transfers
                .extend(items.iter().map(|(id, value)| TokenTransfer {
                    token,
                    amount: value.to_string(),
                    from: *from,
                    to: *to,
                    token_id: Some(id.to_string()),
                }));
        }
    }
}
