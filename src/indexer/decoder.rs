//! Best-effort decoding of logs against the token standards.
//!
//! Each standard is an entry in [`STANDARDS`]; adding a standard means adding
//! a row, not a branch. A log may legitimately fail every standard.

use alloy::primitives::{Address, Log, U256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde_json::json;

use super::types::to_hex;

sol! {
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }

    interface IERC721 {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
        event Approval(address indexed owner, address indexed approved, uint256 indexed tokenId);
        event ApprovalForAll(address indexed owner, address indexed operator, bool approved);
    }

    interface IERC1155 {
        event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
        event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values);
        event ApprovalForAll(address indexed account, address indexed operator, bool approved);
        event URI(string value, uint256 indexed id);
    }
}

/// Which standard a log decoded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standard {
    Erc20,
    Erc721,
    Erc1155,
}

impl Standard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc20 => "ERC20",
            Self::Erc721 => "ERC721",
            Self::Erc1155 => "ERC1155",
        }
    }
}

/// The value-moving part of a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Movement {
    Fungible {
        from: Address,
        to: Address,
        value: U256,
    },
    NonFungible {
        from: Address,
        to: Address,
        token_id: U256,
    },
    /// One `(id, value)` pair per moved token; single transfers have one.
    MultiToken {
        from: Address,
        to: Address,
        items: Vec<(U256, U256)>,
    },
}

/// A log successfully decoded under one standard.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardEvent {
    pub standard: Standard,
    pub name: &'static str,
    pub args: serde_json::Value,
    /// `None` for approvals and metadata events.
    pub movement: Option<Movement>,
}

pub type DecodeFn = fn(&Log) -> Option<StandardEvent>;

/// Decoders in the order they are attempted.
pub const STANDARDS: &[(Standard, DecodeFn)] = &[
    (Standard::Erc20, decode_erc20),
    (Standard::Erc721, decode_erc721),
    (Standard::Erc1155, decode_erc1155),
];

fn topic_count(log: &Log) -> usize {
    log.data.topics().len()
}

fn first_topic(log: &Log) -> Option<alloy::primitives::B256> {
    log.data.topics().first().copied()
}

/// ERC-20: `Transfer` / `Approval` with three topics and one data word.
pub fn decode_erc20(log: &Log) -> Option<StandardEvent> {
    if topic_count(log) != 3 {
        return None;
    }
    let sig = first_topic(log)?;

    if sig == IERC20::Transfer::SIGNATURE_HASH {
        let decoded = IERC20::Transfer::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc20,
            name: "Transfer",
            args: json!({
                "from": to_hex(decoded.from.as_slice()),
                "to": to_hex(decoded.to.as_slice()),
                "value": decoded.value.to_string(),
            }),
            movement: Some(Movement::Fungible {
                from: decoded.from,
                to: decoded.to,
                value: decoded.value,
            }),
        })
    } else if sig == IERC20::Approval::SIGNATURE_HASH {
        let decoded = IERC20::Approval::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc20,
            name: "Approval",
            args: json!({
                "owner": to_hex(decoded.owner.as_slice()),
                "spender": to_hex(decoded.spender.as_slice()),
                "value": decoded.value.to_string(),
            }),
            movement: None,
        })
    } else {
        None
    }
}

/// ERC-721: the token id is indexed, so transfers carry four topics.
pub fn decode_erc721(log: &Log) -> Option<StandardEvent> {
    let sig = first_topic(log)?;

    if sig == IERC721::Transfer::SIGNATURE_HASH && topic_count(log) == 4 {
        let decoded = IERC721::Transfer::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc721,
            name: "Transfer",
            args: json!({
                "from": to_hex(decoded.from.as_slice()),
                "to": to_hex(decoded.to.as_slice()),
                "tokenId": decoded.tokenId.to_string(),
            }),
            movement: Some(Movement::NonFungible {
                from: decoded.from,
                to: decoded.to,
                token_id: decoded.tokenId,
            }),
        })
    } else if sig == IERC721::Approval::SIGNATURE_HASH && topic_count(log) == 4 {
        let decoded = IERC721::Approval::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc721,
            name: "Approval",
            args: json!({
                "owner": to_hex(decoded.owner.as_slice()),
                "approved": to_hex(decoded.approved.as_slice()),
                "tokenId": decoded.tokenId.to_string(),
            }),
            movement: None,
        })
    } else if sig == IERC721::ApprovalForAll::SIGNATURE_HASH && topic_count(log) == 3 {
        let decoded = IERC721::ApprovalForAll::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc721,
            name: "ApprovalForAll",
            args: json!({
                "owner": to_hex(decoded.owner.as_slice()),
                "operator": to_hex(decoded.operator.as_slice()),
                "approved": decoded.approved,
            }),
            movement: None,
        })
    } else {
        None
    }
}

/// ERC-1155: single and batch transfers, plus approval and URI events.
pub fn decode_erc1155(log: &Log) -> Option<StandardEvent> {
    let sig = first_topic(log)?;

    if sig == IERC1155::TransferSingle::SIGNATURE_HASH && topic_count(log) == 4 {
        let decoded = IERC1155::TransferSingle::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc1155,
            name: "TransferSingle",
            args: json!({
                "operator": to_hex(decoded.operator.as_slice()),
                "from": to_hex(decoded.from.as_slice()),
                "to": to_hex(decoded.to.as_slice()),
                "id": decoded.id.to_string(),
                "value": decoded.value.to_string(),
            }),
            movement: Some(Movement::MultiToken {
                from: decoded.from,
                to: decoded.to,
                items: vec![(decoded.id, decoded.value)],
            }),
        })
    } else if sig == IERC1155::TransferBatch::SIGNATURE_HASH && topic_count(log) == 4 {
        let decoded = IERC1155::TransferBatch::decode_log(log).ok()?;
        if decoded.ids.len() != decoded.values.len() {
            return None;
        }
        let items: Vec<(U256, U256)> = decoded
            .ids
            .iter()
            .copied()
            .zip(decoded.values.iter().copied())
            .collect();
        Some(StandardEvent {
            standard: Standard::Erc1155,
            name: "TransferBatch",
            args: json!({
                "operator": to_hex(decoded.operator.as_slice()),
                "from": to_hex(decoded.from.as_slice()),
                "to": to_hex(decoded.to.as_slice()),
                "ids": decoded.ids.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
                "values": decoded.values.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
            }),
            movement: Some(Movement::MultiToken {
                from: decoded.from,
                to: decoded.to,
                items,
            }),
        })
    } else if sig == IERC1155::ApprovalForAll::SIGNATURE_HASH && topic_count(log) == 3 {
        let decoded = IERC1155::ApprovalForAll::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc1155,
            name: "ApprovalForAll",
            args: json!({
                "account": to_hex(decoded.account.as_slice()),
                "operator": to_hex(decoded.operator.as_slice()),
                "approved": decoded.approved,
            }),
            movement: None,
        })
    } else if sig == IERC1155::URI::SIGNATURE_HASH && topic_count(log) == 2 {
        let decoded = IERC1155::URI::decode_log(log).ok()?;
        Some(StandardEvent {
            standard: Standard::Erc1155,
            name: "URI",
            args: json!({
                "value": decoded.value.clone(),
                "id": decoded.id.to_string(),
            }),
            movement: None,
        })
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-built logs for decoder and classifier tests.

    use super::*;
    use alloy::primitives::{Bytes, LogData, B256};
    use alloy::sol_types::SolValue;

    pub fn word(addr: Address) -> B256 {
        addr.into_word()
    }

    pub fn log(emitter: Address, topics: Vec<B256>, data: Vec<u8>) -> Log {
        Log {
            address: emitter,
            data: LogData::new_unchecked(topics, Bytes::from(data)),
        }
    }

    pub fn erc20_transfer(token: Address, from: Address, to: Address, value: u64) -> Log {
        log(
            token,
            vec![IERC20::Transfer::SIGNATURE_HASH, word(from), word(to)],
            U256::from(value).to_be_bytes::<32>().to_vec(),
        )
    }

    pub fn erc721_transfer(token: Address, from: Address, to: Address, id: u64) -> Log {
        log(
            token,
            vec![
                IERC721::Transfer::SIGNATURE_HASH,
                word(from),
                word(to),
                B256::from(U256::from(id).to_be_bytes::<32>()),
            ],
            Vec::new(),
        )
    }

    pub fn erc1155_batch(
        token: Address,
        operator: Address,
        from: Address,
        to: Address,
        ids: &[u64],
        values: &[u64],
    ) -> Log {
        let ids: Vec<U256> = ids.iter().map(|v| U256::from(*v)).collect();
        let values: Vec<U256> = values.iter().map(|v| U256::from(*v)).collect();
        log(
            token,
            vec![
                IERC1155::TransferBatch::SIGNATURE_HASH,
                word(operator),
                word(from),
                word(to),
            ],
            (ids, values).abi_encode_params(),
        )
    }
}
