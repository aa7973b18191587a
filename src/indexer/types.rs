use alloy::primitives::{Address, B256};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lowercase `0x`-prefixed hex for addresses and hashes.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================================
// Watch list
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Inactive,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for ContractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("Invalid contract status: {}", s)),
        }
    }
}

/// A user-registered contract. Owned by the store; the monitor only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedContract {
    pub owner: String,
    pub address: Address,
    pub chain: String,
    pub status: ContractStatus,
}

impl WatchedContract {
    /// `chain:address`, address in lowercase hex.
    pub fn key(&self) -> String {
        format!("{}:{}", self.chain, to_hex(self.address.as_slice()))
    }
}

// ============================================================
// Streaming path
// ============================================================

/// Canonical save request produced from a raw log or block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTransaction {
    pub tx_hash: B256,
    pub chain: String,
    pub contract_address: Address,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub is_testnet: bool,
    pub owner: Option<String>,
}

/// Durable transaction record, unique on `(chain, tx_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedTransaction {
    pub tx_hash: B256,
    pub chain: String,
    pub contract_address: Address,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub is_testnet: bool,
    pub owner: Option<String>,
    pub label: String,
    pub base_type: Option<BaseType>,
    pub sub_type: Option<SubType>,
}

// ============================================================
// Classification
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaseType {
    Transfer,
    Nft,
    Defi,
    Governance,
    System,
    Unknown,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "TRANSFER",
            Self::Nft => "NFT",
            Self::Defi => "DEFI",
            Self::Governance => "GOVERNANCE",
            Self::System => "SYSTEM",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for BaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER" => Ok(Self::Transfer),
            "NFT" => Ok(Self::Nft),
            "DEFI" => Ok(Self::Defi),
            "GOVERNANCE" => Ok(Self::Governance),
            "SYSTEM" => Ok(Self::System),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(format!("Invalid base type: {}", s)),
        }
    }
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity subtype. Each variant belongs to exactly one [`BaseType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubType {
    // TRANSFER
    NativeTransfer,
    Erc20Transfer,
    BatchTransfer,
    // NFT
    NftMint,
    NftTransfer,
    NftBurn,
    NftApproval,
    // DEFI
    Swap,
    LiquidityAdd,
    LiquidityRemove,
    LendingDeposit,
    LendingWithdraw,
    LendingBorrow,
    LendingRepay,
    StakingDeposit,
    StakingWithdraw,
    YieldHarvest,
    // GOVERNANCE
    ProposalCreate,
    VoteCast,
    Delegate,
    // SYSTEM
    ContractDeployment,
    ContractUpgrade,
    ProxyCall,
}

const SUB_TYPES: &[(SubType, &str)] = &[
    (SubType::NativeTransfer, "NATIVE_TRANSFER"),
    (SubType::Erc20Transfer, "ERC20_TRANSFER"),
    (SubType::BatchTransfer, "BATCH_TRANSFER"),
    (SubType::NftMint, "NFT_MINT"),
    (SubType::NftTransfer, "NFT_TRANSFER"),
    (SubType::NftBurn, "NFT_BURN"),
    (SubType::NftApproval, "NFT_APPROVAL"),
    (SubType::Swap, "SWAP"),
    (SubType::LiquidityAdd, "LIQUIDITY_ADD"),
    (SubType::LiquidityRemove, "LIQUIDITY_REMOVE"),
    (SubType::LendingDeposit, "LENDING_DEPOSIT"),
    (SubType::LendingWithdraw, "LENDING_WITHDRAW"),
    (SubType::LendingBorrow, "LENDING_BORROW"),
    (SubType::LendingRepay, "LENDING_REPAY"),
    (SubType::StakingDeposit, "STAKING_DEPOSIT"),
    (SubType::StakingWithdraw, "STAKING_WITHDRAW"),
    (SubType::YieldHarvest, "YIELD_HARVEST"),
    (SubType::ProposalCreate, "PROPOSAL_CREATE"),
    (SubType::VoteCast, "VOTE_CAST"),
    (SubType::Delegate, "DELEGATE"),
    (SubType::ContractDeployment, "CONTRACT_DEPLOYMENT"),
    (SubType::ContractUpgrade, "CONTRACT_UPGRADE"),
    (SubType::ProxyCall, "PROXY_CALL"),
];

impl SubType {
    pub fn as_str(&self) -> &'static str {
        SUB_TYPES
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, s)| *s)
            .unwrap_or("UNKNOWN")
    }

    pub fn base(&self) -> BaseType {
        match self {
            Self::NativeTransfer | Self::Erc20Transfer | Self::BatchTransfer => BaseType::Transfer,
            Self::NftMint | Self::NftTransfer | Self::NftBurn | Self::NftApproval => BaseType::Nft,
            Self::Swap
            | Self::LiquidityAdd
            | Self::LiquidityRemove
            | Self::LendingDeposit
            | Self::LendingWithdraw
            | Self::LendingBorrow
            | Self::LendingRepay
            | Self::StakingDeposit
            | Self::StakingWithdraw
            | Self::YieldHarvest => BaseType::Defi,
            Self::ProposalCreate | Self::VoteCast | Self::Delegate => BaseType::Governance,
            Self::ContractDeployment | Self::ContractUpgrade | Self::ProxyCall => BaseType::System,
        }
    }
}

impl std::str::FromStr for SubType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SUB_TYPES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(t, _)| *t)
            .ok_or_else(|| format!("Invalid sub type: {}", s))
    }
}

impl std::fmt::Display for SubType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value movement extracted from a decoded log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenTransfer {
    pub token: Address,
    /// Raw integer amount in the token's smallest unit.
    pub amount: String,
    pub from: Address,
    pub to: Address,
    pub token_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedEvent {
    pub name: String,
    pub standard: &'static str,
    pub args: serde_json::Value,
    pub emitting_address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedResult {
    pub base_type: BaseType,
    pub sub_type: Option<SubType>,
    pub token_transfers: Vec<TokenTransfer>,
    pub decoded_events: Vec<DecodedEvent>,
}

impl ClassifiedResult {
    pub fn unknown() -> Self {
        Self {
            base_type: BaseType::Unknown,
            sub_type: None,
            token_transfers: Vec::new(),
            decoded_events: Vec::new(),
        }
    }

    pub fn with_type(sub_type: SubType) -> Self {
        Self {
            base_type: sub_type.base(),
            sub_type: Some(sub_type),
            ..Self::unknown()
        }
    }

    pub(crate) fn set_type(&mut self, sub_type: SubType) {
        self.base_type = sub_type.base();
        self.sub_type = Some(sub_type);
    }
}

// ============================================================
// Enrichment
// ============================================================

/// Classifier output merged with block and gas metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedTransaction {
    pub tx_hash: B256,
    pub chain: String,
    pub chain_name: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub from: Address,
    pub to: Option<Address>,
    pub native_value: BigDecimal,
    pub native_symbol: String,
    pub gas_used: u64,
    pub gas_fee_native: BigDecimal,
    /// Left unset until a price source is wired in.
    pub usd_value: Option<BigDecimal>,
    pub gas_fee_usd: Option<BigDecimal>,
    pub activity_type: BaseType,
    pub sub_type: Option<SubType>,
    pub token_transfers: Vec<TokenTransfer>,
    pub decoded_events: Vec<DecodedEvent>,
    pub project_tag: Option<String>,
}
