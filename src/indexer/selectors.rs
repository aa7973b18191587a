use alloy::primitives::{fixed_bytes, FixedBytes};

use super::types::SubType;

// ============================================================
// Known DeFi method selectors
// ============================================================

/// Leading 4 bytes of call data mapped to the activity they indicate.
/// Only consulted when no log produced a classification.
pub const DEFI_SELECTORS: &[(FixedBytes<4>, SubType)] = &[
    // Uniswap V2 router: swapExactETHForTokens, swapExactTokensForTokens
    (fixed_bytes!("7ff36ab5"), SubType::Swap),
    (fixed_bytes!("38ed1739"), SubType::Swap),
    // addLiquidity, addLiquidityETH
    (fixed_bytes!("e8e33700"), SubType::LiquidityAdd),
    (fixed_bytes!("f305d719"), SubType::LiquidityAdd),
    // WETH withdraw, Compound redeem
    (fixed_bytes!("2e1a7d4d"), SubType::LendingWithdraw),
    (fixed_bytes!("db006a75"), SubType::LendingWithdraw),
    // Compound borrow
    (fixed_bytes!("c5ebeaec"), SubType::LendingBorrow),
];

pub fn match_selector(input: &[u8]) -> Option<SubType> {
    let selector: [u8; 4] = input.get(..4)?.try_into().ok()?;
    DEFI_SELECTORS
        .iter()
        .find(|(known, _)| known.0 == selector)
        .map(|(_, sub)| *sub)
}
