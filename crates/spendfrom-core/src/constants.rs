//! Protocol and policy constants. All monetary values in units (1 coin = 10^8 units).

/// Units per whole coin.
pub const COIN: u64 = 100_000_000;

/// Number of decimal places in a coin amount.
pub const COIN_DECIMALS: usize = 8;

/// Upper bound on any single amount accepted from the user or the node.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Default minimum confirmation count for spendable outputs.
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 1;

/// Default smallest change output worth creating.
pub const DEFAULT_DUST_THRESHOLD: u64 = 546;

/// Default fee charged per started kilobyte by the auto fee policy.
pub const DEFAULT_FEE_PER_KB: u64 = 10_000;

/// Default ceiling on the fee of a single transaction (0.01 coin).
pub const DEFAULT_MAX_FEE: u64 = COIN / 100;

/// `maxconf` argument passed to `listunspent`.
pub const LISTUNSPENT_MAX_CONFIRMATIONS: u32 = 9_999_999;

/// Seconds the wallet stays unlocked after `walletpassphrase`.
pub const WALLET_UNLOCK_SECS: u64 = 5;

/// Fixed transaction overhead used by the size estimate (version, counts, locktime).
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// Estimated serialized size of one signed pay-to-pubkey-hash input.
pub const INPUT_BYTES: u64 = 148;

/// Estimated serialized size of one pay-to-pubkey-hash output.
pub const OUTPUT_BYTES: u64 = 34;

/// Transactions above this size must pay at least one kilobyte's fee.
pub const LARGE_TX_BYTES: u64 = 1_000;

/// Transactions spending less than this must pay at least one kilobyte's fee.
pub const SMALL_INPUT_TOTAL: u64 = COIN / 100;
