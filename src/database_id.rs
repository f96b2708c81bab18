//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;
/// The ID of a recurring rule.
pub type RuleId = DatabaseId;
/// The ID of a materialized ledger transaction.
pub type TransactionId = DatabaseId;
/// The ID of the user that owns a rule or transaction.
pub type UserId = DatabaseId;
/// The ID of a wallet.
pub type WalletId = DatabaseId;
/// The ID of a category.
pub type CategoryId = DatabaseId;
