//! Credit ledger core: the store, the transaction wrapper and the ledger
//! operations that keep per vendor/service credit balances consistent with
//! the purchase and sale tables.

pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod policy;
pub mod store;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{
    BundleEdit, CashFlow, Checkout, Ledger, LedgerOutcome, LedgerWarning, NewPurchase, NewSale,
    SalePatch,
};
pub use policy::{LedgerPolicy, MissingBalancePolicy, OversellPolicy};
