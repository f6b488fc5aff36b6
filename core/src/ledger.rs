//! Ledger operations: the only code that moves credit balances.
//!
//! RULES:
//!   - Every public operation runs inside exactly one `with_transaction` call.
//!   - A balance adjustment happens in the same transaction as the purchase
//!     or sale row change it mirrors, so either both land or neither does.
//!   - Sign convention: consuming credits lowers `remaining_credits` and
//!     raises `total_used`; giving credits back does the reverse.
//!   - Balances are matched to events by `(vendor_id, service_name)` value.

use crate::{
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    policy::{LedgerPolicy, MissingBalancePolicy, OversellPolicy},
    store::{BalanceDelta, BalanceDrift, LedgerStore, LedgerTx, SubscriptionRow},
    types::{BundleId, Credits, RowId},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Inputs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchase {
    pub vendor_id: RowId,
    pub service_name: String,
    pub credits: Credits,
    pub price_usd: f64,
    pub purchase_date: NaiveDate,
    pub notes: Option<String>,
}

impl NewPurchase {
    /// A purchase dated today with no notes.
    pub fn new(
        vendor_id: RowId,
        service_name: impl Into<String>,
        credits: Credits,
        price_usd: f64,
    ) -> Self {
        Self {
            vendor_id,
            service_name: service_name.into(),
            credits,
            price_usd,
            purchase_date: Utc::now().date_naive(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSale {
    pub customer_id: RowId,
    /// What the customer bought, as shown on the order.
    pub service_name: String,
    pub vendor_id: Option<RowId>,
    /// Balance key on the vendor side; defaults to `service_name`.
    pub vendor_service_name: Option<String>,
    pub start_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub credits_used: Credits,
    pub amount_paid: f64,
    pub status: String,
    pub order_status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub classification: Option<String>,
    pub bundle_id: Option<BundleId>,
    pub notes: Option<String>,
}

impl NewSale {
    /// An active sale starting today that draws on no vendor balance.
    pub fn new(
        customer_id: RowId,
        service_name: impl Into<String>,
        credits_used: Credits,
        amount_paid: f64,
    ) -> Self {
        Self {
            customer_id,
            service_name: service_name.into(),
            vendor_id: None,
            vendor_service_name: None,
            start_date: Utc::now().date_naive(),
            expiry_date: None,
            credits_used,
            amount_paid,
            status: "active".into(),
            order_status: None,
            payment_status: None,
            payment_method: None,
            classification: None,
            bundle_id: None,
            notes: None,
        }
    }

    pub fn from_vendor(mut self, vendor_id: RowId, vendor_service_name: impl Into<String>) -> Self {
        self.vendor_id = Some(vendor_id);
        self.vendor_service_name = Some(vendor_service_name.into());
        self
    }

    pub fn in_bundle(mut self, bundle_id: impl Into<BundleId>) -> Self {
        self.bundle_id = Some(bundle_id.into());
        self
    }
}

/// Fields to change on an existing sale. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalePatch {
    pub credits_used: Option<Credits>,
    pub amount_paid: Option<f64>,
    pub service_name: Option<String>,
    pub vendor_id: Option<RowId>,
    pub vendor_service_name: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub order_status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub classification: Option<String>,
    pub notes: Option<String>,
}

impl SalePatch {
    pub fn credits(credits_used: Credits) -> Self {
        Self {
            credits_used: Some(credits_used),
            ..Self::default()
        }
    }
}

/// All line-item changes to one bundle, applied as a single transaction:
/// removals first, then updates, then additions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleEdit {
    pub add: Vec<NewSale>,
    pub update: Vec<(RowId, SalePatch)>,
    pub remove: Vec<RowId>,
}

impl BundleEdit {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CashFlow {
    Income,
    Expense,
}

impl CashFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

// ── Outputs ────────────────────────────────────────────────────────

/// Something the operation let through that the caller may want to surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerWarning {
    /// The adjustment matched no balance row and was skipped.
    MissingBalance {
        vendor_id: RowId,
        service_name: String,
        remaining_delta: Credits,
    },
    /// A sale left the balance below zero.
    Oversold {
        vendor_id: RowId,
        service_name: String,
        remaining: Credits,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutcome<T> {
    pub value: T,
    pub warnings: Vec<LedgerWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkout {
    pub bundle_id: Option<BundleId>,
    pub subscription_ids: Vec<RowId>,
}

// ── Ledger ─────────────────────────────────────────────────────────

pub struct Ledger {
    store: LedgerStore,
    policy: LedgerPolicy,
}

impl Ledger {
    pub fn new(store: LedgerStore, policy: LedgerPolicy) -> Self {
        Self { store, policy }
    }

    /// Open (or create) the store named by `config` and bring its schema up to date.
    pub fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let store = if config.is_in_memory() {
            LedgerStore::in_memory()?
        } else {
            LedgerStore::open(&config.db_path)?
        };
        store.migrate()?;
        Ok(Self::new(store, config.policy))
    }

    /// A migrated in-memory ledger. Used by tests.
    pub fn in_memory(policy: LedgerPolicy) -> LedgerResult<Self> {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, policy))
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: LedgerPolicy) {
        self.policy = policy;
    }

    fn run<T, F>(&self, work: F) -> LedgerResult<LedgerOutcome<T>>
    where
        F: FnOnce(&mut Op<'_>) -> LedgerResult<T>,
    {
        let policy = self.policy;
        self.store.with_transaction(|tx| {
            let mut op = Op {
                tx,
                policy,
                warnings: Vec::new(),
            };
            let value = work(&mut op)?;
            Ok(LedgerOutcome {
                value,
                warnings: op.warnings,
            })
        })
    }

    // ── Purchases ──────────────────────────────────────────────────

    pub fn record_purchase(&self, purchase: &NewPurchase) -> LedgerResult<LedgerOutcome<RowId>> {
        let outcome = self.run(|op| op.record_purchase(purchase))?;
        log::info!(
            "Purchase {} recorded: vendor {} / '{}' +{} credits",
            outcome.value,
            purchase.vendor_id,
            purchase.service_name.trim(),
            purchase.credits
        );
        Ok(outcome)
    }

    pub fn delete_purchase(&self, transaction_id: RowId) -> LedgerResult<LedgerOutcome<()>> {
        let outcome = self.run(|op| op.delete_purchase(transaction_id))?;
        log::info!("Purchase {transaction_id} deleted");
        Ok(outcome)
    }

    // ── Sales ──────────────────────────────────────────────────────

    pub fn create_sale(&self, sale: NewSale) -> LedgerResult<LedgerOutcome<RowId>> {
        let outcome = self.run(|op| op.create_sale(sale))?;
        log::info!("Sale {} created", outcome.value);
        Ok(outcome)
    }

    pub fn update_sale(
        &self,
        subscription_id: RowId,
        patch: SalePatch,
    ) -> LedgerResult<LedgerOutcome<()>> {
        let outcome = self.run(|op| op.update_sale(subscription_id, patch))?;
        log::info!("Sale {subscription_id} updated");
        Ok(outcome)
    }

    pub fn delete_sale(&self, subscription_id: RowId) -> LedgerResult<LedgerOutcome<()>> {
        let outcome = self.run(|op| {
            let row = op.existing_sale(subscription_id)?;
            op.delete_sale(&row)
        })?;
        log::info!("Sale {subscription_id} deleted");
        Ok(outcome)
    }

    // ── Bundles ────────────────────────────────────────────────────

    /// Delete every line item of a bundle, restoring their credits.
    /// Returns the number of rows removed.
    pub fn delete_bundle(&self, bundle_id: &str) -> LedgerResult<LedgerOutcome<usize>> {
        let outcome = self.run(|op| {
            let rows = op.tx.bundle_subscriptions(bundle_id)?;
            if rows.is_empty() {
                return Err(LedgerError::not_found("bundle", bundle_id));
            }
            for row in &rows {
                op.delete_sale(row)?;
            }
            op.tx.append_event(&LedgerEvent::BundleDeleted {
                bundle_id: bundle_id.to_string(),
                line_items: rows.len(),
            })?;
            Ok(rows.len())
        })?;
        log::info!("Bundle {bundle_id} deleted ({} line items)", outcome.value);
        Ok(outcome)
    }

    /// Apply a whole bundle edit in one transaction. The bundle must already
    /// exist; new bundles come from `checkout`.
    /// Returns the ids of the added line items.
    pub fn edit_bundle(
        &self,
        bundle_id: &str,
        edit: BundleEdit,
    ) -> LedgerResult<LedgerOutcome<Vec<RowId>>> {
        let bundle_id = bundle_id.trim();
        if bundle_id.is_empty() {
            return Err(LedgerError::Validation("bundle id must not be empty".into()));
        }
        if edit.is_empty() {
            return Err(LedgerError::Validation("bundle edit contains no changes".into()));
        }
        let (added, updated, removed) = (edit.add.len(), edit.update.len(), edit.remove.len());

        let outcome = self.run(|op| {
            if op.tx.bundle_subscriptions(bundle_id)?.is_empty() {
                return Err(LedgerError::not_found("bundle", bundle_id));
            }
            for id in &edit.remove {
                let row = op.bundle_member(bundle_id, *id)?;
                op.delete_sale(&row)?;
            }
            for (id, patch) in edit.update {
                op.bundle_member(bundle_id, id)?;
                op.update_sale(id, patch)?;
            }
            let mut ids = Vec::with_capacity(edit.add.len());
            for sale in edit.add {
                ids.push(op.create_sale(sale.in_bundle(bundle_id))?);
            }
            op.tx.append_event(&LedgerEvent::BundleEdited {
                bundle_id: bundle_id.to_string(),
                added,
                updated,
                removed,
            })?;
            Ok(ids)
        })?;
        log::info!("Bundle {bundle_id} edited: +{added} ~{updated} -{removed}");
        Ok(outcome)
    }

    /// Point-of-sale checkout: one sale per line item, all or nothing.
    /// Carts with more than one line get a generated bundle id unless the
    /// caller supplies one.
    pub fn checkout(
        &self,
        customer_id: RowId,
        bundle_id: Option<BundleId>,
        items: Vec<NewSale>,
    ) -> LedgerResult<LedgerOutcome<Checkout>> {
        if items.is_empty() {
            return Err(LedgerError::Validation("checkout has no line items".into()));
        }
        let bundle_id = bundle_id
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .or_else(|| (items.len() > 1).then(|| uuid::Uuid::new_v4().to_string()));

        let outcome = self.run(|op| {
            let mut subscription_ids = Vec::with_capacity(items.len());
            for mut item in items {
                item.customer_id = customer_id;
                item.bundle_id = bundle_id.clone();
                subscription_ids.push(op.create_sale(item)?);
            }
            Ok(Checkout {
                bundle_id: bundle_id.clone(),
                subscription_ids,
            })
        })?;
        log::info!(
            "Checkout for customer {customer_id}: {} line items",
            outcome.value.subscription_ids.len()
        );
        Ok(outcome)
    }

    // ── Reference data and cash ledger ─────────────────────────────

    pub fn add_vendor(&self, name: &str, contact: Option<&str>) -> LedgerResult<RowId> {
        let name = required("vendor name", name)?;
        self.store.with_transaction(|tx| tx.insert_vendor(name, contact))
    }

    pub fn add_vendor_service(
        &self,
        vendor_id: RowId,
        service_name: &str,
        cost_per_credit: f64,
    ) -> LedgerResult<RowId> {
        let service_name = required("service name", service_name)?;
        non_negative("cost per credit", cost_per_credit)?;
        self.store.with_transaction(|tx| {
            if !tx.vendor_exists(vendor_id)? {
                return Err(LedgerError::not_found("vendor", vendor_id));
            }
            tx.upsert_vendor_service(vendor_id, service_name, cost_per_credit)
        })
    }

    pub fn add_customer(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> LedgerResult<RowId> {
        let name = required("customer name", name)?;
        self.store.with_transaction(|tx| tx.insert_customer(name, phone, email))
    }

    pub fn record_cash(
        &self,
        flow: CashFlow,
        amount_usd: f64,
        description: Option<&str>,
        occurred_on: NaiveDate,
    ) -> LedgerResult<RowId> {
        non_negative("amount", amount_usd)?;
        self.store.with_transaction(|tx| {
            tx.insert_business_transaction(flow.as_str(), amount_usd, description, occurred_on)
        })
    }

    // ── Audit ──────────────────────────────────────────────────────

    /// Balance rows whose stored totals disagree with the event tables
    /// or break `remaining == purchased - used`. Empty when the ledger is clean.
    pub fn reconcile(&self) -> LedgerResult<Vec<BalanceDrift>> {
        let drift: Vec<_> = self
            .store
            .balance_drift()?
            .into_iter()
            .filter(|d| !d.is_clean())
            .collect();
        for d in &drift {
            log::warn!(
                "Balance drift on vendor {} / '{}': purchased {} (expected {}), \
                 used {} (expected {}), remaining {}",
                d.vendor_id,
                d.service_name,
                d.total_purchased,
                d.expected_purchased,
                d.total_used,
                d.expected_used,
                d.remaining_credits
            );
        }
        Ok(drift)
    }
}

// ── Unit of work ───────────────────────────────────────────────────

/// One operation's view of the open transaction plus the warnings it has
/// collected so far.
struct Op<'t> {
    tx: &'t LedgerTx<'t>,
    policy: LedgerPolicy,
    warnings: Vec<LedgerWarning>,
}

impl Op<'_> {
    /// Move a pair's running totals by `delta`, honouring both policies.
    fn adjust(
        &mut self,
        vendor_id: RowId,
        service_name: &str,
        delta: BalanceDelta,
    ) -> LedgerResult<()> {
        let Some(balance) = self.tx.find_balance(vendor_id, service_name)? else {
            return self.missing_balance(vendor_id, service_name, delta);
        };

        let Some(after) = balance.checked_apply(delta) else {
            return Err(LedgerError::Validation(format!(
                "credit totals for vendor {vendor_id} / '{service_name}' would overflow"
            )));
        };
        let remaining = after.remaining;
        if delta.used > 0 && remaining < 0 {
            match self.policy.oversell {
                OversellPolicy::Reject => {
                    return Err(LedgerError::InsufficientCredits {
                        vendor_id,
                        service_name: service_name.to_string(),
                        remaining: balance.remaining_credits,
                        requested: delta.used,
                    });
                }
                OversellPolicy::Allow => {
                    log::warn!(
                        "Vendor {vendor_id} / '{service_name}' oversold: {remaining} remaining"
                    );
                    self.warnings.push(LedgerWarning::Oversold {
                        vendor_id,
                        service_name: service_name.to_string(),
                        remaining,
                    });
                }
            }
        }

        self.tx.adjust_balance(vendor_id, service_name, delta)?;
        Ok(())
    }

    fn missing_balance(
        &mut self,
        vendor_id: RowId,
        service_name: &str,
        delta: BalanceDelta,
    ) -> LedgerResult<()> {
        if self.policy.missing_balance == MissingBalancePolicy::Fail {
            return Err(LedgerError::Consistency {
                vendor_id,
                service_name: service_name.to_string(),
            });
        }
        log::warn!(
            "No credit balance for vendor {vendor_id} / '{service_name}'; \
             {} credit adjustment skipped",
            delta.remaining
        );
        self.tx.append_event(&LedgerEvent::BalanceMissing {
            vendor_id,
            service_name: service_name.to_string(),
            remaining_delta: delta.remaining,
        })?;
        self.warnings.push(LedgerWarning::MissingBalance {
            vendor_id,
            service_name: service_name.to_string(),
            remaining_delta: delta.remaining,
        });
        Ok(())
    }

    fn record_purchase(&mut self, p: &NewPurchase) -> LedgerResult<RowId> {
        if p.credits <= 0 {
            return Err(LedgerError::Validation(format!(
                "credits must be positive, got {}",
                p.credits
            )));
        }
        non_negative("price", p.price_usd)?;
        let service_name = required("service name", &p.service_name)?;
        if !self.tx.vendor_exists(p.vendor_id)? {
            return Err(LedgerError::not_found("vendor", p.vendor_id));
        }

        let id = self.tx.insert_vendor_transaction(
            p.vendor_id,
            service_name,
            p.credits,
            p.price_usd,
            p.purchase_date,
            p.notes.as_deref(),
        )?;
        if self.tx.find_balance(p.vendor_id, service_name)?.is_some() {
            self.adjust(p.vendor_id, service_name, BalanceDelta::purchase(p.credits))?;
        } else {
            self.tx.seed_balance(p.vendor_id, service_name, p.credits)?;
        }
        self.tx.append_event(&LedgerEvent::PurchaseRecorded {
            transaction_id: id,
            vendor_id: p.vendor_id,
            service_name: service_name.to_string(),
            credits: p.credits,
        })?;
        Ok(id)
    }

    fn delete_purchase(&mut self, transaction_id: RowId) -> LedgerResult<()> {
        let purchase = self
            .tx
            .vendor_transaction(transaction_id)?
            .ok_or_else(|| LedgerError::not_found("vendor transaction", transaction_id))?;

        self.adjust(
            purchase.vendor_id,
            &purchase.service_name,
            BalanceDelta::purchase(-purchase.credits),
        )?;
        self.tx.delete_vendor_transaction(transaction_id)?;
        self.tx.append_event(&LedgerEvent::PurchaseDeleted {
            transaction_id,
            vendor_id: purchase.vendor_id,
            service_name: purchase.service_name,
            credits: purchase.credits,
        })?;
        Ok(())
    }

    fn existing_sale(&self, subscription_id: RowId) -> LedgerResult<SubscriptionRow> {
        self.tx
            .subscription(subscription_id)?
            .ok_or_else(|| LedgerError::not_found("subscription", subscription_id))
    }

    fn bundle_member(
        &self,
        bundle_id: &str,
        subscription_id: RowId,
    ) -> LedgerResult<SubscriptionRow> {
        let row = self.existing_sale(subscription_id)?;
        if row.bundle_id.as_deref() != Some(bundle_id) {
            return Err(LedgerError::Validation(format!(
                "subscription {subscription_id} is not part of bundle {bundle_id}"
            )));
        }
        Ok(row)
    }

    fn create_sale(&mut self, sale: NewSale) -> LedgerResult<RowId> {
        validate_consumption(sale.credits_used, sale.amount_paid)?;
        let service_name = required("service name", &sale.service_name)?.to_string();
        if !self.tx.customer_exists(sale.customer_id)? {
            return Err(LedgerError::not_found("customer", sale.customer_id));
        }

        let vendor_service_name =
            balance_service(sale.vendor_id, sale.vendor_service_name, &service_name);
        let mut row = SubscriptionRow {
            id: 0,
            customer_id: sale.customer_id,
            service_name,
            vendor_id: sale.vendor_id,
            vendor_service_name,
            start_date: sale.start_date,
            expiry_date: sale.expiry_date,
            credits_used: sale.credits_used,
            amount_paid: sale.amount_paid,
            status: sale.status,
            order_status: sale.order_status,
            payment_status: sale.payment_status,
            payment_method: sale.payment_method,
            classification: sale.classification,
            bundle_id: sale.bundle_id,
            notes: sale.notes,
            created_at: Utc::now(),
        };
        row.id = self.tx.insert_subscription(&row)?;

        if let Some((vendor_id, service)) = row.balance_key() {
            if row.credits_used > 0 {
                self.adjust(vendor_id, service, BalanceDelta::consume(row.credits_used))?;
            }
        }
        self.tx.append_event(&LedgerEvent::SaleCreated {
            subscription_id: row.id,
            customer_id: row.customer_id,
            vendor_id: row.vendor_id,
            service_name: row.vendor_service_name.clone(),
            credits_used: row.credits_used,
            bundle_id: row.bundle_id.clone(),
        })?;
        Ok(row.id)
    }

    fn update_sale(&mut self, subscription_id: RowId, patch: SalePatch) -> LedgerResult<()> {
        let old = self.existing_sale(subscription_id)?;
        let new = apply_patch(&old, patch)?;
        self.tx.update_subscription(&new)?;

        match (old.balance_key(), new.balance_key()) {
            (old_key, new_key) if old_key == new_key => {
                let delta = new.credits_used - old.credits_used;
                if let Some((vendor_id, service)) = new_key {
                    if delta != 0 {
                        self.adjust(vendor_id, service, BalanceDelta::consume(delta))?;
                    }
                }
            }
            (old_key, new_key) => {
                // Moved to another pair: give the old pair back its credits,
                // then charge the new one.
                if let Some((vendor_id, service)) = old_key {
                    if old.credits_used > 0 {
                        self.adjust(vendor_id, service, BalanceDelta::consume(-old.credits_used))?;
                    }
                }
                if let Some((vendor_id, service)) = new_key {
                    if new.credits_used > 0 {
                        self.adjust(vendor_id, service, BalanceDelta::consume(new.credits_used))?;
                    }
                }
            }
        }

        self.tx.append_event(&LedgerEvent::SaleUpdated {
            subscription_id,
            old_credits: old.credits_used,
            new_credits: new.credits_used,
        })?;
        Ok(())
    }

    fn delete_sale(&mut self, row: &SubscriptionRow) -> LedgerResult<()> {
        if let Some((vendor_id, service)) = row.balance_key() {
            if row.credits_used > 0 {
                self.adjust(vendor_id, service, BalanceDelta::consume(-row.credits_used))?;
            }
        }
        self.tx.delete_subscription(row.id)?;
        self.tx.append_event(&LedgerEvent::SaleDeleted {
            subscription_id: row.id,
            credits_used: row.credits_used,
            bundle_id: row.bundle_id.clone(),
        })?;
        Ok(())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn required<'a>(field: &str, value: &'a str) -> LedgerResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LedgerError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn non_negative(field: &str, value: f64) -> LedgerResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(LedgerError::Validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn validate_consumption(credits_used: Credits, amount_paid: f64) -> LedgerResult<()> {
    if credits_used < 0 {
        return Err(LedgerError::Validation(format!(
            "credits used must not be negative, got {credits_used}"
        )));
    }
    non_negative("amount paid", amount_paid)
}

/// The vendor-side service a sale draws on: the explicit vendor service
/// name if given, else the sale's own service name. No vendor, no key.
fn balance_service(
    vendor_id: Option<RowId>,
    vendor_service_name: Option<String>,
    service_name: &str,
) -> Option<String> {
    vendor_id?;
    let explicit = vendor_service_name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    Some(explicit.unwrap_or_else(|| service_name.to_string()))
}

fn apply_patch(old: &SubscriptionRow, patch: SalePatch) -> LedgerResult<SubscriptionRow> {
    let mut new = old.clone();
    if let Some(credits_used) = patch.credits_used {
        new.credits_used = credits_used;
    }
    if let Some(amount_paid) = patch.amount_paid {
        new.amount_paid = amount_paid;
    }
    validate_consumption(new.credits_used, new.amount_paid)?;

    if let Some(service_name) = patch.service_name {
        new.service_name = required("service name", &service_name)?.to_string();
    }
    let vendor_changed = patch.vendor_id.is_some() || patch.vendor_service_name.is_some();
    if let Some(vendor_id) = patch.vendor_id {
        new.vendor_id = Some(vendor_id);
    }
    if vendor_changed {
        let explicit = patch
            .vendor_service_name
            .or_else(|| old.vendor_service_name.clone());
        new.vendor_service_name = balance_service(new.vendor_id, explicit, &new.service_name);
    }

    if patch.expiry_date.is_some() {
        new.expiry_date = patch.expiry_date;
    }
    if let Some(status) = patch.status {
        new.status = status;
    }
    for (field, value) in [
        (&mut new.order_status, patch.order_status),
        (&mut new.payment_status, patch.payment_status),
        (&mut new.payment_method, patch.payment_method),
        (&mut new.classification, patch.classification),
        (&mut new.notes, patch.notes),
    ] {
        if value.is_some() {
            *field = value;
        }
    }
    Ok(new)
}
