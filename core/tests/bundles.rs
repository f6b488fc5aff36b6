//! DeleteBundle, single-transaction bundle edits and POS checkout.

use ledger_core::{
    event::LedgerEvent, BundleEdit, Ledger, LedgerError, LedgerPolicy, MissingBalancePolicy,
    NewPurchase, NewSale, SalePatch,
};

struct Fixture {
    ledger: Ledger,
    vendor: i64,
    customer: i64,
}

fn setup() -> Fixture {
    let ledger = Ledger::in_memory(LedgerPolicy::default()).expect("ledger");
    let vendor = ledger.add_vendor("V1", None).unwrap();
    let customer = ledger
        .add_customer("Bob", None, Some("bob@example.com"))
        .unwrap();
    for (service, credits) in [("Premium", 100), ("Basic", 60), ("Sports", 40)] {
        ledger
            .record_purchase(&NewPurchase::new(vendor, service, credits, 1.0))
            .unwrap();
    }
    Fixture {
        ledger,
        vendor,
        customer,
    }
}

impl Fixture {
    fn totals(&self, service: &str) -> (i64, i64, i64) {
        let b = self
            .ledger
            .store()
            .credit_balance(self.vendor, service)
            .unwrap()
            .expect("balance row");
        (b.remaining_credits, b.total_purchased, b.total_used)
    }

    fn line(&self, service: &str, credits: i64) -> NewSale {
        NewSale::new(self.customer, service, credits, credits as f64 * 3.0)
            .from_vendor(self.vendor, service)
    }

    /// Three-item bundle "B-1": Premium 10, Basic 6, Sports 4.
    fn three_item_bundle(&self) -> Vec<i64> {
        self.ledger
            .checkout(
                self.customer,
                Some("B-1".into()),
                vec![self.line("Premium", 10), self.line("Basic", 6), self.line("Sports", 4)],
            )
            .unwrap()
            .value
            .subscription_ids
    }
}

#[test]
fn delete_bundle_restores_every_line_item() {
    let f = setup();
    let ids = f.three_item_bundle();
    assert_eq!(ids.len(), 3);
    assert_eq!(f.totals("Premium"), (90, 100, 10));
    assert_eq!(f.totals("Basic"), (54, 60, 6));
    assert_eq!(f.totals("Sports"), (36, 40, 4));

    let outcome = f.ledger.delete_bundle("B-1").unwrap();

    assert_eq!(outcome.value, 3);
    assert_eq!(f.totals("Premium"), (100, 100, 0));
    assert_eq!(f.totals("Basic"), (60, 60, 0));
    assert_eq!(f.totals("Sports"), (40, 40, 0));
    assert_eq!(f.ledger.store().bundle_size("B-1").unwrap(), 0);
}

#[test]
fn delete_bundle_leaves_other_sales_alone() {
    let f = setup();
    f.three_item_bundle();
    let standalone = f.ledger.create_sale(f.line("Premium", 5)).unwrap().value;

    f.ledger.delete_bundle("B-1").unwrap();

    assert_eq!(f.totals("Premium"), (95, 100, 5));
    assert!(f.ledger.store().subscription(standalone).unwrap().is_some());
}

#[test]
fn failed_bundle_delete_leaves_everything_intact() {
    let mut f = setup();
    // Third line item draws on a pair with no balance row.
    f.ledger
        .checkout(
            f.customer,
            Some("B-2".into()),
            vec![f.line("Premium", 10), f.line("Basic", 6), f.line("Unstocked", 4)],
        )
        .unwrap();
    f.ledger.set_policy(LedgerPolicy {
        missing_balance: MissingBalancePolicy::Fail,
        ..LedgerPolicy::default()
    });

    let err = f.ledger.delete_bundle("B-2").unwrap_err();

    assert!(matches!(err, LedgerError::Consistency { .. }));
    assert_eq!(f.ledger.store().bundle_size("B-2").unwrap(), 3);
    assert_eq!(f.totals("Premium"), (90, 100, 10));
    assert_eq!(f.totals("Basic"), (54, 60, 6));
}

#[test]
fn deleting_unknown_bundle_is_not_found() {
    let f = setup();
    let err = f.ledger.delete_bundle("nope").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "bundle", .. }));
}

#[test]
fn checkout_generates_bundle_id_for_multi_line_carts() {
    let f = setup();

    let multi = f
        .ledger
        .checkout(f.customer, None, vec![f.line("Premium", 1), f.line("Basic", 1)])
        .unwrap()
        .value;
    let single = f
        .ledger
        .checkout(f.customer, None, vec![f.line("Sports", 1)])
        .unwrap()
        .value;

    let bundle = multi.bundle_id.expect("generated bundle id");
    assert_eq!(f.ledger.store().bundle_size(&bundle).unwrap(), 2);
    assert_eq!(single.bundle_id, None);
    assert_eq!(single.subscription_ids.len(), 1);
}

#[test]
fn checkout_is_all_or_nothing() {
    let f = setup();

    let err = f
        .ledger
        .checkout(f.customer, None, vec![f.line("Premium", 10), f.line("Basic", -1)])
        .unwrap_err();

    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(f.ledger.store().subscriptions().unwrap().is_empty());
    assert_eq!(f.totals("Premium"), (100, 100, 0));
}

#[test]
fn empty_checkout_is_rejected() {
    let f = setup();
    let err = f.ledger.checkout(f.customer, None, vec![]).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn bundle_edit_applies_removes_updates_and_adds_together() {
    let f = setup();
    let ids = f.three_item_bundle();

    let edit = BundleEdit {
        remove: vec![ids[2]],
        update: vec![(ids[0], SalePatch::credits(15))],
        add: vec![f.line("Sports", 2)],
    };
    let added = f.ledger.edit_bundle("B-1", edit).unwrap().value;

    assert_eq!(added.len(), 1);
    assert_eq!(f.totals("Premium"), (85, 100, 15));
    assert_eq!(f.totals("Basic"), (54, 60, 6));
    assert_eq!(f.totals("Sports"), (38, 40, 2));
    assert_eq!(f.ledger.store().bundle_size("B-1").unwrap(), 3);
    let new_row = f.ledger.store().subscription(added[0]).unwrap().unwrap();
    assert_eq!(new_row.bundle_id.as_deref(), Some("B-1"));
}

#[test]
fn failing_bundle_edit_rolls_back_every_change() {
    let f = setup();
    let ids = f.three_item_bundle();
    let outsider = f.ledger.create_sale(f.line("Premium", 1)).unwrap().value;
    let events = f.ledger.store().event_count().unwrap();

    let edit = BundleEdit {
        remove: vec![ids[1]],
        update: vec![(outsider, SalePatch::credits(3))],
        add: vec![],
    };
    let err = f.ledger.edit_bundle("B-1", edit).unwrap_err();

    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(f.ledger.store().bundle_size("B-1").unwrap(), 3);
    assert_eq!(f.totals("Basic"), (54, 60, 6));
    assert_eq!(f.totals("Premium"), (89, 100, 11));
    assert_eq!(f.ledger.store().event_count().unwrap(), events);
}

#[test]
fn editing_unknown_bundle_is_not_found() {
    let f = setup();
    f.three_item_bundle();
    let events = f.ledger.store().event_count().unwrap();

    let edit = BundleEdit {
        add: vec![f.line("Premium", 2)],
        ..BundleEdit::default()
    };
    let err = f.ledger.edit_bundle("B-9", edit).unwrap_err();

    assert!(matches!(err, LedgerError::NotFound { entity: "bundle", .. }));
    assert_eq!(f.ledger.store().bundle_size("B-9").unwrap(), 0);
    assert_eq!(f.totals("Premium"), (90, 100, 10));
    assert_eq!(f.ledger.store().event_count().unwrap(), events);
}

#[test]
fn empty_bundle_edit_is_rejected() {
    let f = setup();
    f.three_item_bundle();
    let err = f
        .ledger
        .edit_bundle("B-1", BundleEdit::default())
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn bundle_operations_are_logged() {
    let f = setup();
    f.three_item_bundle();
    f.ledger.delete_bundle("B-1").unwrap();

    let events: Vec<LedgerEvent> = f
        .ledger
        .store()
        .events()
        .unwrap()
        .iter()
        .map(|e| e.decode().unwrap())
        .collect();

    let deleted = events
        .iter()
        .filter(|e| matches!(e, LedgerEvent::SaleDeleted { bundle_id: Some(b), .. } if b == "B-1"))
        .count();
    assert_eq!(deleted, 3);
    assert!(matches!(
        events.last(),
        Some(LedgerEvent::BundleDeleted { line_items: 3, .. })
    ));
}
