//! CreateSale / UpdateSale / DeleteSale tests, including the
//! V1 / "Premium" walkthrough.

use ledger_core::{
    Ledger, LedgerError, LedgerPolicy, LedgerWarning, NewPurchase, NewSale, OversellPolicy,
    SalePatch,
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
        .add_customer("Alice", Some("555-0100"), None)
        .unwrap();
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

    fn buy(&self, service: &str, credits: i64) {
        self.ledger
            .record_purchase(&NewPurchase::new(self.vendor, service, credits, credits as f64 * 5.0))
            .unwrap();
    }

    fn sale(&self, service: &str, credits: i64) -> NewSale {
        NewSale::new(self.customer, service, credits, credits as f64 * 10.0)
            .from_vendor(self.vendor, service)
    }
}

#[test]
fn premium_walkthrough() {
    let f = setup();

    f.buy("Premium", 100);
    assert_eq!(f.totals("Premium"), (100, 100, 0));

    let sale = f.ledger.create_sale(f.sale("Premium", 12)).unwrap().value;
    assert_eq!(f.totals("Premium"), (88, 100, 12));

    f.ledger.update_sale(sale, SalePatch::credits(18)).unwrap();
    assert_eq!(f.totals("Premium"), (82, 100, 18));

    f.ledger.delete_sale(sale).unwrap();
    assert_eq!(f.totals("Premium"), (100, 100, 0));
}

#[test]
fn sale_then_delete_restores_balance_exactly() {
    let f = setup();
    f.buy("Premium", 50);
    f.ledger.create_sale(f.sale("Premium", 7)).unwrap();
    let before = f.totals("Premium");

    let sale = f.ledger.create_sale(f.sale("Premium", 10)).unwrap().value;
    f.ledger.delete_sale(sale).unwrap();

    assert_eq!(f.totals("Premium"), before);
}

#[test]
fn update_up_then_back_down_is_symmetric() {
    let f = setup();
    f.buy("Premium", 100);
    let sale = f.ledger.create_sale(f.sale("Premium", 10)).unwrap().value;
    let after_create = f.totals("Premium");

    f.ledger.update_sale(sale, SalePatch::credits(25)).unwrap();
    assert_eq!(f.totals("Premium"), (75, 100, 25));
    f.ledger.update_sale(sale, SalePatch::credits(10)).unwrap();

    assert_eq!(f.totals("Premium"), after_create);
}

#[test]
fn update_of_missing_sale_changes_nothing() {
    let f = setup();
    f.buy("Premium", 100);
    f.buy("Basic", 20);
    f.ledger.create_sale(f.sale("Premium", 10)).unwrap();
    let premium = f.totals("Premium");
    let basic = f.totals("Basic");
    let events = f.ledger.store().event_count().unwrap();

    let err = f
        .ledger
        .update_sale(4242, SalePatch::credits(99))
        .unwrap_err();

    assert!(matches!(err, LedgerError::NotFound { entity: "subscription", .. }));
    assert_eq!(f.totals("Premium"), premium);
    assert_eq!(f.totals("Basic"), basic);
    assert_eq!(f.ledger.store().event_count().unwrap(), events);
}

#[test]
fn non_credit_fields_update_without_touching_balance() {
    let f = setup();
    f.buy("Premium", 100);
    let sale = f.ledger.create_sale(f.sale("Premium", 10)).unwrap().value;

    f.ledger
        .update_sale(
            sale,
            SalePatch {
                amount_paid: Some(150.0),
                classification: Some("reseller".into()),
                order_status: Some("delivered".into()),
                ..SalePatch::default()
            },
        )
        .unwrap();

    assert_eq!(f.totals("Premium"), (90, 100, 10));
    let row = f.ledger.store().subscription(sale).unwrap().unwrap();
    assert_eq!(row.amount_paid, 150.0);
    assert_eq!(row.classification.as_deref(), Some("reseller"));
    assert_eq!(row.order_status.as_deref(), Some("delivered"));
    assert_eq!(row.credits_used, 10);
}

#[test]
fn oversell_is_permitted_and_reported() {
    let f = setup();
    f.buy("Premium", 5);

    let outcome = f.ledger.create_sale(f.sale("Premium", 8)).unwrap();

    assert_eq!(f.totals("Premium"), (-3, 5, 8));
    assert_eq!(
        outcome.warnings,
        vec![LedgerWarning::Oversold {
            vendor_id: f.vendor,
            service_name: "Premium".into(),
            remaining: -3,
        }]
    );
}

#[test]
fn oversell_is_rejected_under_reject_policy() {
    let mut f = setup();
    f.ledger.set_policy(LedgerPolicy {
        oversell: OversellPolicy::Reject,
        ..LedgerPolicy::default()
    });
    f.buy("Premium", 5);

    let err = f.ledger.create_sale(f.sale("Premium", 8)).unwrap_err();

    match err {
        LedgerError::InsufficientCredits { remaining, requested, .. } => {
            assert_eq!((remaining, requested), (5, 8));
        }
        other => panic!("expected InsufficientCredits, got {other:?}"),
    }
    assert_eq!(f.totals("Premium"), (5, 5, 0));
    assert!(f.ledger.store().subscriptions().unwrap().is_empty());

    // Selling exactly what is left is fine.
    f.ledger.create_sale(f.sale("Premium", 5)).unwrap();
    assert_eq!(f.totals("Premium"), (0, 5, 5));
}

#[test]
fn reducing_an_oversold_sale_is_never_rejected() {
    let f = setup();
    f.buy("Premium", 5);
    let sale = f.ledger.create_sale(f.sale("Premium", 8)).unwrap().value;

    let mut strict = f;
    strict.ledger.set_policy(LedgerPolicy {
        oversell: OversellPolicy::Reject,
        ..LedgerPolicy::default()
    });
    let outcome = strict
        .ledger
        .update_sale(sale, SalePatch::credits(6))
        .unwrap();

    assert!(outcome.warnings.is_empty());
    assert_eq!(strict.totals("Premium"), (-1, 5, 6));
}

#[test]
fn sale_without_vendor_leaves_balances_alone() {
    let f = setup();
    f.buy("Premium", 100);

    let sale = f
        .ledger
        .create_sale(NewSale::new(f.customer, "Premium", 10, 100.0))
        .unwrap()
        .value;

    assert_eq!(f.totals("Premium"), (100, 100, 0));
    let row = f.ledger.store().subscription(sale).unwrap().unwrap();
    assert_eq!(row.vendor_service_name, None);
    f.ledger.delete_sale(sale).unwrap();
    assert_eq!(f.totals("Premium"), (100, 100, 0));
}

#[test]
fn zero_credit_sale_does_not_touch_balance() {
    let f = setup();
    f.buy("Premium", 100);
    let outcome = f.ledger.create_sale(f.sale("Premium", 0)).unwrap();
    assert!(outcome.warnings.is_empty());
    assert_eq!(f.totals("Premium"), (100, 100, 0));
}

#[test]
fn vendor_service_defaults_to_sale_service_name() {
    let f = setup();
    f.buy("Premium", 100);
    let mut sale = NewSale::new(f.customer, "Premium", 4, 40.0);
    sale.vendor_id = Some(f.vendor);

    f.ledger.create_sale(sale).unwrap();

    assert_eq!(f.totals("Premium"), (96, 100, 4));
}

#[test]
fn moving_a_sale_to_another_service_moves_its_credits() {
    let f = setup();
    f.buy("Premium", 100);
    f.buy("Basic", 50);
    let sale = f.ledger.create_sale(f.sale("Premium", 10)).unwrap().value;

    f.ledger
        .update_sale(
            sale,
            SalePatch {
                credits_used: Some(12),
                vendor_service_name: Some("Basic".into()),
                ..SalePatch::default()
            },
        )
        .unwrap();

    assert_eq!(f.totals("Premium"), (100, 100, 0));
    assert_eq!(f.totals("Basic"), (38, 50, 12));
}

#[test]
fn negative_credits_and_unknown_customer_are_rejected() {
    let f = setup();
    f.buy("Premium", 100);

    let negative = f.ledger.create_sale(f.sale("Premium", -1));
    assert!(matches!(negative, Err(LedgerError::Validation(_))));

    let stranger = NewSale::new(777, "Premium", 1, 10.0).from_vendor(f.vendor, "Premium");
    let unknown = f.ledger.create_sale(stranger);
    assert!(matches!(unknown, Err(LedgerError::NotFound { entity: "customer", .. })));

    assert_eq!(f.totals("Premium"), (100, 100, 0));
}

#[test]
fn deleting_missing_sale_is_not_found() {
    let f = setup();
    let err = f.ledger.delete_sale(31337).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[test]
fn sale_against_pair_without_balance_warns_by_default() {
    let f = setup();

    let outcome = f.ledger.create_sale(f.sale("Unstocked", 3)).unwrap();

    assert!(matches!(
        outcome.warnings.as_slice(),
        [LedgerWarning::MissingBalance { remaining_delta: -3, .. }]
    ));
    assert!(f.ledger.store().credit_balance(f.vendor, "Unstocked").unwrap().is_none());
}

#[test]
fn sale_against_pair_without_balance_fails_when_strict() {
    let mut f = setup();
    f.ledger.set_policy(LedgerPolicy::strict());

    let err = f.ledger.create_sale(f.sale("Unstocked", 3)).unwrap_err();

    assert!(matches!(err, LedgerError::Consistency { .. }));
    assert!(f.ledger.store().subscriptions().unwrap().is_empty());
}

#[test]
fn sale_overflowing_oversold_balance_is_rejected() {
    let f = setup();
    f.buy("Premium", 1);
    f.ledger.create_sale(f.sale("Premium", 10)).unwrap();
    assert_eq!(f.totals("Premium"), (-9, 1, 10));

    let err = f
        .ledger
        .create_sale(f.sale("Premium", i64::MAX))
        .unwrap_err();

    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(f.totals("Premium"), (-9, 1, 10));
    assert_eq!(f.ledger.store().subscriptions().unwrap().len(), 1);
}
