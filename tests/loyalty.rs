mod common;

use std::sync::Arc;

use rust_decimal::Decimal;

use marketplace_cart::{
    models::LoyaltyAccount,
    services::loyalty::{load_accounts, max_redeemable, points_discount},
};

use common::{FakeApi, ManualClock, group, item, t0};

fn account(balance: i64, percent: i64, rate: Decimal) -> LoyaltyAccount {
    LoyaltyAccount {
        points_balance: balance,
        max_points_discount_percent: Decimal::from(percent),
        points_to_ruble_rate: rate,
    }
}

#[test]
fn redeeming_within_both_limits() {
    let subtotal = group(
        1,
        "Flower Lab",
        vec![item(10, "Roses", 500, 2), item(11, "Peonies", 1000, 1)],
    )
    .subtotal();
    assert_eq!(subtotal, Decimal::from(2000));

    let account = account(200, 50, Decimal::ONE);
    let ceiling = max_redeemable(Some(&account), subtotal);
    assert_eq!(ceiling, 200);
    assert!(100 <= ceiling);
    assert_eq!(points_discount(Some(&account), 100), Decimal::from(100));
}

#[test]
fn percentage_cap_wins_over_large_balance() {
    let account = account(10_000, 30, Decimal::new(5, 1));
    // 1000 * 30% / 0.5
    assert_eq!(max_redeemable(Some(&account), Decimal::from(1000)), 600);
    assert_eq!(points_discount(Some(&account), 600), Decimal::from(300));
}

#[test]
fn fractional_ceiling_rounds_down() {
    let account = account(500, 10, Decimal::ONE);
    assert_eq!(max_redeemable(Some(&account), Decimal::from(999)), 99);
}

#[test]
fn nothing_to_redeem_without_a_usable_account() {
    assert_eq!(max_redeemable(None, Decimal::from(2000)), 0);
    assert_eq!(max_redeemable(Some(&account(0, 50, Decimal::ONE)), Decimal::from(2000)), 0);
    assert_eq!(max_redeemable(Some(&account(100, 0, Decimal::ONE)), Decimal::from(2000)), 0);
    assert_eq!(max_redeemable(Some(&account(100, 50, Decimal::ZERO)), Decimal::from(2000)), 0);
    assert_eq!(max_redeemable(Some(&account(100, 50, Decimal::ONE)), Decimal::ZERO), 0);
    assert_eq!(points_discount(None, 100), Decimal::ZERO);
    assert_eq!(points_discount(Some(&account(100, 50, Decimal::ONE)), -5), Decimal::ZERO);
}

#[tokio::test]
async fn failed_lookup_reads_as_not_linked() {
    let api = FakeApi::new(ManualClock::new(t0()));
    api.loyalty.lock().unwrap().insert(1, account(300, 20, Decimal::ONE));
    api.loyalty_failures.lock().unwrap().push(2);
    let api = Arc::new(api);

    let accounts = load_accounts(&*api, &[1, 2, 3]).await;
    assert_eq!(accounts.len(), 3);
    assert_eq!(accounts[&1], Some(account(300, 20, Decimal::ONE)));
    assert_eq!(accounts[&2], None);
    assert_eq!(accounts[&3], None);
}
