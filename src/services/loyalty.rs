use std::collections::HashMap;

use futures::future::join_all;
use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{
    api::MarketplaceApi,
    models::{LoyaltyAccount, SellerId},
};

/// `floor(min(balance, subtotal * max% / 100 / rate))`; zero without a linked account.
pub fn max_redeemable(account: Option<&LoyaltyAccount>, group_subtotal: Decimal) -> i64 {
    let Some(account) = account else {
        return 0;
    };
    if account.points_balance <= 0
        || account.points_to_ruble_rate <= Decimal::ZERO
        || account.max_points_discount_percent <= Decimal::ZERO
        || group_subtotal <= Decimal::ZERO
    {
        return 0;
    }

    let cap = group_subtotal * account.max_points_discount_percent
        / Decimal::ONE_HUNDRED
        / account.points_to_ruble_rate;
    let ceiling = cap.min(Decimal::from(account.points_balance)).floor();
    ceiling.to_i64().unwrap_or(0)
}

pub fn points_discount(account: Option<&LoyaltyAccount>, points: i64) -> Decimal {
    match account {
        Some(account) if points > 0 => Decimal::from(points) * account.points_to_ruble_rate,
        _ => Decimal::ZERO,
    }
}

/// Looks up every seller's account concurrently. A failed lookup reads as
/// "not linked" so the buyer can still check out without points.
pub async fn load_accounts(
    api: &dyn MarketplaceApi,
    sellers: &[SellerId],
) -> HashMap<SellerId, Option<LoyaltyAccount>> {
    let lookups = sellers.iter().map(|&seller_id| async move {
        let account = match api.get_loyalty(seller_id).await {
            Ok(account) => account,
            Err(err) => {
                tracing::warn!(seller_id, error = %err, "loyalty lookup failed");
                None
            }
        };
        (seller_id, account)
    });
    join_all(lookups).await.into_iter().collect()
}
