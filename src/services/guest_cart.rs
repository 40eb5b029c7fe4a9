use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::{
    db::DbPool,
    error::{AppError, AppResult},
    models::{DeliveryCapability, GuestCartEntry, ProductId, SellerId},
};

#[derive(FromRow)]
struct GuestCartRow {
    product_id: i64,
    seller_id: i64,
    seller_name: String,
    name: String,
    price: String,
    quantity: i32,
    is_preorder: bool,
    preorder_date: Option<NaiveDate>,
    photo: Option<String>,
    seller_delivery_type: Option<String>,
    seller_city_id: Option<i64>,
}

impl GuestCartRow {
    fn into_entry(self) -> AppResult<GuestCartEntry> {
        let price = self.price.parse::<Decimal>().map_err(|err| {
            AppError::Internal(anyhow::anyhow!(
                "corrupt guest cart price {:?}: {err}",
                self.price
            ))
        })?;
        Ok(GuestCartEntry {
            product_id: self.product_id,
            seller_id: self.seller_id,
            seller_name: self.seller_name,
            name: self.name,
            price,
            quantity: self.quantity,
            is_preorder: self.is_preorder,
            preorder_date: self.preorder_date,
            photo: self.photo,
            seller_delivery_type: self.seller_delivery_type.as_deref().and_then(capability_from_str),
            seller_city_id: self.seller_city_id,
        })
    }
}

fn capability_to_str(capability: DeliveryCapability) -> &'static str {
    match capability {
        DeliveryCapability::Delivery => "delivery",
        DeliveryCapability::Pickup => "pickup",
        DeliveryCapability::Both => "both",
    }
}

fn capability_from_str(raw: &str) -> Option<DeliveryCapability> {
    match raw {
        "delivery" => Some(DeliveryCapability::Delivery),
        "pickup" => Some(DeliveryCapability::Pickup),
        "both" => Some(DeliveryCapability::Both),
        _ => None,
    }
}

/// Durable cart for buyers without a session, keyed by (product, seller).
/// Guest lines are never stock-reserved.
#[derive(Debug, Clone)]
pub struct GuestCartStore {
    pool: DbPool,
}

impl GuestCartStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> AppResult<Vec<GuestCartEntry>> {
        let rows = sqlx::query_as::<_, GuestCartRow>(
            r#"
            SELECT product_id, seller_id, seller_name, name, price, quantity, is_preorder,
                   preorder_date, photo, seller_delivery_type, seller_city_id
            FROM guest_cart_entries
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GuestCartRow::into_entry).collect()
    }

    /// Adds an entry, summing quantities with an existing (product, seller) line.
    /// Returns the resulting quantity.
    pub async fn add(&self, entry: &GuestCartEntry) -> AppResult<i32> {
        if entry.quantity <= 0 {
            return Err(AppError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }

        let (quantity,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO guest_cart_entries
                (product_id, seller_id, seller_name, name, price, quantity, is_preorder,
                 preorder_date, photo, seller_delivery_type, seller_city_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (product_id, seller_id) DO UPDATE SET
                quantity = guest_cart_entries.quantity + excluded.quantity,
                seller_name = excluded.seller_name,
                name = excluded.name,
                price = excluded.price,
                photo = COALESCE(excluded.photo, guest_cart_entries.photo)
            RETURNING quantity
            "#,
        )
        .bind(entry.product_id)
        .bind(entry.seller_id)
        .bind(&entry.seller_name)
        .bind(&entry.name)
        .bind(entry.price.to_string())
        .bind(entry.quantity)
        .bind(entry.is_preorder)
        .bind(entry.preorder_date)
        .bind(&entry.photo)
        .bind(entry.seller_delivery_type.map(capability_to_str))
        .bind(entry.seller_city_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            product_id = entry.product_id,
            seller_id = entry.seller_id,
            quantity,
            "guest cart add"
        );
        Ok(quantity)
    }

    /// Sets the quantity of a line; anything `<= 0` deletes it.
    pub async fn update(
        &self,
        product_id: ProductId,
        seller_id: SellerId,
        quantity: i32,
    ) -> AppResult<()> {
        if quantity <= 0 {
            return self.remove(product_id, seller_id).await;
        }

        let result = sqlx::query(
            "UPDATE guest_cart_entries SET quantity = ? WHERE product_id = ? AND seller_id = ?",
        )
        .bind(quantity)
        .bind(product_id)
        .bind(seller_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Removing a line that is not there is not an error.
    pub async fn remove(&self, product_id: ProductId, seller_id: SellerId) -> AppResult<()> {
        sqlx::query("DELETE FROM guest_cart_entries WHERE product_id = ? AND seller_id = ?")
            .bind(product_id)
            .bind(seller_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear(&self) -> AppResult<()> {
        sqlx::query("DELETE FROM guest_cart_entries")
            .execute(&self.pool)
            .await?;
        tracing::info!("guest cart cleared");
        Ok(())
    }
}
