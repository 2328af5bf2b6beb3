//! # Order Repository
//!
//! Database operations for retail orders and their lines.
//!
//! ## Commission Columns
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  order_items                                                            │
//! │                                                                         │
//! │  commission_rate          NULL until the order's commissions run,       │
//! │                           then frozen (snapshot)                        │
//! │  commission_amount_cents  0 = not computed; written once                │
//! │  commission_paid          0 → 1 exactly once (WHERE commission_paid = 0)│
//! │  commission_paid_at       set together with commission_paid             │
//! │  payout_id                payout run that paid the line                 │
//! │                                                                         │
//! │  Only the commission and payout services write these columns.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use clipper_core::payout::{PayableEntry, PayableSource};
use clipper_core::{CommissionRate, Money, Order, OrderLineItem, OrderStatus, PayoutPeriod};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{parse_rate, placeholders, PayableRow};
use crate::error::{DbError, DbResult};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    barber_id: String,
    location_id: Option<String>,
    status: OrderStatus,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            barber_id: row.barber_id,
            location_id: row.location_id,
            status: row.status,
            paid_at: row.paid_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    order_id: String,
    product_id: Option<String>,
    position: i64,
    quantity: u32,
    unit_price_cents: i64,
    line_total_cents: i64,
    commission_rate: Option<String>,
    commission_amount_cents: i64,
    commission_paid: bool,
    commission_paid_at: Option<DateTime<Utc>>,
    payout_id: Option<String>,
}

impl TryFrom<ItemRow> for OrderLineItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> DbResult<Self> {
        Ok(OrderLineItem {
            commission_rate: parse_rate("order_items", row.commission_rate.as_deref())?,
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            position: row.position,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
            line_total: Money::from_cents(row.line_total_cents),
            commission_amount: Money::from_cents(row.commission_amount_cents),
            commission_paid: row.commission_paid,
            commission_paid_at: row.commission_paid_at,
            payout_id: row.payout_id,
        })
    }
}

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, position, quantity,
    unit_price_cents, line_total_cents,
    commission_rate, commission_amount_cents,
    commission_paid, commission_paid_at, payout_id
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts an order header.
    pub async fn insert_order(&self, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, barber_id = %order.barber_id, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (id, barber_id, location_id, status, paid_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.id)
        .bind(&order.barber_id)
        .bind(&order.location_id)
        .bind(order.status)
        .bind(order.paid_at)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds a line to an order.
    pub async fn insert_item(&self, item: &OrderLineItem) -> DbResult<()> {
        debug!(order_id = %item.order_id, item_id = %item.id, "Adding order line");

        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, position, quantity,
                unit_price_cents, line_total_cents,
                commission_rate, commission_amount_cents,
                commission_paid, commission_paid_at, payout_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(item.position)
        .bind(item.quantity)
        .bind(item.unit_price.to_cents())
        .bind(item.line_total.to_cents())
        .bind(item.commission_rate.map(|r| r.to_string()))
        .bind(item.commission_amount.to_cents())
        .bind(item.commission_paid)
        .bind(item.commission_paid_at)
        .bind(&item.payout_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks a pending order as paid.
    pub async fn mark_order_paid(&self, id: &str, paid_at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'paid', paid_at = ?1 WHERE id = ?2 AND status = 'pending'",
        )
        .bind(paid_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Pending order", id));
        }
        Ok(())
    }

    /// Gets an order by ID.
    pub async fn get_order(&self, id: &str) -> DbResult<Option<Order>> {
        Self::get_order_in(&mut *self.pool.acquire().await?, id).await
    }

    /// [`get_order`](Self::get_order) on a caller-provided connection.
    pub async fn get_order_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, barber_id, location_id, status, paid_at, created_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(Order::from))
    }

    /// Gets the lines of an order in storage order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderLineItem>> {
        Self::items_in(&mut *self.pool.acquire().await?, order_id).await
    }

    /// [`items`](Self::items) on a caller-provided connection.
    pub async fn items_in(
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> DbResult<Vec<OrderLineItem>> {
        let sql = format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY position, id",
            ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(order_id)
            .fetch_all(conn)
            .await?;

        rows.into_iter().map(OrderLineItem::try_from).collect()
    }

    /// Gets a single line.
    pub async fn get_item(&self, id: &str) -> DbResult<Option<OrderLineItem>> {
        let sql = format!("SELECT {} FROM order_items WHERE id = ?1", ITEM_COLUMNS);
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(OrderLineItem::try_from).transpose()
    }

    /// Writes a freshly computed commission onto a line.
    ///
    /// Guarded so a line is written at most once: the update only matches an
    /// unpaid line with no cached amount whose snapshot is absent or equal
    /// to `rate`. Returns the number of rows changed (0 or 1).
    pub async fn cache_commission_in(
        conn: &mut SqliteConnection,
        item_id: &str,
        rate: CommissionRate,
        amount: Money,
    ) -> DbResult<u64> {
        let rate_text = rate.to_string();
        let result = sqlx::query(
            r#"
            UPDATE order_items
            SET commission_rate = ?1, commission_amount_cents = ?2
            WHERE id = ?3
              AND commission_paid = 0
              AND commission_amount_cents = 0
              AND (commission_rate IS NULL OR commission_rate = ?1)
            "#,
        )
        .bind(&rate_text)
        .bind(amount.to_cents())
        .bind(item_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Committed, unpaid lines of the barber's paid orders.
    pub async fn payable_for_barber(&self, period: &PayoutPeriod) -> DbResult<Vec<PayableEntry>> {
        Self::payable_in(&mut *self.pool.acquire().await?, period).await
    }

    /// [`payable_for_barber`](Self::payable_for_barber) on a caller-provided connection.
    pub async fn payable_in(
        conn: &mut SqliteConnection,
        period: &PayoutPeriod,
    ) -> DbResult<Vec<PayableEntry>> {
        let rows = sqlx::query_as::<_, PayableRow>(
            r#"
            SELECT
                i.id AS id,
                o.barber_id AS barber_id,
                i.commission_amount_cents AS amount_cents,
                o.paid_at AS settled_at,
                i.commission_paid AS paid
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            WHERE o.barber_id = ?1
              AND o.status = 'paid'
              AND o.paid_at >= ?2
              AND o.paid_at < ?3
              AND i.commission_paid = 0
              AND i.commission_rate IS NOT NULL
              AND i.commission_amount_cents > 0
            ORDER BY o.paid_at, o.id, i.position, i.id
            "#,
        )
        .bind(period.barber_id.as_str())
        .bind(period.start)
        .bind(period.end)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_entry(PayableSource::OrderLine))
            .collect())
    }

    /// Marks committed lines of the barber's orders as paid.
    ///
    /// `WHERE commission_paid = 0` makes repeats a no-op: already-paid lines
    /// are not touched and keep their original `commission_paid_at`.
    /// Returns the number of lines that changed.
    pub async fn mark_paid_in(
        conn: &mut SqliteConnection,
        barber_id: &str,
        item_ids: &[String],
        payout_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> DbResult<u64> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"
            UPDATE order_items
            SET commission_paid = 1,
                commission_paid_at = ?,
                payout_id = COALESCE(?, payout_id)
            WHERE commission_paid = 0
              AND commission_amount_cents > 0
              AND order_id IN (SELECT id FROM orders WHERE barber_id = ?)
              AND id IN ({})
            "#,
            placeholders(item_ids.len())
        );

        let mut query = sqlx::query(&sql).bind(paid_at).bind(payout_id).bind(barber_id);
        for id in item_ids {
            query = query.bind(id);
        }

        let result = query.execute(conn).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::barber::Barber;
    use chrono::TimeZone;

    fn all_time() -> PayoutPeriod {
        PayoutPeriod::new(
            "barber-1",
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn order(status: OrderStatus) -> Order {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 15, 0, 0).unwrap();
        Order {
            id: "order-1".to_string(),
            barber_id: "barber-1".to_string(),
            location_id: None,
            status,
            paid_at: (status == OrderStatus::Paid).then_some(at),
            created_at: at,
        }
    }

    fn item(id: &str, position: i64, cents: i64) -> OrderLineItem {
        OrderLineItem {
            id: id.to_string(),
            order_id: "order-1".to_string(),
            product_id: None,
            position,
            quantity: 1,
            unit_price: Money::from_cents(cents),
            line_total: Money::from_cents(cents),
            commission_rate: None,
            commission_amount: Money::zero(),
            commission_paid: false,
            commission_paid_at: None,
            payout_id: None,
        }
    }

    async fn setup(status: OrderStatus) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
        db.orders().insert_order(&order(status)).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_items_come_back_in_position_order() {
        let db = setup(OrderStatus::Paid).await;
        let repo = db.orders();
        repo.insert_item(&item("z", 1, 1000)).await.unwrap();
        repo.insert_item(&item("a", 2, 2000)).await.unwrap();

        let items = repo.items("order-1").await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[tokio::test]
    async fn test_cache_commission_writes_once() {
        let db = setup(OrderStatus::Paid).await;
        db.orders().insert_item(&item("a", 1, 4550)).await.unwrap();
        let rate: CommissionRate = "0.15".parse().unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let first = OrderRepository::cache_commission_in(&mut conn, "a", rate, Money::from_cents(683))
            .await
            .unwrap();
        let second = OrderRepository::cache_commission_in(&mut conn, "a", rate, Money::from_cents(999))
            .await
            .unwrap();
        drop(conn);

        assert_eq!((first, second), (1, 0));
        let stored = db.orders().get_item("a").await.unwrap().unwrap();
        assert_eq!(stored.commission_amount, Money::from_cents(683));
        assert_eq!(stored.commission_rate, Some(rate));
    }

    #[tokio::test]
    async fn test_mark_paid_is_idempotent() {
        let db = setup(OrderStatus::Paid).await;
        let mut line = item("a", 1, 4550);
        line.commission_rate = Some("0.15".parse().unwrap());
        line.commission_amount = Money::from_cents(683);
        db.orders().insert_item(&line).await.unwrap();

        let first_at = Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap();
        let ids = vec!["a".to_string()];

        let mut conn = db.pool().acquire().await.unwrap();
        let first = OrderRepository::mark_paid_in(&mut conn, "barber-1", &ids, None, first_at)
            .await
            .unwrap();
        let second = OrderRepository::mark_paid_in(&mut conn, "barber-1", &ids, None, later)
            .await
            .unwrap();
        drop(conn);

        assert_eq!((first, second), (1, 0));
        let stored = db.orders().get_item("a").await.unwrap().unwrap();
        assert!(stored.commission_paid);
        assert_eq!(stored.commission_paid_at, Some(first_at));
        assert!(db.orders().payable_for_barber(&all_time()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_paid_ignores_other_barbers_lines() {
        let db = setup(OrderStatus::Paid).await;
        let mut line = item("a", 1, 4550);
        line.commission_rate = Some("0.15".parse().unwrap());
        line.commission_amount = Money::from_cents(683);
        db.orders().insert_item(&line).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let changed = OrderRepository::mark_paid_in(&mut conn, "barber-2", &["a".to_string()], None, Utc::now())
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn test_payable_excludes_unpaid_orders_and_uncommitted_lines() {
        let db = setup(OrderStatus::Pending).await;
        let mut line = item("a", 1, 4550);
        line.commission_rate = Some("0.15".parse().unwrap());
        line.commission_amount = Money::from_cents(683);
        db.orders().insert_item(&line).await.unwrap();
        db.orders().insert_item(&item("b", 2, 1000)).await.unwrap();

        assert!(db.orders().payable_for_barber(&all_time()).await.unwrap().is_empty());

        db.orders().mark_order_paid("order-1", Utc::now()).await.unwrap();
        let payable = db.orders().payable_for_barber(&all_time()).await.unwrap();
        assert_eq!(payable.len(), 1);
        assert_eq!(payable[0].id, "a");
        assert_eq!(payable[0].amount, Money::from_cents(683));
    }
}
