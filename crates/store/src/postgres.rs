use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, EventId, Money, OrderId, OrderStatus, TicketTypeId};
use sqlx::{PgConnection, PgPool, Row, postgres::PgExecutor, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventRecord, Grant, LineRequest, OrderLineRecord, OrderRecord, PlaceOrderOutcome,
    RefundApproval, ReservationOutcome, Result, Shortfall, StatusChange, StatusHistoryRecord,
    StoreError, TicketTypeRecord, lock_order, store::TicketingStore,
};

const ORDER_COLUMNS: &str = "id, buyer_id, event_id, subtotal_cents, service_fee_cents, \
     net_amount_cents, status, payment_method, refund_reason, refund_requested_at, \
     refund_approved_by, created_at, updated_at, version";

/// PostgreSQL-backed ticketing store.
///
/// Reservations are conditional `UPDATE ... WHERE available >= $qty` statements
/// issued in ascending ticket type order inside one transaction, so the
/// check and the decrement are a single row-locked step and two multi-line
/// checkouts can never wait on each other in a cycle.
#[derive(Clone)]
pub struct PostgresTicketingStore {
    pool: PgPool,
}

impl PostgresTicketingStore {
    /// Creates a new PostgreSQL ticketing store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_ticket_type(row: &PgRow) -> Result<TicketTypeRecord> {
        Ok(TicketTypeRecord {
            id: TicketTypeId::new(row.try_get::<String, _>("id")?),
            event_id: EventId::new(row.try_get::<String, _>("event_id")?),
            name: row.try_get("name")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            total_quantity: to_u32(row.try_get("total_quantity")?, "total_quantity")?,
            available: to_u32(row.try_get("available")?, "available")?,
        })
    }

    fn row_to_order(row: &PgRow, lines: Vec<OrderLineRecord>) -> Result<OrderRecord> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer_id: BuyerId::new(row.try_get::<String, _>("buyer_id")?),
            event_id: EventId::new(row.try_get::<String, _>("event_id")?),
            lines,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            service_fee: Money::from_cents(row.try_get("service_fee_cents")?),
            net_amount: Money::from_cents(row.try_get("net_amount_cents")?),
            status,
            payment_method: row.try_get("payment_method")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
            refund_reason: row.try_get("refund_reason")?,
            refund_requested_at: row.try_get("refund_requested_at")?,
            refund_approved_by: row.try_get("refund_approved_by")?,
        })
    }

    /// Loads the lines of several orders, grouped by order id.
    async fn load_lines<'e, E: PgExecutor<'e>>(
        executor: E,
        order_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<OrderLineRecord>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, ticket_type_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(executor)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderLineRecord>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            grouped.entry(order_id).or_default().push(OrderLineRecord {
                ticket_type_id: TicketTypeId::new(row.try_get::<String, _>("ticket_type_id")?),
                quantity: to_u32(row.try_get("quantity")?, "quantity")?,
                unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            });
        }
        Ok(grouped)
    }

    async fn orders_with_lines(&self, rows: Vec<PgRow>) -> Result<Vec<OrderRecord>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut lines = Self::load_lines(&self.pool, &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

/// Explains why a version-guarded order update matched no row.
async fn guard_failure(
    conn: &mut PgConnection,
    order_id: OrderId,
    expected_version: i64,
) -> Result<StoreError> {
    let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(match actual {
        None => StoreError::OrderNotFound(order_id),
        Some(actual) => StoreError::ConcurrentModification {
            order_id,
            expected: expected_version,
            actual,
        },
    })
}

/// Conditionally decrements every line, in lock order, on one connection.
///
/// The caller owns the transaction and must roll it back on `Rejected` or error.
async fn reserve_in(conn: &mut PgConnection, lines: &[LineRequest]) -> Result<ReservationOutcome> {
    let mut grants = Vec::new();

    for line in lock_order(lines) {
        let quantity = to_i32(line.quantity, "quantity")?;
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE ticket_types
            SET available = available - $2
            WHERE id = $1 AND available >= $2
            RETURNING available
            "#,
        )
        .bind(line.ticket_type_id.as_str())
        .bind(quantity)
        .fetch_optional(&mut *conn)
        .await?;

        match remaining {
            Some(remaining) => grants.push(Grant {
                remaining: to_u32(remaining, "available")?,
                ticket_type_id: line.ticket_type_id,
                quantity: line.quantity,
            }),
            None => {
                let available: Option<i32> =
                    sqlx::query_scalar("SELECT available FROM ticket_types WHERE id = $1")
                        .bind(line.ticket_type_id.as_str())
                        .fetch_optional(&mut *conn)
                        .await?;

                return match available {
                    None => Err(StoreError::UnknownTicketType(line.ticket_type_id)),
                    Some(available) => {
                        tracing::debug!(
                            ticket_type_id = %line.ticket_type_id,
                            requested = line.quantity,
                            available,
                            "reservation rejected"
                        );
                        Ok(ReservationOutcome::Rejected(Shortfall {
                            available: to_u32(available, "available")?,
                            ticket_type_id: line.ticket_type_id,
                            requested: line.quantity,
                        }))
                    }
                };
            }
        }
    }

    Ok(ReservationOutcome::Granted(grants))
}

/// Conditionally increments availability, refusing to pass the total.
async fn release_in(conn: &mut PgConnection, id: &TicketTypeId, quantity: u32) -> Result<u32> {
    let next: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE ticket_types
        SET available = available + $2
        WHERE id = $1 AND available + $2 <= total_quantity
        RETURNING available
        "#,
    )
    .bind(id.as_str())
    .bind(to_i32(quantity, "quantity")?)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(next) = next {
        return to_u32(next, "available");
    }

    let current: Option<(i32, i32)> =
        sqlx::query_as("SELECT available, total_quantity FROM ticket_types WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

    match current {
        None => Err(StoreError::UnknownTicketType(id.clone())),
        Some((available, total)) => Err(StoreError::ConsistencyViolation {
            ticket_type_id: id.clone(),
            available: to_u32(available, "available")?,
            total: to_u32(total, "total_quantity")?,
            quantity,
        }),
    }
}

#[async_trait]
impl TicketingStore for PostgresTicketingStore {
    async fn insert_event(&self, event: EventRecord) -> Result<()> {
        sqlx::query("INSERT INTO events (id, name, starts_at) VALUES ($1, $2, $3)")
            .bind(event.id.as_str())
            .bind(&event.name)
            .bind(event.starts_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return StoreError::Duplicate {
                        kind: "event",
                        id: event.id.to_string(),
                    };
                }
                StoreError::Database(e)
            })?;

        Ok(())
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<EventRecord>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT id, name, starts_at FROM events WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(EventRecord {
                id: EventId::new(row.try_get::<String, _>("id")?),
                name: row.try_get("name")?,
                starts_at: row.try_get::<DateTime<Utc>, _>("starts_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_ticket_type(&self, ticket_type: TicketTypeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ticket_types (id, event_id, name, unit_price_cents, total_quantity, available)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(ticket_type.id.as_str())
        .bind(ticket_type.event_id.as_str())
        .bind(&ticket_type.name)
        .bind(ticket_type.unit_price.cents())
        .bind(to_i32(ticket_type.total_quantity, "total_quantity")?)
        .bind(to_i32(ticket_type.available, "available")?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return StoreError::Duplicate {
                        kind: "ticket type",
                        id: ticket_type.id.to_string(),
                    };
                }
                if db_err.is_foreign_key_violation() {
                    return StoreError::UnknownEvent(ticket_type.event_id.clone());
                }
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_ticket_type(&self, id: &TicketTypeId) -> Result<Option<TicketTypeRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, event_id, name, unit_price_cents, total_quantity, available
            FROM ticket_types
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_ticket_type).transpose()
    }

    async fn update_unit_price(&self, id: &TicketTypeId, unit_price: Money) -> Result<()> {
        let result = sqlx::query("UPDATE ticket_types SET unit_price_cents = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(unit_price.cents())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownTicketType(id.clone()));
        }
        Ok(())
    }

    async fn reserve_all(&self, lines: &[LineRequest]) -> Result<ReservationOutcome> {
        let mut tx = self.pool.begin().await?;

        let outcome = reserve_in(&mut *tx, lines).await?;
        if outcome.is_granted() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }

        Ok(outcome)
    }

    async fn release(&self, id: &TicketTypeId, quantity: u32) -> Result<u32> {
        let mut tx = self.pool.begin().await?;
        let available = release_in(&mut *tx, id, quantity).await?;
        tx.commit().await?;
        Ok(available)
    }

    async fn place_order(&self, order: OrderRecord) -> Result<PlaceOrderOutcome> {
        let requests: Vec<LineRequest> = order
            .lines
            .iter()
            .map(|l| LineRequest::new(l.ticket_type_id.clone(), l.quantity))
            .collect();

        // Start a transaction
        let mut tx = self.pool.begin().await?;

        if let ReservationOutcome::Rejected(shortfall) = reserve_in(&mut *tx, &requests).await? {
            tx.rollback().await?;
            return Ok(PlaceOrderOutcome::Rejected(shortfall));
        }

        // Timestamps come back at the column's microsecond precision.
        let row: PgRow = sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.id.as_uuid())
        .bind(order.buyer_id.as_str())
        .bind(order.event_id.as_str())
        .bind(order.subtotal.cents())
        .bind(order.service_fee.cents())
        .bind(order.net_amount.cents())
        .bind(order.status.as_str())
        .bind(&order.payment_method)
        .bind(order.refund_reason.as_deref())
        .bind(order.refund_requested_at)
        .bind(order.refund_approved_by.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return StoreError::Duplicate {
                        kind: "order",
                        id: order.id.to_string(),
                    };
                }
                if db_err.is_foreign_key_violation() {
                    return StoreError::UnknownEvent(order.event_id.clone());
                }
            }
            StoreError::Database(e)
        })?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, ticket_type_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_no as i32)
            .bind(line.ticket_type_id.as_str())
            .bind(to_i32(line.quantity, "quantity")?)
            .bind(line.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        let placed = Self::row_to_order(&row, order.lines)?;
        tx.commit().await?;
        Ok(PlaceOrderOutcome::Placed(placed))
    }

    async fn transition_order(&self, change: StatusChange) -> Result<OrderRecord> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            "UPDATE orders \
             SET status = $1, version = version + 1, updated_at = $2, \
                 refund_reason = COALESCE($3, refund_reason), \
                 refund_requested_at = COALESCE($4, refund_requested_at) \
             WHERE id = $5 AND version = $6 AND status = $7 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(change.to.as_str())
        .bind(change.at)
        .bind(change.refund_reason.as_deref())
        .bind(change.refund_requested_at)
        .bind(change.order_id.as_uuid())
        .bind(change.expected_version)
        .bind(change.from.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(guard_failure(&mut *tx, change.order_id, change.expected_version).await?);
        };

        let order_uuid = change.order_id.as_uuid();
        let lines = Self::load_lines(&mut *tx, &[order_uuid])
            .await?
            .remove(&order_uuid)
            .unwrap_or_default();

        if change.releases_inventory() {
            let requests: Vec<LineRequest> = lines
                .iter()
                .map(|l| LineRequest::new(l.ticket_type_id.clone(), l.quantity))
                .collect();
            for line in lock_order(&requests) {
                // An error here drops the transaction, undoing the status update too.
                release_in(&mut *tx, &line.ticket_type_id, line.quantity).await?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, actor, changed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order_uuid)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(&change.actor)
        .bind(change.at)
        .execute(&mut *tx)
        .await?;

        let order = Self::row_to_order(&row, lines)?;
        tx.commit().await?;
        Ok(order)
    }

    async fn set_refund_approval(&self, approval: RefundApproval) -> Result<OrderRecord> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            "UPDATE orders \
             SET refund_approved_by = $1, version = version + 1, updated_at = $2 \
             WHERE id = $3 AND version = $4 AND status = 'refund_pending' \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(approval.approved_by.as_deref())
        .bind(approval.at)
        .bind(approval.order_id.as_uuid())
        .bind(approval.expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let err = guard_failure(&mut *tx, approval.order_id, approval.expected_version).await?;
            return Err(err);
        };

        let order_uuid = approval.order_id.as_uuid();
        let lines = Self::load_lines(&mut *tx, &[order_uuid])
            .await?
            .remove(&order_uuid)
            .unwrap_or_default();

        let order = Self::row_to_order(&row, lines)?;
        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.orders_with_lines(rows).await?.into_iter().next())
    }

    async fn get_orders_by_buyer(&self, buyer_id: &BuyerId) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(buyer_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.orders_with_lines(rows).await
    }

    async fn get_pending_orders_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE status = 'pending' AND created_at < $1 \
             ORDER BY created_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        self.orders_with_lines(rows).await
    }

    async fn get_status_history(&self, id: OrderId) -> Result<Vec<StatusHistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, from_status, to_status, actor, changed_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let parse = |column: &str| -> Result<OrderStatus> {
                    row.try_get::<String, _>(column)?
                        .parse::<OrderStatus>()
                        .map_err(|e| StoreError::Corrupt(e.to_string()))
                };
                Ok(StatusHistoryRecord {
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                    from: parse("from_status")?,
                    to: parse("to_status")?,
                    actor: row.try_get("actor")?,
                    changed_at: row.try_get("changed_at")?,
                })
            })
            .collect()
    }
}
