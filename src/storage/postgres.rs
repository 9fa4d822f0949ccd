use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::confirmed::{ConfirmedOrder, FulfillmentStatus, OriginRef};
use crate::models::notification::{
    Audience, Notification, NotificationKind, NotificationPriority,
};
use crate::models::order::{Location, TransportOrder, TransportOrderStatus};
use crate::models::party::{Buyer, Driver, Supplier, Vehicle};
use crate::models::request::{BuyerRequest, BuyerRequestStatus};
use crate::storage::{
    ActivityKind, ActivityRecord, EntityCounts, FulfillmentCounts, Guarded, OrderStore,
    ReviewDecision, StorageError, StorageResult, WindowStats,
};

/// PostgreSQL backend. Every operation runs under a bounded timeout; a
/// timeout surfaces as `StorageError::Timeout` (transient, retryable by the
/// caller), a lost pool as `Unavailable`.
pub struct PgStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgStore {
    pub async fn connect(url: &str, op_timeout: Duration) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;

        Ok(Self { pool, op_timeout })
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StorageError::Backend(err.to_string()))
    }

    async fn guard<T, F>(&self, fut: F) -> StorageResult<T>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Err(_) => Err(StorageError::Timeout),
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_sqlx_error(err)),
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
            StorageError::Unavailable(err.to_string())
        }
        _ => StorageError::Backend(err.to_string()),
    }
}

fn corrupt(field: &str, detail: String) -> StorageError {
    StorageError::Backend(format!("corrupt {field} column: {detail}"))
}

#[derive(sqlx::FromRow)]
struct TransportOrderRow {
    id: Uuid,
    supplier_id: Uuid,
    state: String,
    district: String,
    place: String,
    taluk: Option<String>,
    vehicle_number: String,
    body_type: String,
    driver_id: Option<Uuid>,
    status: String,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    admin_action_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransportOrderRow> for TransportOrder {
    type Error = StorageError;

    fn try_from(row: TransportOrderRow) -> Result<Self, Self::Error> {
        let status: TransportOrderStatus = row
            .status
            .parse()
            .map_err(|detail| corrupt("status", detail))?;
        Ok(Self {
            id: row.id,
            supplier_id: row.supplier_id,
            location: Location {
                state: row.state,
                district: row.district,
                place: row.place,
                taluk: row.taluk,
            },
            vehicle_number: row.vehicle_number,
            body_type: row.body_type,
            driver_id: row.driver_id,
            status,
            admin_notes: row.admin_notes,
            created_at: row.created_at,
            submitted_at: row.submitted_at,
            admin_action_at: row.admin_action_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BuyerRequestRow {
    id: Uuid,
    buyer_id: Uuid,
    order_number: String,
    load_description: String,
    origin_state: String,
    origin_district: String,
    origin_place: String,
    origin_taluk: Option<String>,
    dest_state: String,
    dest_district: String,
    dest_place: String,
    dest_taluk: Option<String>,
    quantity_tonnes: f64,
    required_by: NaiveDate,
    status: String,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    admin_action_at: Option<DateTime<Utc>>,
}

impl TryFrom<BuyerRequestRow> for BuyerRequest {
    type Error = StorageError;

    fn try_from(row: BuyerRequestRow) -> Result<Self, Self::Error> {
        let status: BuyerRequestStatus = row
            .status
            .parse()
            .map_err(|detail| corrupt("status", detail))?;
        Ok(Self {
            id: row.id,
            buyer_id: row.buyer_id,
            order_number: row.order_number,
            load_description: row.load_description,
            origin: Location {
                state: row.origin_state,
                district: row.origin_district,
                place: row.origin_place,
                taluk: row.origin_taluk,
            },
            destination: Location {
                state: row.dest_state,
                district: row.dest_district,
                place: row.dest_place,
                taluk: row.dest_taluk,
            },
            quantity_tonnes: row.quantity_tonnes,
            required_by: row.required_by,
            status,
            admin_notes: row.admin_notes,
            created_at: row.created_at,
            submitted_at: row.submitted_at,
            admin_action_at: row.admin_action_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConfirmedOrderRow {
    id: Uuid,
    origin_kind: String,
    origin_id: Uuid,
    supplier_id: Option<Uuid>,
    driver_id: Option<Uuid>,
    vehicle_id: Option<Uuid>,
    status: String,
    planned_pickup: Option<NaiveDate>,
    planned_delivery: Option<NaiveDate>,
    actual_pickup: Option<DateTime<Utc>>,
    actual_delivery: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConfirmedOrderRow> for ConfirmedOrder {
    type Error = StorageError;

    fn try_from(row: ConfirmedOrderRow) -> Result<Self, Self::Error> {
        let origin = match row.origin_kind.as_str() {
            "transport_order" => OriginRef::TransportOrder(row.origin_id),
            "buyer_request" => OriginRef::BuyerRequest(row.origin_id),
            other => {
                return Err(corrupt(
                    "origin_kind",
                    format!("unknown origin kind: {other}"),
                ))
            }
        };
        let status: FulfillmentStatus = row
            .status
            .parse()
            .map_err(|detail| corrupt("status", detail))?;
        Ok(Self {
            id: row.id,
            origin,
            supplier_id: row.supplier_id,
            driver_id: row.driver_id,
            vehicle_id: row.vehicle_id,
            status,
            planned_pickup: row.planned_pickup,
            planned_delivery: row.planned_delivery,
            actual_pickup: row.actual_pickup,
            actual_delivery: row.actual_delivery,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    audience: String,
    kind: String,
    priority: String,
    message: String,
    is_read: bool,
    event_key: String,
    order_id: Option<Uuid>,
    driver_id: Option<Uuid>,
    vehicle_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StorageError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let audience: Audience = row
            .audience
            .parse()
            .map_err(|detail| corrupt("audience", detail))?;
        let kind: NotificationKind = row
            .kind
            .parse()
            .map_err(|detail| corrupt("kind", detail))?;
        let priority: NotificationPriority = row
            .priority
            .parse()
            .map_err(|detail| corrupt("priority", detail))?;
        Ok(Self {
            id: row.id,
            audience,
            kind,
            priority,
            message: row.message,
            is_read: row.is_read,
            event_key: row.event_key,
            order_id: row.order_id,
            driver_id: row.driver_id,
            vehicle_id: row.vehicle_id,
            created_at: row.created_at,
        })
    }
}

fn parse_activity_kind(raw: &str) -> Result<ActivityKind, StorageError> {
    match raw {
        "order_submitted" => Ok(ActivityKind::OrderSubmitted),
        "order_confirmed" => Ok(ActivityKind::OrderConfirmed),
        "order_rejected" => Ok(ActivityKind::OrderRejected),
        "request_submitted" => Ok(ActivityKind::RequestSubmitted),
        "shipment_delivered" => Ok(ActivityKind::ShipmentDelivered),
        "shipment_cancelled" => Ok(ActivityKind::ShipmentCancelled),
        other => Err(corrupt("kind", format!("unknown activity kind: {other}"))),
    }
}

async fn insert_confirmed_order_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    confirmed: &ConfirmedOrder,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        insert into confirmed_orders (
          id, origin_kind, origin_id, supplier_id, driver_id, vehicle_id, status,
          planned_pickup, planned_delivery, actual_pickup, actual_delivery,
          notes, created_at, updated_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(confirmed.id)
    .bind(confirmed.origin.kind_str())
    .bind(confirmed.origin.id())
    .bind(confirmed.supplier_id)
    .bind(confirmed.driver_id)
    .bind(confirmed.vehicle_id)
    .bind(confirmed.status.as_str())
    .bind(confirmed.planned_pickup)
    .bind(confirmed.planned_delivery)
    .bind(confirmed.actual_pickup)
    .bind(confirmed.actual_delivery)
    .bind(&confirmed.notes)
    .bind(confirmed.created_at)
    .bind(confirmed.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_supplier(&self, supplier: &Supplier) -> StorageResult<()> {
        self.guard(async {
            sqlx::query(
                "insert into suppliers (id, name, phone, created_at) values ($1, $2, $3, $4)",
            )
            .bind(supplier.id)
            .bind(&supplier.name)
            .bind(&supplier.phone)
            .bind(supplier.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn insert_buyer(&self, buyer: &Buyer) -> StorageResult<()> {
        self.guard(async {
            sqlx::query(
                "insert into buyers (id, name, phone, created_at) values ($1, $2, $3, $4)",
            )
            .bind(buyer.id)
            .bind(&buyer.name)
            .bind(&buyer.phone)
            .bind(buyer.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn insert_driver(&self, driver: &Driver) -> StorageResult<()> {
        self.guard(async {
            sqlx::query(
                r#"
                insert into drivers (id, supplier_id, name, licence_number, created_at)
                values ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(driver.id)
            .bind(driver.supplier_id)
            .bind(&driver.name)
            .bind(&driver.licence_number)
            .bind(driver.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn insert_vehicle(&self, vehicle: &Vehicle) -> StorageResult<()> {
        self.guard(async {
            sqlx::query(
                r#"
                insert into vehicles (id, supplier_id, registration_number, body_type, created_at)
                values ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(vehicle.id)
            .bind(vehicle.supplier_id)
            .bind(&vehicle.registration_number)
            .bind(&vehicle.body_type)
            .bind(vehicle.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn supplier(&self, id: Uuid) -> StorageResult<Option<Supplier>> {
        self.guard(async {
            sqlx::query_as::<_, Supplier>("select * from suppliers where id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }

    async fn buyer(&self, id: Uuid) -> StorageResult<Option<Buyer>> {
        self.guard(async {
            sqlx::query_as::<_, Buyer>("select * from buyers where id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }

    async fn driver(&self, id: Uuid) -> StorageResult<Option<Driver>> {
        self.guard(async {
            sqlx::query_as::<_, Driver>("select * from drivers where id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }

    async fn vehicle(&self, id: Uuid) -> StorageResult<Option<Vehicle>> {
        self.guard(async {
            sqlx::query_as::<_, Vehicle>("select * from vehicles where id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }

    async fn suppliers(&self) -> StorageResult<Vec<Supplier>> {
        self.guard(async {
            sqlx::query_as::<_, Supplier>("select * from suppliers order by created_at desc")
                .fetch_all(&self.pool)
                .await
        })
        .await
    }

    async fn buyers(&self) -> StorageResult<Vec<Buyer>> {
        self.guard(async {
            sqlx::query_as::<_, Buyer>("select * from buyers order by created_at desc")
                .fetch_all(&self.pool)
                .await
        })
        .await
    }

    async fn drivers(&self) -> StorageResult<Vec<Driver>> {
        self.guard(async {
            sqlx::query_as::<_, Driver>("select * from drivers order by created_at desc")
                .fetch_all(&self.pool)
                .await
        })
        .await
    }

    async fn vehicles(&self) -> StorageResult<Vec<Vehicle>> {
        self.guard(async {
            sqlx::query_as::<_, Vehicle>("select * from vehicles order by created_at desc")
                .fetch_all(&self.pool)
                .await
        })
        .await
    }

    async fn delete_driver(&self, id: Uuid) -> StorageResult<bool> {
        self.guard(async {
            let result = sqlx::query("delete from drivers where id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn delete_vehicle(&self, id: Uuid) -> StorageResult<bool> {
        self.guard(async {
            let result = sqlx::query("delete from vehicles where id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn insert_transport_order(&self, order: &TransportOrder) -> StorageResult<()> {
        self.guard(async {
            sqlx::query(
                r#"
                insert into transport_orders (
                  id, supplier_id, state, district, place, taluk, vehicle_number,
                  body_type, driver_id, status, admin_notes, created_at,
                  submitted_at, admin_action_at
                ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(order.id)
            .bind(order.supplier_id)
            .bind(&order.location.state)
            .bind(&order.location.district)
            .bind(&order.location.place)
            .bind(&order.location.taluk)
            .bind(&order.vehicle_number)
            .bind(&order.body_type)
            .bind(order.driver_id)
            .bind(order.status.as_str())
            .bind(&order.admin_notes)
            .bind(order.created_at)
            .bind(order.submitted_at)
            .bind(order.admin_action_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn transport_order(&self, id: Uuid) -> StorageResult<Option<TransportOrder>> {
        let row = self
            .guard(async {
                sqlx::query_as::<_, TransportOrderRow>(
                    "select * from transport_orders where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;
        row.map(TransportOrder::try_from).transpose()
    }

    async fn transport_orders(&self) -> StorageResult<Vec<TransportOrder>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, TransportOrderRow>(
                    "select * from transport_orders order by submitted_at desc",
                )
                .fetch_all(&self.pool)
                .await
            })
            .await?;
        rows.into_iter().map(TransportOrder::try_from).collect()
    }

    async fn delete_pending_transport_order(&self, id: Uuid) -> StorageResult<Guarded<()>> {
        let deleted = self
            .guard(async {
                let result = sqlx::query(
                    "delete from transport_orders where id = $1 and status = 'pending'",
                )
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok(result.rows_affected() > 0)
            })
            .await?;

        if deleted {
            return Ok(Guarded::Applied(()));
        }

        let current = self
            .guard(async {
                sqlx::query_as::<_, (String,)>(
                    "select status from transport_orders where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        Ok(match current {
            Some((status,)) => Guarded::StateMismatch { current: status },
            None => Guarded::NotFound,
        })
    }

    async fn decide_transport_order(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        notes: &str,
        confirmed: Option<&ConfirmedOrder>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<TransportOrder>> {
        let updated = self
            .guard(async {
                let mut tx = self.pool.begin().await?;
                let row = sqlx::query_as::<_, TransportOrderRow>(
                    r#"
                    update transport_orders
                    set status = $2, admin_notes = $3, admin_action_at = $4
                    where id = $1 and status = 'pending'
                    returning *
                    "#,
                )
                .bind(id)
                .bind(decision.as_str())
                .bind(notes)
                .bind(at)
                .fetch_optional(&mut *tx)
                .await?;

                match row {
                    Some(row) => {
                        if let Some(confirmed) = confirmed {
                            insert_confirmed_order_tx(&mut tx, confirmed).await?;
                        }
                        tx.commit().await?;
                        Ok(Some(row))
                    }
                    None => {
                        tx.rollback().await?;
                        Ok(None)
                    }
                }
            })
            .await?;

        if let Some(row) = updated {
            return Ok(Guarded::Applied(TransportOrder::try_from(row)?));
        }

        let current = self
            .guard(async {
                sqlx::query_as::<_, (String,)>(
                    "select status from transport_orders where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        Ok(match current {
            Some((status,)) => Guarded::StateMismatch { current: status },
            None => Guarded::NotFound,
        })
    }

    async fn insert_buyer_request(&self, request: &BuyerRequest) -> StorageResult<()> {
        self.guard(async {
            sqlx::query(
                r#"
                insert into buyer_requests (
                  id, buyer_id, order_number, load_description,
                  origin_state, origin_district, origin_place, origin_taluk,
                  dest_state, dest_district, dest_place, dest_taluk,
                  quantity_tonnes, required_by, status, admin_notes,
                  created_at, submitted_at, admin_action_at
                ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                          $13, $14, $15, $16, $17, $18, $19)
                "#,
            )
            .bind(request.id)
            .bind(request.buyer_id)
            .bind(&request.order_number)
            .bind(&request.load_description)
            .bind(&request.origin.state)
            .bind(&request.origin.district)
            .bind(&request.origin.place)
            .bind(&request.origin.taluk)
            .bind(&request.destination.state)
            .bind(&request.destination.district)
            .bind(&request.destination.place)
            .bind(&request.destination.taluk)
            .bind(request.quantity_tonnes)
            .bind(request.required_by)
            .bind(request.status.as_str())
            .bind(&request.admin_notes)
            .bind(request.created_at)
            .bind(request.submitted_at)
            .bind(request.admin_action_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn buyer_request(&self, id: Uuid) -> StorageResult<Option<BuyerRequest>> {
        let row = self
            .guard(async {
                sqlx::query_as::<_, BuyerRequestRow>(
                    "select * from buyer_requests where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;
        row.map(BuyerRequest::try_from).transpose()
    }

    async fn buyer_requests(&self) -> StorageResult<Vec<BuyerRequest>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, BuyerRequestRow>(
                    "select * from buyer_requests order by created_at desc",
                )
                .fetch_all(&self.pool)
                .await
            })
            .await?;
        rows.into_iter().map(BuyerRequest::try_from).collect()
    }

    async fn submit_buyer_request(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<BuyerRequest>> {
        let updated = self
            .guard(async {
                sqlx::query_as::<_, BuyerRequestRow>(
                    r#"
                    update buyer_requests
                    set status = 'pending', submitted_at = $2
                    where id = $1 and status = 'draft'
                    returning *
                    "#,
                )
                .bind(id)
                .bind(at)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        if let Some(row) = updated {
            return Ok(Guarded::Applied(BuyerRequest::try_from(row)?));
        }

        let current = self
            .guard(async {
                sqlx::query_as::<_, (String,)>(
                    "select status from buyer_requests where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        Ok(match current {
            Some((status,)) => Guarded::StateMismatch { current: status },
            None => Guarded::NotFound,
        })
    }

    async fn decide_buyer_request(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        notes: &str,
        confirmed: Option<&ConfirmedOrder>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<BuyerRequest>> {
        let updated = self
            .guard(async {
                let mut tx = self.pool.begin().await?;
                let row = sqlx::query_as::<_, BuyerRequestRow>(
                    r#"
                    update buyer_requests
                    set status = $2, admin_notes = $3, admin_action_at = $4
                    where id = $1 and status in ('pending', 'submitted')
                    returning *
                    "#,
                )
                .bind(id)
                .bind(decision.as_str())
                .bind(notes)
                .bind(at)
                .fetch_optional(&mut *tx)
                .await?;

                match row {
                    Some(row) => {
                        if let Some(confirmed) = confirmed {
                            insert_confirmed_order_tx(&mut tx, confirmed).await?;
                        }
                        tx.commit().await?;
                        Ok(Some(row))
                    }
                    None => {
                        tx.rollback().await?;
                        Ok(None)
                    }
                }
            })
            .await?;

        if let Some(row) = updated {
            return Ok(Guarded::Applied(BuyerRequest::try_from(row)?));
        }

        let current = self
            .guard(async {
                sqlx::query_as::<_, (String,)>(
                    "select status from buyer_requests where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        Ok(match current {
            Some((status,)) => Guarded::StateMismatch { current: status },
            None => Guarded::NotFound,
        })
    }

    async fn set_buyer_request_status(
        &self,
        id: Uuid,
        status: BuyerRequestStatus,
    ) -> StorageResult<()> {
        self.guard(async {
            sqlx::query("update buyer_requests set status = $2 where id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn confirmed_order(&self, id: Uuid) -> StorageResult<Option<ConfirmedOrder>> {
        let row = self
            .guard(async {
                sqlx::query_as::<_, ConfirmedOrderRow>(
                    "select * from confirmed_orders where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;
        row.map(ConfirmedOrder::try_from).transpose()
    }

    async fn confirmed_orders(&self) -> StorageResult<Vec<ConfirmedOrder>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, ConfirmedOrderRow>(
                    "select * from confirmed_orders order by created_at desc",
                )
                .fetch_all(&self.pool)
                .await
            })
            .await?;
        rows.into_iter().map(ConfirmedOrder::try_from).collect()
    }

    async fn confirmed_order_for_origin(
        &self,
        origin_id: Uuid,
    ) -> StorageResult<Option<ConfirmedOrder>> {
        let row = self
            .guard(async {
                sqlx::query_as::<_, ConfirmedOrderRow>(
                    "select * from confirmed_orders where origin_id = $1",
                )
                .bind(origin_id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;
        row.map(ConfirmedOrder::try_from).transpose()
    }

    async fn assign_confirmed_order(
        &self,
        id: Uuid,
        supplier_id: Option<Uuid>,
        driver_id: Option<Uuid>,
        vehicle_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<ConfirmedOrder>> {
        let updated = self
            .guard(async {
                sqlx::query_as::<_, ConfirmedOrderRow>(
                    r#"
                    update confirmed_orders
                    set supplier_id = coalesce($2, supplier_id),
                        driver_id = coalesce($3, driver_id),
                        vehicle_id = coalesce($4, vehicle_id),
                        updated_at = $5
                    where id = $1 and status in ('assigned', 'picked_up', 'in_transit')
                    returning *
                    "#,
                )
                .bind(id)
                .bind(supplier_id)
                .bind(driver_id)
                .bind(vehicle_id)
                .bind(at)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        if let Some(row) = updated {
            return Ok(Guarded::Applied(ConfirmedOrder::try_from(row)?));
        }

        let current = self
            .guard(async {
                sqlx::query_as::<_, (String,)>(
                    "select status from confirmed_orders where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        Ok(match current {
            Some((status,)) => Guarded::StateMismatch { current: status },
            None => Guarded::NotFound,
        })
    }

    async fn advance_confirmed_order(
        &self,
        id: Uuid,
        from: FulfillmentStatus,
        to: FulfillmentStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<ConfirmedOrder>> {
        let updated = self
            .guard(async {
                sqlx::query_as::<_, ConfirmedOrderRow>(
                    r#"
                    update confirmed_orders
                    set status = $3,
                        updated_at = $4,
                        actual_pickup = case when $3 = 'picked_up' then $4 else actual_pickup end,
                        actual_delivery = case when $3 = 'delivered' then $4 else actual_delivery end
                    where id = $1 and status = $2
                    returning *
                    "#,
                )
                .bind(id)
                .bind(from.as_str())
                .bind(to.as_str())
                .bind(at)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        if let Some(row) = updated {
            return Ok(Guarded::Applied(ConfirmedOrder::try_from(row)?));
        }

        let current = self
            .guard(async {
                sqlx::query_as::<_, (String,)>(
                    "select status from confirmed_orders where id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            })
            .await?;

        Ok(match current {
            Some((status,)) => Guarded::StateMismatch { current: status },
            None => Guarded::NotFound,
        })
    }

    async fn active_confirmed_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> StorageResult<Vec<ConfirmedOrder>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, ConfirmedOrderRow>(
                    r#"
                    select * from confirmed_orders
                    where driver_id = $1 and status in ('assigned', 'picked_up', 'in_transit')
                    "#,
                )
                .bind(driver_id)
                .fetch_all(&self.pool)
                .await
            })
            .await?;
        rows.into_iter().map(ConfirmedOrder::try_from).collect()
    }

    async fn active_confirmed_orders_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> StorageResult<Vec<ConfirmedOrder>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, ConfirmedOrderRow>(
                    r#"
                    select * from confirmed_orders
                    where vehicle_id = $1 and status in ('assigned', 'picked_up', 'in_transit')
                    "#,
                )
                .bind(vehicle_id)
                .fetch_all(&self.pool)
                .await
            })
            .await?;
        rows.into_iter().map(ConfirmedOrder::try_from).collect()
    }

    async fn pending_transport_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> StorageResult<Vec<TransportOrder>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, TransportOrderRow>(
                    "select * from transport_orders where driver_id = $1 and status = 'pending'",
                )
                .bind(driver_id)
                .fetch_all(&self.pool)
                .await
            })
            .await?;
        rows.into_iter().map(TransportOrder::try_from).collect()
    }

    async fn insert_notification(&self, notification: &Notification) -> StorageResult<bool> {
        self.guard(async {
            let result = sqlx::query(
                r#"
                insert into notifications (
                  id, audience, kind, priority, message, is_read, event_key,
                  order_id, driver_id, vehicle_id, created_at
                ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                on conflict (event_key) do nothing
                "#,
            )
            .bind(notification.id)
            .bind(notification.audience.to_string())
            .bind(notification.kind.as_str())
            .bind(notification.priority.as_str())
            .bind(&notification.message)
            .bind(notification.is_read)
            .bind(&notification.event_key)
            .bind(notification.order_id)
            .bind(notification.driver_id)
            .bind(notification.vehicle_id)
            .bind(notification.created_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn notifications(&self, audience: &Audience) -> StorageResult<Vec<Notification>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, NotificationRow>(
                    r#"
                    select * from notifications
                    where audience = $1
                    order by created_at desc, id desc
                    "#,
                )
                .bind(audience.to_string())
                .fetch_all(&self.pool)
                .await
            })
            .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn mark_notification_read(&self, id: Uuid) -> StorageResult<bool> {
        self.guard(async {
            let result = sqlx::query("update notifications set is_read = true where id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn mark_all_read(&self, audience: &Audience) -> StorageResult<u64> {
        self.guard(async {
            let result = sqlx::query(
                "update notifications set is_read = true where audience = $1 and is_read = false",
            )
            .bind(audience.to_string())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn clear_notifications(&self, audience: &Audience) -> StorageResult<u64> {
        self.guard(async {
            let result = sqlx::query("delete from notifications where audience = $1")
                .bind(audience.to_string())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn unread_count(&self, audience: &Audience) -> StorageResult<u64> {
        self.guard(async {
            let (count,): (i64,) = sqlx::query_as::<_, (i64,)>(
                "select count(*) from notifications where audience = $1 and is_read = false",
            )
            .bind(audience.to_string())
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        })
        .await
    }

    async fn entity_counts(&self) -> StorageResult<EntityCounts> {
        self.guard(async {
            let row: (i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
                r#"
                select
                  (select count(*) from suppliers),
                  (select count(*) from buyers),
                  (select count(*) from drivers),
                  (select count(*) from vehicles),
                  (select count(*) from transport_orders),
                  (select count(*) from buyer_requests),
                  (select count(*) from confirmed_orders)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(EntityCounts {
                suppliers: row.0 as u64,
                buyers: row.1 as u64,
                drivers: row.2 as u64,
                vehicles: row.3 as u64,
                transport_orders: row.4 as u64,
                buyer_requests: row.5 as u64,
                confirmed_orders: row.6 as u64,
            })
        })
        .await
    }

    async fn window_stats(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<WindowStats> {
        self.guard(async {
            let orders: (i64, i64, i64) = sqlx::query_as(
                r#"
                select count(*),
                       count(*) filter (where status = 'confirmed'),
                       count(*) filter (where status = 'rejected')
                from transport_orders
                where submitted_at >= $1 and submitted_at < $2
                "#,
            )
            .bind(from)
            .bind(until)
            .fetch_one(&self.pool)
            .await?;

            let requests: (i64, i64, i64) = sqlx::query_as(
                r#"
                select count(*),
                       count(*) filter (where status in
                         ('confirmed', 'assigned', 'picked_up', 'in_transit', 'delivered')),
                       count(*) filter (where status = 'rejected')
                from buyer_requests
                where submitted_at is not null
                  and submitted_at >= $1 and submitted_at < $2
                "#,
            )
            .bind(from)
            .bind(until)
            .fetch_one(&self.pool)
            .await?;

            let shipments: (i64, i64) = sqlx::query_as(
                r#"
                select count(*) filter (where c.status = 'delivered'),
                       count(*) filter (where c.status = 'cancelled')
                from confirmed_orders c
                left join transport_orders t
                  on c.origin_kind = 'transport_order' and t.id = c.origin_id
                left join buyer_requests r
                  on c.origin_kind = 'buyer_request' and r.id = c.origin_id
                where coalesce(t.submitted_at, r.submitted_at) >= $1
                  and coalesce(t.submitted_at, r.submitted_at) < $2
                "#,
            )
            .bind(from)
            .bind(until)
            .fetch_one(&self.pool)
            .await?;

            Ok(WindowStats {
                total: (orders.0 + requests.0) as u64,
                confirmed: (orders.1 + requests.1) as u64,
                rejected: (orders.2 + requests.2) as u64,
                delivered: shipments.0 as u64,
                cancelled: shipments.1 as u64,
            })
        })
        .await
    }

    async fn fulfillment_counts(&self) -> StorageResult<FulfillmentCounts> {
        self.guard(async {
            let row: (i64, i64, i64, i64) = sqlx::query_as(
                r#"
                select
                  (select count(*) from transport_orders where status = 'pending')
                    + (select count(*) from buyer_requests
                       where status in ('pending', 'submitted')),
                  (select count(*) from confirmed_orders
                   where status in ('assigned', 'picked_up', 'in_transit')),
                  (select count(*) from confirmed_orders
                   where status in ('assigned', 'picked_up', 'in_transit')
                     and driver_id is null),
                  (select count(*) from confirmed_orders where status = 'delivered')
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(FulfillmentCounts {
                pending_review: row.0 as u64,
                active_shipments: row.1 as u64,
                awaiting_driver: row.2 as u64,
                delivered_total: row.3 as u64,
            })
        })
        .await
    }

    async fn recent_activity(&self, limit: usize) -> StorageResult<Vec<ActivityRecord>> {
        let rows = self
            .guard(async {
                sqlx::query_as::<_, (String, String, DateTime<Utc>)>(
                    r#"
                    select kind, subject, at from (
                      select 'order_submitted' as kind, vehicle_number as subject,
                             submitted_at as at
                      from transport_orders
                      union all
                      select case when status = 'confirmed' then 'order_confirmed'
                                  else 'order_rejected' end,
                             vehicle_number, admin_action_at
                      from transport_orders
                      where admin_action_at is not null and status <> 'pending'
                      union all
                      select 'request_submitted', order_number, submitted_at
                      from buyer_requests
                      where submitted_at is not null
                      union all
                      select case when status = 'rejected' then 'order_rejected'
                                  else 'order_confirmed' end,
                             order_number, admin_action_at
                      from buyer_requests
                      where admin_action_at is not null
                      union all
                      select 'shipment_delivered', id::text, actual_delivery
                      from confirmed_orders
                      where actual_delivery is not null
                      union all
                      select 'shipment_cancelled', id::text, updated_at
                      from confirmed_orders
                      where status = 'cancelled'
                    ) activity
                    order by at desc
                    limit $1
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            })
            .await?;

        rows.into_iter()
            .map(|(kind, subject, at)| {
                Ok(ActivityRecord {
                    kind: parse_activity_kind(&kind)?,
                    subject,
                    at,
                })
            })
            .collect()
    }
}
