use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use crate::engine::transition::TransitionEngine;
use crate::error::{AppError, BlockingRecord};
use crate::storage::with_retry;

impl TransitionEngine {
    /// Deletes a driver unless a non-terminal shipment or a pending order
    /// still references them. Conflicts list every blocking record and are
    /// never retried; transient storage errors are.
    pub async fn delete_driver(&self, id: Uuid) -> Result<(), AppError> {
        let start = Instant::now();

        let driver = self
            .store
            .driver(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        let mut blocking: Vec<BlockingRecord> = Vec::new();

        let shipments = self
            .retried(|| self.store.active_confirmed_orders_for_driver(id))
            .await?;
        for shipment in shipments {
            blocking.push(BlockingRecord {
                id: shipment.id,
                summary: format!("shipment {} ({})", shipment.id, shipment.status),
            });
        }

        let orders = self
            .retried(|| self.store.pending_transport_orders_for_driver(id))
            .await?;
        for order in orders {
            blocking.push(BlockingRecord {
                id: order.id,
                summary: format!("pending order for vehicle {}", order.vehicle_number),
            });
        }

        if !blocking.is_empty() {
            self.observe("delete_driver", "conflict", start);
            return Err(AppError::Conflict(blocking));
        }

        let deleted = self.retried(|| self.store.delete_driver(id)).await?;
        if !deleted {
            self.observe("delete_driver", "not_found", start);
            return Err(AppError::NotFound(format!("driver {id} not found")));
        }

        info!(driver_id = %id, name = %driver.name, "driver deleted");
        self.observe("delete_driver", "success", start);
        Ok(())
    }

    /// Same contract as [`Self::delete_driver`], keyed on shipment
    /// vehicle references.
    pub async fn delete_vehicle(&self, id: Uuid) -> Result<(), AppError> {
        let start = Instant::now();

        let vehicle = self
            .store
            .vehicle(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))?;

        let shipments = self
            .retried(|| self.store.active_confirmed_orders_for_vehicle(id))
            .await?;
        let blocking: Vec<BlockingRecord> = shipments
            .into_iter()
            .map(|shipment| BlockingRecord {
                id: shipment.id,
                summary: format!("shipment {} ({})", shipment.id, shipment.status),
            })
            .collect();

        if !blocking.is_empty() {
            self.observe("delete_vehicle", "conflict", start);
            return Err(AppError::Conflict(blocking));
        }

        let deleted = self.retried(|| self.store.delete_vehicle(id)).await?;
        if !deleted {
            self.observe("delete_vehicle", "not_found", start);
            return Err(AppError::NotFound(format!("vehicle {id} not found")));
        }

        info!(vehicle_id = %id, registration = %vehicle.registration_number, "vehicle deleted");
        self.observe("delete_vehicle", "success", start);
        Ok(())
    }

    async fn retried<T, F, Fut>(&self, op: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = crate::storage::StorageResult<T>>,
    {
        let metrics = self.metrics.clone();
        with_retry(self.retry.attempts, self.retry.base_delay, op, move |_| {
            metrics.storage_retries_total.inc();
        })
        .await
        .map_err(AppError::from)
    }
}
