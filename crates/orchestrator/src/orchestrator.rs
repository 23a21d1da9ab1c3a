//! Stock and delete orchestration.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CallerContext, ItemId};
use event_bus::ChangeEvent;
use ledger::{InventoryLedger, InventoryLedgerExt, InventoryRecord, LedgerError, WriteOptions};
use tokio::sync::Notify;

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::services::catalog::CatalogClient;
use crate::services::identity::{IdentityAuthority, TokenValidation, User, UserLookup};
use crate::services::{ServiceError, call_with_deadline};

/// Coordinates identity checks, catalog calls and ledger writes for inventory changes.
///
/// Every ledger mutation commits its change event to the outbox in the same
/// transaction. The synchronous catalog call is a fast path; the outbox is
/// what guarantees the catalog eventually matches the ledger.
pub struct InventoryOrchestrator<A, C, L>
where
    A: IdentityAuthority,
    C: CatalogClient,
    L: InventoryLedger,
{
    identity: A,
    catalog: C,
    ledger: L,
    config: OrchestratorConfig,
    outbox_signal: Arc<Notify>,
}

impl<A, C, L> InventoryOrchestrator<A, C, L>
where
    A: IdentityAuthority,
    C: CatalogClient,
    L: InventoryLedger,
{
    /// Creates a new orchestrator.
    pub fn new(identity: A, catalog: C, ledger: L, config: OrchestratorConfig) -> Self {
        Self {
            identity,
            catalog,
            ledger,
            config,
            outbox_signal: Arc::new(Notify::new()),
        }
    }

    /// Shares `signal` with an outbox dispatcher so committed changes are published promptly.
    pub fn with_outbox_signal(mut self, signal: Arc<Notify>) -> Self {
        self.outbox_signal = signal;
        self
    }

    pub fn outbox_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.outbox_signal)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validates a bearer token and builds the caller context for one request.
    ///
    /// Any failure to get a definite answer from the identity authority is a denial.
    #[tracing::instrument(skip(self, token))]
    pub async fn authenticate(&self, token: &str, request_timeout: Duration) -> Result<CallerContext> {
        let deadline = Instant::now() + self.config.rpc_timeout.min(request_timeout);
        let validation =
            call_with_deadline("identity", deadline, self.identity.validate_token(token)).await;

        match validation {
            Ok(TokenValidation::Valid(claims)) => {
                Ok(CallerContext::new(claims.user_id, request_timeout))
            }
            Ok(TokenValidation::Invalid { reason }) => {
                tracing::debug!(%reason, "token rejected");
                Err(OrchestratorError::Unauthorized(reason))
            }
            Err(e) => {
                tracing::warn!(error = %e, "token validation failed");
                Err(OrchestratorError::Unauthorized(format!(
                    "token validation failed: {e}"
                )))
            }
        }
    }

    /// Sets the stock of an item on both the ledger and the catalog.
    ///
    /// The ledger record is created on the first update. If the final catalog
    /// call fails the ledger write stands and `Upstream` is returned; the
    /// committed outbox event still brings the catalog in line. If the catalog
    /// says the item is gone, the record is tombstoned and `NotFound` returned.
    /// After a successful catalog call the ledger is checked again, and its
    /// current stock is re-announced if a concurrent update overtook this one.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), request_id = %ctx.request_id()))]
    pub async fn update_stock(
        &self,
        ctx: &CallerContext,
        item_id: &ItemId,
        new_stock: i64,
    ) -> Result<InventoryRecord> {
        let started = Instant::now();
        let result = self.run_update_stock(ctx, item_id, new_stock).await;
        observe("update_stock", started, &result);
        result
    }

    /// Deletes an item from the catalog, then tombstones its ledger record.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), request_id = %ctx.request_id()))]
    pub async fn delete_item(&self, ctx: &CallerContext, item_id: &ItemId) -> Result<()> {
        let started = Instant::now();
        let result = self.run_delete_item(ctx, item_id).await;
        observe("delete_item", started, &result);
        result
    }

    /// Returns the live ledger record of an item.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), request_id = %ctx.request_id()))]
    pub async fn get_stock(&self, ctx: &CallerContext, item_id: &ItemId) -> Result<InventoryRecord> {
        let started = Instant::now();
        let result: Result<InventoryRecord> = async {
            validate_item_id(item_id)?;
            self.authorize(ctx).await?;
            self.ledger
                .get(item_id)
                .await?
                .ok_or_else(|| OrchestratorError::NotFound(item_id.clone()))
        }
        .await;
        observe("get_stock", started, &result);
        result
    }

    /// Returns every live ledger record, ordered by item ID.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), request_id = %ctx.request_id()))]
    pub async fn list_inventory(&self, ctx: &CallerContext) -> Result<Vec<InventoryRecord>> {
        let started = Instant::now();
        let result: Result<Vec<InventoryRecord>> = async {
            self.authorize(ctx).await?;
            Ok::<_, OrchestratorError>(self.ledger.list().await?)
        }
        .await;
        observe("list_inventory", started, &result);
        result
    }

    async fn run_update_stock(
        &self,
        ctx: &CallerContext,
        item_id: &ItemId,
        new_stock: i64,
    ) -> Result<InventoryRecord> {
        validate_item_id(item_id)?;
        let new_stock = validate_stock(new_stock)?;

        self.authorize(ctx).await?;

        match self
            .rpc(ctx, "catalog", self.catalog.get_item(ctx, item_id))
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => return Err(OrchestratorError::NotFound(item_id.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "catalog lookup failed");
                return Err(OrchestratorError::NotFound(item_id.clone()));
            }
        }

        let event = ChangeEvent::stock_update(item_id.clone(), new_stock, ctx.user_id());
        let record = self
            .write_stock(ctx, item_id, new_stock, WriteOptions::with_event(event))
            .await?;
        self.outbox_signal.notify_one();

        match self
            .rpc(
                ctx,
                "catalog",
                self.catalog.update_stock(ctx, item_id, new_stock),
            )
            .await
        {
            Ok(_) => {}
            Err(ServiceError::NotFound { .. }) => {
                self.retire_orphan(ctx, item_id).await?;
                return Err(OrchestratorError::NotFound(item_id.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog stock update failed, outbox will reconcile");
                return Err(OrchestratorError::Upstream {
                    operation: "update_stock",
                    reason: e.to_string(),
                });
            }
        }

        // The direct write may have landed after newer events were applied
        if let Some(stock) = self
            .ledger
            .reconcile_stock(item_id, new_stock)
            .await
            .map_err(ledger_error)?
        {
            metrics::counter!("inventory_stock_reconciliations_total").increment(1);
            tracing::info!(%item_id, new_stock, stock, "ledger moved on, stock re-announced");
            self.outbox_signal.notify_one();
        }

        metrics::counter!("inventory_stock_updates_total").increment(1);
        tracing::info!(%item_id, new_stock, "stock updated");
        Ok(record)
    }

    async fn run_delete_item(&self, ctx: &CallerContext, item_id: &ItemId) -> Result<()> {
        validate_item_id(item_id)?;
        self.authorize(ctx).await?;

        if !self.ledger.exists(item_id).await? {
            return Err(OrchestratorError::NotFound(item_id.clone()));
        }

        match self
            .rpc(ctx, "catalog", self.catalog.delete_item(ctx, item_id))
            .await
        {
            Ok(outcome) => tracing::debug!(?outcome, "catalog delete answered"),
            Err(e) => {
                tracing::warn!(error = %e, "catalog delete failed, ledger left intact");
                return Err(OrchestratorError::Upstream {
                    operation: "delete_item",
                    reason: e.to_string(),
                });
            }
        }

        let event = ChangeEvent::item_delete(item_id.clone(), ctx.user_id());
        self.ledger
            .delete(item_id, WriteOptions::with_event(event))
            .await
            .map_err(ledger_error)?;
        self.outbox_signal.notify_one();

        metrics::counter!("inventory_item_deletes_total").increment(1);
        tracing::info!(%item_id, "item deleted");
        Ok(())
    }

    /// Confirms the caller is a known, active user.
    async fn authorize(&self, ctx: &CallerContext) -> Result<User> {
        let user_id = ctx.user_id();
        match self
            .rpc(ctx, "identity", self.identity.get_user(user_id))
            .await
        {
            Ok(UserLookup::Found(user)) if user.is_active => Ok(user),
            Ok(UserLookup::Found(_)) => Err(OrchestratorError::Unauthorized(format!(
                "user {user_id} is inactive"
            ))),
            Ok(UserLookup::NotFound) => Err(OrchestratorError::Unauthorized(format!(
                "unknown user {user_id}"
            ))),
            Err(e) => {
                tracing::warn!(error = %e, "identity check failed");
                Err(OrchestratorError::Unauthorized(format!(
                    "identity check failed: {e}"
                )))
            }
        }
    }

    /// Tombstones the record of an item the catalog no longer has.
    ///
    /// Covers a delete that completed between the catalog lookup and the
    /// ledger write of a stock update.
    async fn retire_orphan(&self, ctx: &CallerContext, item_id: &ItemId) -> Result<()> {
        let event = ChangeEvent::item_delete(item_id.clone(), ctx.user_id());
        match self
            .ledger
            .delete(item_id, WriteOptions::with_event(event))
            .await
        {
            Ok(()) => {
                tracing::warn!(%item_id, "item vanished from catalog, ledger record retired");
                self.outbox_signal.notify_one();
                Ok(())
            }
            Err(LedgerError::RecordNotFound(_)) => Ok(()),
            Err(e) => Err(OrchestratorError::Ledger(e)),
        }
    }

    /// Creates or overwrites the ledger record together with its outbox event.
    async fn write_stock(
        &self,
        ctx: &CallerContext,
        item_id: &ItemId,
        new_stock: i32,
        options: WriteOptions,
    ) -> Result<InventoryRecord> {
        if !self.ledger.exists(item_id).await? {
            let record = InventoryRecord::new(item_id.clone(), new_stock, ctx.user_id());
            match self.ledger.create(record, options.clone()).await {
                Ok(record) => return Ok(record),
                // A concurrent first write won; overwrite its record instead
                Err(LedgerError::DuplicateRecord(_)) => {}
                Err(e) => return Err(ledger_error(e)),
            }
        }

        let mut record = self.ledger.get_required(item_id).await.map_err(ledger_error)?;
        record.set_stock(new_stock, ctx.user_id());
        self.ledger.update(record, options).await.map_err(ledger_error)
    }

    async fn rpc<T, F>(
        &self,
        ctx: &CallerContext,
        service: &'static str,
        call: F,
    ) -> std::result::Result<T, ServiceError>
    where
        F: Future<Output = std::result::Result<T, ServiceError>>,
    {
        call_with_deadline(service, ctx.call_deadline(self.config.rpc_timeout), call).await
    }
}

fn validate_item_id(item_id: &ItemId) -> Result<()> {
    if item_id.is_blank() {
        return Err(OrchestratorError::Validation(
            "item_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_stock(new_stock: i64) -> Result<i32> {
    i32::try_from(new_stock)
        .ok()
        .filter(|stock| *stock >= 0)
        .ok_or_else(|| {
            OrchestratorError::Validation(format!(
                "new_stock must be between 0 and {}, got {new_stock}",
                i32::MAX
            ))
        })
}

fn ledger_error(error: LedgerError) -> OrchestratorError {
    match error {
        LedgerError::RecordNotFound(item_id) => OrchestratorError::NotFound(item_id),
        other => OrchestratorError::Ledger(other),
    }
}

fn observe<T>(operation: &'static str, started: Instant, result: &Result<T>) {
    metrics::histogram!("inventory_orchestration_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        metrics::counter!(
            "inventory_orchestration_failures_total",
            "operation" => operation,
            "reason" => e.reason()
        )
        .increment(1);
        tracing::info!(operation, reason = e.reason(), error = %e, "orchestration failed");
    }
}
