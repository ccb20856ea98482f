use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::VenueError;
use crate::events::{Event, EventFilter};
use crate::models::{
    AmendRequest, Bar, CancelRequest, Instrument, Interval, OrderAck, OrderRequest, VenueName,
};
use crate::service::{CoreCtx, ServiceCtx};

/// A unit of the middleware managed by the engine: optional event
/// subscription, optional long-running tasks, setup/teardown hooks.
#[async_trait]
pub trait Runnable: Send + Sync {
    fn event_filter(&self) -> EventFilter {
        EventFilter::None
    }

    async fn handle_event(&self, _ctx: Arc<CoreCtx>, _event: Event) {}

    async fn setup(&self, _service_ctx: Arc<ServiceCtx>, _core_ctx: Arc<CoreCtx>) {}

    async fn get_tasks(
        self: Arc<Self>,
        _service_ctx: Arc<ServiceCtx>,
        _core_ctx: Arc<CoreCtx>,
    ) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
        vec![]
    }

    async fn teardown(&self, _service_ctx: Arc<ServiceCtx>, _core_ctx: Arc<CoreCtx>) {}
}

/// The capability set a venue connector exposes to the gateway and the
/// repair pass. Two implementations exist, one per venue; everything else
/// speaks only this trait.
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn venue(&self) -> VenueName;

    async fn list_instruments(&self) -> Result<Vec<Instrument>, VenueError>;

    /// Closed bars in `[start_ms, end_ms]`, returned ascending. One REST
    /// page at most; callers page through longer ranges themselves.
    async fn fetch_history(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Bar>, VenueError>;

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, VenueError>;

    async fn place_batch_orders(&self, reqs: &[OrderRequest]) -> Result<Vec<OrderAck>, VenueError>;

    async fn cancel_order(&self, req: &CancelRequest) -> Result<OrderAck, VenueError>;

    async fn cancel_batch_orders(&self, reqs: &[CancelRequest]) -> Result<Vec<OrderAck>, VenueError>;

    async fn amend_order(&self, req: &AmendRequest) -> Result<OrderAck, VenueError>;

    async fn query_balance(&self) -> Result<serde_json::Value, VenueError>;

    async fn query_positions(&self, symbol: Option<&str>) -> Result<serde_json::Value, VenueError>;

    async fn query_open_orders(&self, symbol: Option<&str>) -> Result<serde_json::Value, VenueError>;

    async fn query_order(
        &self,
        symbol: &str,
        exchange_order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<serde_json::Value, VenueError>;
}
