//! Request handlers for protocol methods.
//!
//! Each handler implements one method from the Availability Protocol.
//! Store calls block on sled and the store's write locks, so they run on
//! the blocking pool through [`blocking`].

use crate::protocol::{
    HistoryParams, ProfessionalParams, RecentParams, RegisterParams, Response, SlotAddParams,
    SlotRemoveParams, SlotUpdateParams, StatusSetParams, SubscriptionParams, INTERNAL_ERROR,
};
use crate::registry::{ConnectionId, ConnectionRegistry};
use avail_core::{AvailabilitySlot, Professional, ProfessionalId, DEFAULT_REASON};
use avail_store::{AvailabilityStore, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// State shared by every connection.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AvailabilityStore>,
    pub registry: ConnectionRegistry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<AvailabilityStore>) -> Self {
        Self {
            store,
            registry: ConnectionRegistry::new(),
            started_at: Instant::now(),
        }
    }
}

/// Runs a store operation on the blocking pool. Store errors become their
/// protocol error response; a failed task becomes an internal error.
async fn blocking<T, F>(state: &AppState, id: &Option<Value>, op: F) -> Result<T, Response>
where
    F: FnOnce(&AvailabilityStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || op(&store)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            debug!("Store rejected request: {}", e);
            Err(Response::store_error(id.clone(), &e))
        }
        Err(e) => {
            warn!("Store task failed: {}", e);
            Err(Response::error(id.clone(), INTERNAL_ERROR, e.to_string()))
        }
    }
}

/// Handles the server.info method.
pub async fn handle_info(state: &AppState, id: Option<Value>) -> Response {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct InfoResult {
        version: &'static str,
        uptime_secs: u64,
        connections: usize,
        subscriptions: usize,
        last_sequence: u64,
        professionals: usize,
        events: usize,
        slots: usize,
    }

    let stats = match blocking(state, &id, |store| Ok(store.stats())).await {
        Ok(stats) => stats,
        Err(response) => return response,
    };
    Response::success(
        id,
        InfoResult {
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: state.started_at.elapsed().as_secs(),
            connections: state.registry.connection_count().await,
            subscriptions: state.registry.subscription_count().await,
            last_sequence: state.store.last_sequence(),
            professionals: stats.professionals,
            events: stats.events,
            slots: stats.slots,
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Professionals
// ─────────────────────────────────────────────────────────────────────────────

/// Handles the professional.register method.
pub async fn handle_register(
    state: &AppState,
    id: Option<Value>,
    params: RegisterParams,
) -> Response {
    let professional_id = params.id.unwrap_or_else(ProfessionalId::generate);
    let mut professional = Professional::new(professional_id, params.name, params.profession);
    if let Some(status) = params.status {
        professional = professional.with_status(status);
    }

    match blocking(state, &id, move |store| store.register(professional)).await {
        Ok(registered) => {
            info!("Registered professional {}", registered.id);
            Response::success(id, registered)
        }
        Err(response) => response,
    }
}

/// Handles the professional.get and status.get methods.
pub async fn handle_professional_get(
    state: &AppState,
    id: Option<Value>,
    params: ProfessionalParams,
) -> Response {
    match blocking(state, &id, move |store| {
        store.professional(&params.professional_id)
    })
    .await
    {
        Ok(professional) => Response::success(id, professional),
        Err(response) => response,
    }
}

/// Handles the professional.list method.
pub async fn handle_professional_list(state: &AppState, id: Option<Value>) -> Response {
    match blocking(state, &id, |store| store.professionals()).await {
        Ok(professionals) => {
            Response::success(id, serde_json::json!({ "professionals": professionals }))
        }
        Err(response) => response,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Handles the status.set method.
pub async fn handle_status_set(
    state: &AppState,
    id: Option<Value>,
    params: StatusSetParams,
) -> Response {
    let reason = params
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REASON.to_string());

    match blocking(state, &id, move |store| {
        store.set_status(&params.professional_id, params.status, &reason)
    })
    .await
    {
        Ok(event) => Response::success(id, event),
        Err(response) => response,
    }
}

/// Handles the status.history method.
pub async fn handle_history(
    state: &AppState,
    id: Option<Value>,
    params: HistoryParams,
) -> Response {
    match blocking(state, &id, move |store| {
        store.history(&params.professional_id, params.limit)
    })
    .await
    {
        Ok(events) => Response::success(id, serde_json::json!({ "events": events })),
        Err(response) => response,
    }
}

/// Handles the status.recent method: the latest changes across every
/// professional, oldest first.
pub async fn handle_recent(state: &AppState, id: Option<Value>, params: RecentParams) -> Response {
    match blocking(state, &id, move |store| store.recent_events(params.limit)).await {
        Ok(events) => Response::success(id, serde_json::json!({ "events": events })),
        Err(response) => response,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriptions
// ─────────────────────────────────────────────────────────────────────────────

/// Handles the subscribe method.
///
/// Every id must name a registered professional, otherwise nothing is
/// subscribed. Events committed before this call are never delivered on
/// the new subscriptions.
pub async fn handle_subscribe(
    state: &AppState,
    connection: ConnectionId,
    id: Option<Value>,
    params: SubscriptionParams,
) -> Response {
    let wanted = params.professional_ids.clone();
    let checked = blocking(state, &id, move |store| {
        for professional in wanted {
            if !store.contains(&professional)? {
                return Err(StoreError::NotFound(professional));
            }
        }
        Ok(())
    })
    .await;
    if let Err(response) = checked {
        return response;
    }

    let after = state.store.last_sequence();
    for professional in &params.professional_ids {
        if let Err(e) = state
            .registry
            .subscribe_after(connection, professional, after)
            .await
        {
            return Response::error(id, INTERNAL_ERROR, e.to_string());
        }
    }

    let mut subscriptions: Vec<_> = state
        .registry
        .subscriptions_of(connection)
        .await
        .into_iter()
        .collect();
    subscriptions.sort();

    Response::success(
        id,
        serde_json::json!({
            "subscriptions": subscriptions,
            "afterSequence": after
        }),
    )
}

/// Handles the unsubscribe method.
pub async fn handle_unsubscribe(
    state: &AppState,
    connection: ConnectionId,
    id: Option<Value>,
    params: SubscriptionParams,
) -> Response {
    let mut removed = 0usize;
    for professional in &params.professional_ids {
        match state.registry.unsubscribe(connection, professional).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => return Response::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    let mut subscriptions: Vec<_> = state
        .registry
        .subscriptions_of(connection)
        .await
        .into_iter()
        .collect();
    subscriptions.sort();

    Response::success(
        id,
        serde_json::json!({
            "removed": removed,
            "subscriptions": subscriptions
        }),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Schedule
// ─────────────────────────────────────────────────────────────────────────────

/// Handles the schedule.add method.
pub async fn handle_slot_add(
    state: &AppState,
    id: Option<Value>,
    params: SlotAddParams,
) -> Response {
    let slot = AvailabilitySlot::new(
        params.professional_id,
        params.start,
        params.end,
        params.status,
    );
    match blocking(state, &id, move |store| store.add_slot(slot)).await {
        Ok(slot) => Response::success(id, slot),
        Err(response) => response,
    }
}

/// Handles the schedule.update method.
pub async fn handle_slot_update(
    state: &AppState,
    id: Option<Value>,
    params: SlotUpdateParams,
) -> Response {
    let slot = AvailabilitySlot {
        id: params.slot_id,
        professional_id: params.professional_id,
        start: params.start,
        end: params.end,
        status: params.status,
    };
    match blocking(state, &id, move |store| store.update_slot(slot)).await {
        Ok(slot) => Response::success(id, slot),
        Err(response) => response,
    }
}

/// Handles the schedule.remove method.
pub async fn handle_slot_remove(
    state: &AppState,
    id: Option<Value>,
    params: SlotRemoveParams,
) -> Response {
    match blocking(state, &id, move |store| {
        store.remove_slot(&params.professional_id, &params.slot_id)
    })
    .await
    {
        Ok(slot) => Response::success(id, slot),
        Err(response) => response,
    }
}

/// Handles the schedule.list method.
pub async fn handle_slot_list(
    state: &AppState,
    id: Option<Value>,
    params: ProfessionalParams,
) -> Response {
    match blocking(state, &id, move |store| store.slots_for(&params.professional_id)).await {
        Ok(slots) => Response::success(id, serde_json::json!({ "slots": slots })),
        Err(response) => response,
    }
}
