use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use millbook_auth::Hs256TokenIssuer;
use millbook_core::{Aggregate, AggregateId, DomainError, KmsYear, MillId, UserId};
use millbook_events::{EventBus, EventEnvelope, InMemoryEventBus};
use millbook_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, PostgresEventStore, StoredEvent},
    projections::{
        ArrivalRegisterEntry, ArrivalsProjection, DailyStockProjection, DriverRosterEntry,
        DriverRosterProjection, GodownRegisterEntry, GodownRegisterProjection,
        MandiDirectoryEntry, MandiDirectoryProjection, StockRegister, UserRecord,
        UsersProjection, VehicleRegistryEntry, VehicleRegistryProjection, arrivals, daily_stock,
        driver_roster, godown_register, mandi_directory, users, vehicle_registry,
    },
    read_model::InMemoryMillStore,
};
use millbook_procurement::ArrivalId;
use millbook_registry::{DriverId, GodownId, MandiId, VehicleId};

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub mill_id: MillId,
    pub topic: String,
    pub payload: serde_json::Value,
}

type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;

type InMemoryDispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<Bus>>;
type PostgresDispatcher = CommandDispatcher<Arc<PostgresEventStore>, Arc<Bus>>;

type MandiStore = Arc<InMemoryMillStore<MandiId, MandiDirectoryEntry>>;
type DriverStore = Arc<InMemoryMillStore<DriverId, DriverRosterEntry>>;
type VehicleStore = Arc<InMemoryMillStore<VehicleId, VehicleRegistryEntry>>;
type GodownStore = Arc<InMemoryMillStore<GodownId, GodownRegisterEntry>>;
type ArrivalStore = Arc<InMemoryMillStore<ArrivalId, ArrivalRegisterEntry>>;
type StockStore = Arc<InMemoryMillStore<KmsYear, StockRegister>>;
type UserStore = Arc<InMemoryMillStore<UserId, UserRecord>>;

/// Which event store backs the dispatcher.
///
/// Projections are in-memory either way; with the Postgres store they are
/// repopulated from published events as the process runs.
enum Backend {
    InMemory(Arc<InMemoryDispatcher>),
    Postgres(Arc<PostgresDispatcher>),
}

/// Everything a request handler needs, wired once at boot.
pub struct AppServices {
    backend: Backend,
    mandis: Arc<MandiDirectoryProjection<MandiStore>>,
    drivers: Arc<DriverRosterProjection<DriverStore>>,
    vehicles: Arc<VehicleRegistryProjection<VehicleStore>>,
    godowns: Arc<GodownRegisterProjection<GodownStore>>,
    arrivals: Arc<ArrivalsProjection<ArrivalStore>>,
    stock: Arc<DailyStockProjection<StockStore>>,
    users: Arc<UsersProjection<UserStore>>,
    token_issuer: Hs256TokenIssuer,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

pub async fn build_services(jwt_secret: &str) -> AppServices {
    let bus: Arc<Bus> = Arc::new(InMemoryEventBus::new());

    let mandis = Arc::new(MandiDirectoryProjection::new(Arc::new(InMemoryMillStore::new())));
    let drivers = Arc::new(DriverRosterProjection::new(Arc::new(InMemoryMillStore::new())));
    let vehicles = Arc::new(VehicleRegistryProjection::new(Arc::new(InMemoryMillStore::new())));
    let godowns = Arc::new(GodownRegisterProjection::new(Arc::new(InMemoryMillStore::new())));
    let arrivals = Arc::new(ArrivalsProjection::new(Arc::new(InMemoryMillStore::new())));
    let stock = Arc::new(DailyStockProjection::new(Arc::new(InMemoryMillStore::new())));
    let users = Arc::new(UsersProjection::new(Arc::new(InMemoryMillStore::new())));

    // Realtime channel (SSE): lossy broadcast, mill-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> projections.
    {
        let sub = bus.subscribe();
        let mandis = mandis.clone();
        let drivers = drivers.clone();
        let vehicles = vehicles.clone();
        let godowns = godowns.clone();
        let arrivals_projection = arrivals.clone();
        let stock_projection = stock.clone();
        let users_projection = users.clone();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let at = env.aggregate_type().to_string();

                        // Apply to the relevant projection(s) only. Arrival
                        // events feed both the register and the stock ledger.
                        let apply_ok = match at.as_str() {
                            mandi_directory::AGGREGATE_TYPE => {
                                mandis.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            driver_roster::AGGREGATE_TYPE => {
                                drivers.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            vehicle_registry::AGGREGATE_TYPE => {
                                vehicles.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            godown_register::AGGREGATE_TYPE => {
                                godowns.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            arrivals::AGGREGATE_TYPE => arrivals_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string())
                                .and_then(|_| {
                                    stock_projection
                                        .apply_envelope(&env)
                                        .map_err(|e| e.to_string())
                                }),
                            daily_stock::BOOK_AGGREGATE_TYPE => stock_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            users::AGGREGATE_TYPE => users_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            _ => Ok(()),
                        };

                        if let Err(e) = apply_ok {
                            tracing::warn!("projection apply failed: {e}");
                            continue;
                        }

                        // Broadcast projection update (lossy; no backpressure on core).
                        let _ = realtime_tx.send(RealtimeMessage {
                            mill_id: env.mill_id(),
                            topic: format!("{at}.projection_updated"),
                            payload: serde_json::json!({
                                "kind": "projection_update",
                                "aggregate_type": at,
                                "aggregate_id": env.aggregate_id().to_string(),
                                "sequence_number": env.sequence_number(),
                            }),
                        });
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let backend = if use_persistent {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        let pool = PgPool::connect(&database_url)
            .await
            .expect("failed to connect to Postgres");

        let store = Arc::new(PostgresEventStore::new(pool));
        store
            .ensure_schema()
            .await
            .expect("failed to prepare events schema");

        Backend::Postgres(Arc::new(CommandDispatcher::new(store, bus)))
    } else {
        Backend::InMemory(Arc::new(CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            bus,
        )))
    };

    AppServices {
        backend,
        mandis,
        drivers,
        vehicles,
        godowns,
        arrivals,
        stock,
        users,
        token_issuer: Hs256TokenIssuer::new(jwt_secret.as_bytes()),
        realtime_tx,
    }
}

impl AppServices {
    pub async fn dispatch<A>(
        &self,
        mill_id: MillId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(MillId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: millbook_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        match &self.backend {
            Backend::InMemory(dispatcher) => {
                dispatcher
                    .dispatch::<A>(mill_id, aggregate_id, aggregate_type, command, make_aggregate)
                    .await
            }
            Backend::Postgres(dispatcher) => {
                dispatcher
                    .dispatch::<A>(mill_id, aggregate_id, aggregate_type, command, make_aggregate)
                    .await
            }
        }
    }

    pub fn mandis(&self) -> &MandiDirectoryProjection<MandiStore> {
        &self.mandis
    }

    pub fn drivers(&self) -> &DriverRosterProjection<DriverStore> {
        &self.drivers
    }

    pub fn vehicles(&self) -> &VehicleRegistryProjection<VehicleStore> {
        &self.vehicles
    }

    pub fn godowns(&self) -> &GodownRegisterProjection<GodownStore> {
        &self.godowns
    }

    pub fn arrivals(&self) -> &ArrivalsProjection<ArrivalStore> {
        &self.arrivals
    }

    pub fn stock(&self) -> &DailyStockProjection<StockStore> {
        &self.stock
    }

    pub fn users(&self) -> &UsersProjection<UserStore> {
        &self.users
    }

    pub fn token_issuer(&self) -> &Hs256TokenIssuer {
        &self.token_issuer
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }
}

/// Build an SSE stream for a mill (used by `/stream`).
pub fn mill_sse_stream(
    services: Arc<AppServices>,
    mill_id: MillId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.mill_id == mill_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
