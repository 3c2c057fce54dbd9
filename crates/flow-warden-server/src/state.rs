// crates/flow-warden-server/src/state.rs
// ============================================================================
// Module: Engine Assembly
// Description: Construction of the full engine stack from configuration.
// Purpose: Wire store, governor, gates, workers, sessions, and bridge.
// Dependencies: flow-warden-* crates, tokio-util, tracing
// ============================================================================

//! ## Overview
//! The assembly is the composition root: the store is the leaf, the
//! governor holds the store, workers and guard sit beside it, sessions own
//! their process resources, and the bridge is constructed last with
//! references down the stack. Cancellation flows from one ambient token.
//! The review phase gate consults persisted scorecards and fails closed
//! when they cannot be read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use flow_warden_config::WardenConfig;
use flow_warden_core::BlockerChecker;
use flow_warden_core::BudgetGovernor;
use flow_warden_core::DefaultGate;
use flow_warden_core::GateRegistry;
use flow_warden_core::Phase;
use flow_warden_core::ReviewGate;
use flow_warden_core::WorkflowEngine;
use flow_warden_core::WorkflowStore;
use flow_warden_guard::Guard;
use flow_warden_guard::GuardConfig;
use flow_warden_sessions::Bridge;
use flow_warden_sessions::ProviderRegistry;
use flow_warden_sessions::ProviderSpec;
use flow_warden_sessions::SessionManager;
use flow_warden_store_sqlite::SqliteStoreConfig;
use flow_warden_store_sqlite::SqliteWorkflowStore;
use flow_warden_workers::Supervisor;
use flow_warden_workers::WorkerManager;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Fully wired engine stack shared by every request handler.
///
/// # Invariants
/// - Construction order is a DAG; no component holds a reference back up
///   the stack.
pub struct EngineAssembly {
    /// Persistence backend shared by every component.
    pub store: Arc<dyn WorkflowStore>,
    /// Seven-phase workflow engine.
    pub engine: Arc<WorkflowEngine>,
    /// Budget governor.
    pub governor: BudgetGovernor,
    /// Worker lifecycle manager.
    pub manager: Arc<WorkerManager>,
    /// Timeout supervisor.
    pub supervisor: Arc<Supervisor>,
    /// Request-time guard.
    pub guard: Arc<Guard>,
    /// Provider session manager.
    pub sessions: Arc<SessionManager>,
    /// Session-to-engine bridge.
    pub bridge: Arc<Bridge>,
    /// Default soft deadline, in seconds, for worker specs built by
    /// transports that do not choose their own.
    pub heartbeat_max_age_sec: i64,
    /// Ambient cancellation for every background task.
    pub ambient: CancellationToken,
}

impl EngineAssembly {
    /// Opens the durable store at the configured path and wires the stack.
    ///
    /// # Errors
    ///
    /// Returns a store error when the database cannot be opened and
    /// `provider_unavailable` on duplicate provider registration.
    pub fn open(config: &WardenConfig) -> Result<Self, flow_warden_core::EngineError> {
        let store = SqliteWorkflowStore::open(&SqliteStoreConfig::for_path(
            config.database_path.clone(),
        ))?;
        Self::from_config(config, Arc::new(store))
    }

    /// Wires the full stack over a store using the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `provider_unavailable` when the configuration registers the
    /// same provider name twice (the map cannot, but defensive reuse of
    /// this constructor can).
    pub fn from_config(
        config: &WardenConfig,
        store: Arc<dyn WorkflowStore>,
    ) -> Result<Self, flow_warden_core::EngineError> {
        let ambient = CancellationToken::new();

        let governor = BudgetGovernor::new(Arc::clone(&store));
        let gates = build_gates(&store);
        let engine = Arc::new(WorkflowEngine::new(Arc::clone(&store), gates));

        let manager =
            Arc::new(WorkerManager::new(Arc::clone(&store), config.max_concurrent_workers));
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&store),
            Arc::clone(&manager),
            config.check_interval_sec,
            &ambient,
        ));
        let guard = Arc::new(Guard::new(Arc::clone(&store), GuardConfig {
            rate_limit_per_minute: config.rate_limit_per_minute,
            max_rounds: config.max_rounds,
        }));

        let registry = Arc::new(ProviderRegistry::new());
        for (name, provider) in &config.providers {
            registry.register(ProviderSpec {
                name: name.clone(),
                command: provider.command.clone(),
                args: provider.args.clone(),
                env: provider.env.clone(),
            })?;
        }
        let sessions = Arc::new(SessionManager::new(registry, &ambient));
        let bridge = Arc::new(Bridge::new(
            Arc::clone(&sessions),
            Arc::clone(&guard),
            governor.clone(),
            Arc::clone(&store),
            &ambient,
        ));

        Ok(Self {
            store,
            engine,
            governor,
            manager,
            supervisor,
            guard,
            sessions,
            bridge,
            heartbeat_max_age_sec: config.heartbeat_max_age_sec,
            ambient,
        })
    }

    /// Cancels every background task and stops all sessions.
    pub async fn shutdown(&self) {
        self.supervisor.stop_monitoring();
        self.sessions.stop_all().await;
        self.ambient.cancel();
    }
}

// ============================================================================
// SECTION: Gate Wiring
// ============================================================================

/// Builds the gate registry: the default gate everywhere, with the review
/// phase additionally blocked on unresolved scorecard findings.
fn build_gates(store: &Arc<dyn WorkflowStore>) -> GateRegistry {
    let mut gates = GateRegistry::with_defaults();
    let review_store = Arc::clone(store);
    let checker = BlockerChecker::new();
    gates.register(
        Phase::Review,
        Arc::new(ReviewGate::new(Arc::new(DefaultGate), move |state| {
            match review_store.list_score_cards(&state.flow_id) {
                Ok(cards) => checker.check(&cards).1,
                Err(err) => {
                    tracing::warn!(flow = %state.flow_id, error = %err, "scorecard read failed");
                    vec!["scorecards unavailable".to_string()]
                }
            }
        })),
    );
    gates
}
