//! # Watch Loop
//!
//! One [`WatchDispatcher`] per resource kind turns watch events into full
//! sweeps of that kind.
//!
//! Events are filtered, decoded one by one, and coalesced: a burst of events
//! inside the debounce window produces a single sweep. Sweeps for one kind never
//! overlap because a single worker task runs them in order. Every sweep waits
//! for leadership first.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{Reconciler, ReconcilerError, ResourceKind, SweepTrigger};
use crate::controller::store::decode;
use crate::crd::RandomSecret;
use crate::observability::metrics;
use crate::runtime::error_policy::handle_watch_stream_error;
use crate::runtime::shutdown::{InFlightTracker, ShutdownCoordinator, ShutdownSignal};
use anyhow::{bail, Result};
use futures::{Stream, StreamExt};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::Client;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn, Instrument};

/// What the filter decided about one watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Schedule a sweep
    Trigger,
    /// Initial listing of an object that predates this process
    Historical,
    /// Same uid and resourceVersion as an event already seen
    Duplicate,
    /// Bookkeeping events (init markers, deletions)
    Ignored,
}

impl FilterDecision {
    fn as_str(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Historical => "historical",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
        }
    }
}

/// Drops watch events that cannot change the outcome of a sweep
///
/// `seen` holds one uid/resourceVersion pair per live object of the kind; it
/// stays bounded by the number of live objects because `Delete` prunes it.
/// Objects older than the process are only skipped during the first list,
/// which the startup sweep covers; a relist after a watch gap goes through
/// the resourceVersion check instead.
#[derive(Debug)]
pub struct EventFilter {
    started_at: DateTime<Utc>,
    seen: HashMap<String, String>,
    initial_list_done: bool,
}

impl EventFilter {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            seen: HashMap::new(),
            initial_list_done: false,
        }
    }

    pub fn admit(&mut self, event: &watcher::Event<DynamicObject>) -> FilterDecision {
        match event {
            watcher::Event::Init => FilterDecision::Ignored,
            watcher::Event::InitDone => {
                self.initial_list_done = true;
                FilterDecision::Ignored
            }
            watcher::Event::Delete(obj) => {
                if let Some(uid) = &obj.metadata.uid {
                    self.seen.remove(uid);
                }
                FilterDecision::Ignored
            }
            watcher::Event::InitApply(obj) => self.observe(&obj.metadata, true),
            watcher::Event::Apply(obj) => self.observe(&obj.metadata, false),
        }
    }

    fn observe(&mut self, meta: &ObjectMeta, initial: bool) -> FilterDecision {
        if let (Some(uid), Some(rv)) = (&meta.uid, &meta.resource_version) {
            if self.seen.get(uid) == Some(rv) {
                return FilterDecision::Duplicate;
            }
            self.seen.insert(uid.clone(), rv.clone());
        }

        // The startup sweep already covers everything that existed before us
        let created_before_start = meta
            .creation_timestamp
            .as_ref()
            .is_some_and(|t| t.0 < self.started_at);
        if initial && !self.initial_list_done && created_before_start {
            return FilterDecision::Historical;
        }

        FilterDecision::Trigger
    }
}

/// API resource watched for a kind
#[must_use]
pub fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
        ResourceKind::RandomSecret => ApiResource::erase::<RandomSecret>(&()),
    }
}

/// Check that a watched object decodes as its kind
fn convert(kind: ResourceKind, obj: &DynamicObject) -> Result<(), serde_json::Error> {
    match kind {
        ResourceKind::Secret => decode::<Secret>(obj).map(drop),
        ResourceKind::RandomSecret => decode::<RandomSecret>(obj).map(drop),
    }
}

/// Watches one resource kind and runs sweeps for it
#[derive(Debug)]
pub struct WatchDispatcher {
    kind: ResourceKind,
    reconciler: Arc<Reconciler>,
    shutdown: ShutdownSignal,
    in_flight: InFlightTracker,
    debounce: Duration,
    restart_delay: Duration,
    started_at: DateTime<Utc>,
}

impl WatchDispatcher {
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        reconciler: Arc<Reconciler>,
        coordinator: &ShutdownCoordinator,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            kind,
            reconciler,
            shutdown: coordinator.signal(),
            in_flight: coordinator.in_flight(),
            debounce: config.sweep_debounce(),
            restart_delay: config.watch_restart_delay_duration(),
            started_at: Utc::now(),
        }
    }

    /// Override the process start time used to recognise historical objects
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Watch the kind across all namespaces until shutdown
    pub async fn run(self, client: Client) -> Result<()> {
        let api: Api<DynamicObject> = Api::all_with(client, &api_resource(self.kind));
        let events = watcher(api, watcher::Config::default()).default_backoff();
        self.run_with_events(events).await
    }

    /// Drive the dispatcher from an arbitrary event stream
    ///
    /// Returns an error if the stream ends before shutdown was requested.
    pub async fn run_with_events<S>(self, events: S) -> Result<()>
    where
        S: Stream<Item = Result<watcher::Event<DynamicObject>, watcher::Error>> + Send,
    {
        let kind = self.kind;
        let span = tracing::info_span!("controller.watch", kind = kind.as_str());
        self.dispatch_loop(events).instrument(span).await
    }

    async fn dispatch_loop<S>(self, events: S) -> Result<()>
    where
        S: Stream<Item = Result<watcher::Event<DynamicObject>, watcher::Error>> + Send,
    {
        let kind = self.kind;
        info!("Starting watch dispatcher");

        // Capacity 1: a pending trigger absorbs every later event until the
        // worker picks it up
        let (tx, rx) = mpsc::channel(1);
        let worker = tokio::spawn(
            sweep_worker(
                kind,
                Arc::clone(&self.reconciler),
                rx,
                self.shutdown.clone(),
                self.in_flight.clone(),
                self.debounce,
            )
            .in_current_span(),
        );

        let mut filter = EventFilter::new(self.started_at);
        let mut shutdown = self.shutdown.clone();
        let mut events = std::pin::pin!(events);

        let ended_early = loop {
            tokio::select! {
                () = shutdown.triggered() => {
                    info!("Stop signal received, closing watch");
                    break false;
                }
                next = events.next() => match next {
                    Some(Ok(event)) => self.handle_event(&mut filter, &event, &tx),
                    Some(Err(e)) => {
                        handle_watch_stream_error(kind, &format!("{e:?}"), self.restart_delay).await;
                    }
                    None => break true,
                },
            }
        };

        drop(tx);
        if let Err(e) = worker.await {
            warn!(error = %e, "Sweep worker panicked");
        }

        if ended_early {
            bail!("{kind} watch stream ended unexpectedly");
        }
        info!("Watch dispatcher stopped");
        Ok(())
    }

    fn handle_event(
        &self,
        filter: &mut EventFilter,
        event: &watcher::Event<DynamicObject>,
        tx: &mpsc::Sender<()>,
    ) {
        let decision = filter.admit(event);
        let obj = match event {
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => obj,
            _ => return,
        };
        let namespace = obj.metadata.namespace.as_deref().unwrap_or_default();
        let name = obj.metadata.name.as_deref().unwrap_or_default();

        if decision != FilterDecision::Trigger {
            debug!(namespace, name, reason = decision.as_str(), "Skipping watch event");
            metrics::increment_watch_events_dropped(self.kind.as_str(), decision.as_str());
            return;
        }

        if let Err(e) = convert(self.kind, obj) {
            warn!(namespace, name, error = %e, "Dropping malformed object from watch");
            metrics::increment_watch_events_dropped(self.kind.as_str(), "malformed");
            return;
        }

        match tx.try_send(()) {
            Ok(()) => debug!(namespace, name, "Sweep scheduled"),
            Err(TrySendError::Full(())) => debug!(namespace, name, "Sweep already pending"),
            Err(TrySendError::Closed(())) => warn!("Sweep worker gone, event dropped"),
        }
    }
}

/// Run sweeps one at a time: startup first, then one per debounced burst
async fn sweep_worker(
    kind: ResourceKind,
    reconciler: Arc<Reconciler>,
    mut triggers: mpsc::Receiver<()>,
    mut shutdown: ShutdownSignal,
    in_flight: InFlightTracker,
    debounce: Duration,
) {
    if !run_sweep(kind, &reconciler, &mut shutdown, &in_flight, SweepTrigger::Startup).await {
        return;
    }

    loop {
        tokio::select! {
            () = shutdown.triggered() => return,
            next = triggers.recv() => {
                if next.is_none() {
                    return;
                }
            }
        }

        tokio::select! {
            () = shutdown.triggered() => return,
            () = tokio::time::sleep(debounce) => {}
        }
        while triggers.try_recv().is_ok() {}

        if !run_sweep(kind, &reconciler, &mut shutdown, &in_flight, SweepTrigger::WatchEvent).await
        {
            return;
        }
    }
}

/// Wait for leadership and run one sweep; false when shutdown intervened
async fn run_sweep(
    kind: ResourceKind,
    reconciler: &Reconciler,
    shutdown: &mut ShutdownSignal,
    in_flight: &InFlightTracker,
    trigger: SweepTrigger,
) -> bool {
    loop {
        if !reconciler.leader().is_leader() {
            debug!("Not leader, waiting before sweeping");
        }
        tokio::select! {
            () = shutdown.triggered() => return false,
            () = reconciler.leader().await_leadership() => {}
        }
        if shutdown.is_triggered() {
            return false;
        }

        let _guard = in_flight.begin();
        match reconciler.reconcile(kind, trigger).await {
            // Leadership flipped between the wait and the sweep
            Err(ReconcilerError::NotLeader) => continue,
            // Already logged with the sweep span; the next event retries
            Ok(_) | Err(_) => return true,
        }
    }
}
