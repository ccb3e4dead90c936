//! Reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Resolving the healthy topology of the group named by an event
//! - Rendering zone, region and per-instance record names
//! - Planning and applying the action that converges each record
//! - Maintaining ownership markers for per-instance records
//!
//! ## Architecture
//!
//! ```text
//!                       LifecycleEvent
//!                             │
//!                             ▼
//!                     ┌──────────────┐
//!                     │  Reconciler  │
//!                     └──────────────┘
//!                             │
//!      ┌──────────────────────┼──────────────────────┐
//!      │                      │                      │
//!      ▼                      ▼                      ▼
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐
//! │  Topology    │    │ NamePattern  │    │ OwnershipTracker │
//! │  Resolver    │    │ + planner    │    │ (TXT markers)    │
//! └──────────────┘    └──────────────┘    └──────────────────┘
//!                             │                      │
//!                             └──────────┬───────────┘
//!                                        ▼
//!                                ┌──────────────┐
//!                                │  DnsApplier  │
//!                                └──────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Terminate only: clear the instance's ownership marker and its record
//! 2. Resolve topology (failure aborts the invocation)
//! 3. Converge every zone record concurrently
//! 4. Converge the region record once all zones are done
//! 5. Launch only: create the per-instance record and its marker
//!
//! Every record is attempted independently. Failures are collected and
//! returned together as [`Error::Reconcile`].

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PatternKind, ReconcilerConfig};
use crate::error::{Error, RecordFailure, Result};
use crate::event::{EventKind, LifecycleEvent};
use crate::ownership::{OwnershipTracker, marker_name};
use crate::pattern::{Placeholder, RenderContext};
use crate::planner::{self, Action, Applied, DesiredRecord};
use crate::topology::Topology;
use crate::traits::{DnsApplier, RecordType, TopologyResolver, TxtResolver};

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// Event handling started
    Started {
        kind: EventKind,
        group_id: String,
        instance_id: String,
    },

    /// Record created or replaced
    RecordUpserted {
        record_name: String,
        values: Vec<String>,
    },

    /// Record deleted
    RecordDeleted {
        record_name: String,
        values: Vec<String>,
    },

    /// Record already converged; no store call made
    RecordSkipped {
        record_name: String,
        reason: String,
    },

    /// Record action failed
    RecordFailed {
        record_name: String,
        error: String,
    },

    /// Ownership marker written for a per-instance record
    OwnershipRecorded {
        instance_id: String,
        record_name: String,
    },

    /// Ownership marker and the records it pointed at removed
    OwnershipCleared {
        instance_id: String,
        record_names: Vec<String>,
    },

    /// Event handling finished
    Finished {
        kind: EventKind,
        actions: usize,
        failures: usize,
    },
}

/// Outcome of a fully successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub kind: EventKind,
    /// Zone and region actions, in application order
    pub actions: Vec<Action>,
    /// Per-instance records removed through the ownership marker
    pub cleared: Vec<String>,
    /// Per-instance record created on launch
    pub instance_record: Option<String>,
}

impl ReconcileReport {
    fn empty(kind: EventKind) -> Self {
        Self {
            kind,
            actions: Vec::new(),
            cleared: Vec::new(),
            instance_record: None,
        }
    }
}

/// Accumulated state of one invocation
struct Pass {
    report: ReconcileReport,
    failures: Vec<RecordFailure>,
}

/// Core reconciler
///
/// Holds no mutable state between invocations; one instance can serve
/// unrelated events concurrently behind an `Arc`.
pub struct Reconciler {
    /// Patterns, hosted zone and feature switches
    config: ReconcilerConfig,

    /// Healthy instance discovery
    topology: Arc<dyn TopologyResolver>,

    /// Authoritative DNS store
    applier: Arc<dyn DnsApplier>,

    /// Per-instance ownership markers
    ownership: OwnershipTracker,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Parameters
    ///
    /// - `topology`: Topology resolver implementation
    /// - `applier`: DNS applier implementation
    /// - `txt_resolver`: TXT lookup used for ownership markers
    /// - `config`: Reconciler configuration
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields
    /// reconcile events
    pub fn new(
        topology: Arc<dyn TopologyResolver>,
        applier: Arc<dyn DnsApplier>,
        txt_resolver: Arc<dyn TxtResolver>,
        config: ReconcilerConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let ownership = OwnershipTracker::new(Arc::clone(&applier), txt_resolver);

        let reconciler = Self {
            config,
            topology,
            applier,
            ownership,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Configuration in use
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Handle one lifecycle event to completion
    ///
    /// # Returns
    ///
    /// - `Ok(ReconcileReport)`: Every planned action succeeded
    /// - `Err(Error::Discovery)`: Topology lookup failed; nothing was planned
    /// - `Err(Error::Reconcile)` with a leading `Discovery` entry: the lookup
    ///   failed after an ownership clear had already failed
    /// - `Err(Error::Reconcile)`: At least one record failed; all were attempted
    pub async fn handle_event(&self, event: &LifecycleEvent) -> Result<ReconcileReport> {
        self.handle_event_with_cancel(event, &CancellationToken::new())
            .await
    }

    /// Handle one lifecycle event, stopping early when `cancel` fires
    ///
    /// Actions not yet applied when the token is cancelled are reported as
    /// [`Error::Cancelled`] failures inside [`Error::Reconcile`].
    pub async fn handle_event_with_cancel(
        &self,
        event: &LifecycleEvent,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport> {
        if event.kind == EventKind::Unknown {
            debug!(
                "Ignoring {:?} event for {}",
                event.detail_type, event.group_id
            );
            return Ok(ReconcileReport::empty(event.kind));
        }

        info!(
            "Handling {} of {} in {} ({})",
            event.kind, event.instance_id, event.group_id, event.region
        );
        self.emit_event(ReconcileEvent::Started {
            kind: event.kind,
            group_id: event.group_id.clone(),
            instance_id: event.instance_id.clone(),
        });

        let mut pass = Pass {
            report: ReconcileReport::empty(event.kind),
            failures: Vec::new(),
        };

        if event.kind == EventKind::Terminate && self.config.create_ip_records {
            self.clear_ownership(event, &mut pass, cancel).await;
        }

        info!(
            "Finding instances for {:?} in {:?}",
            event.group_id, event.region
        );
        let topology = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.fail(&mut pass, "topology".to_string(), Error::Cancelled(format!(
                    "topology lookup for {}", event.group_id
                )));
                return self.finish(pass);
            }
            resolved = self.topology.resolve_topology(&event.group_id, &event.region) => {
                match resolved {
                    Ok(topology) => topology,
                    Err(e) => return self.abort_discovery(pass, event, e),
                }
            }
        };

        for (zone, instances) in topology.zones() {
            for instance in instances {
                debug!(
                    "Found instance {:?} ({}) in {:?}",
                    instance.id, instance.private_ip, zone
                );
            }
        }

        let role = self.role(&event.group_id);
        self.converge_zones(event, &role, &topology, &mut pass, cancel)
            .await;
        self.converge_region(event, &role, &topology, &mut pass, cancel)
            .await;

        if event.kind == EventKind::Launch && self.config.create_ip_records {
            self.create_instance_record(event, &role, &topology, &mut pass, cancel)
                .await;
        }

        self.finish(pass)
    }

    /// Converge one record per availability zone, concurrently
    async fn converge_zones(
        &self,
        event: &LifecycleEvent,
        role: &str,
        topology: &Topology,
        pass: &mut Pass,
        cancel: &CancellationToken,
    ) {
        let Some(pattern) = self.config.pattern(PatternKind::Zone) else {
            debug!("No az pattern configured, skipping zone records");
            pass.report.actions.push(Action::NoOp);
            return;
        };

        let mut jobs = Vec::new();
        for (zone, instances) in topology.zones() {
            let context = self
                .context(event, role)
                .with(Placeholder::AvailabilityZone, zone);

            match pattern.render(&context) {
                Ok(name) => {
                    let desired = DesiredRecord::new(
                        name,
                        RecordType::A,
                        instances.iter().map(|i| i.private_ip.to_string()),
                    );
                    jobs.push(self.converge(desired, cancel));
                }
                Err(e) => {
                    self.fail(pass, format!("{} record for {}", PatternKind::Zone.key(), zone), e);
                }
            }
        }

        for (name, result) in join_all(jobs).await {
            self.settle(pass, name, result);
        }
    }

    /// Converge the region-wide record over every zone's instances
    async fn converge_region(
        &self,
        event: &LifecycleEvent,
        role: &str,
        topology: &Topology,
        pass: &mut Pass,
        cancel: &CancellationToken,
    ) {
        let Some(pattern) = self.config.pattern(PatternKind::Region) else {
            debug!("No region pattern configured, skipping region record");
            pass.report.actions.push(Action::NoOp);
            return;
        };

        match pattern.render(&self.context(event, role)) {
            Ok(name) => {
                let desired = DesiredRecord::new(name, RecordType::A, topology.region_addresses());
                let (name, result) = self.converge(desired, cancel).await;
                self.settle(pass, name, result);
            }
            Err(e) => {
                let record = format!("{} record for {}", PatternKind::Region.key(), event.region);
                self.fail(pass, record, e);
            }
        }
    }

    /// Create the launching instance's own record and its ownership marker
    async fn create_instance_record(
        &self,
        event: &LifecycleEvent,
        role: &str,
        topology: &Topology,
        pass: &mut Pass,
        cancel: &CancellationToken,
    ) {
        let Some(pattern) = self.config.pattern(PatternKind::Instance) else {
            warn!("create_ip_records is enabled but no ip pattern is configured");
            return;
        };

        let Some(instance) = topology.find_instance(&event.instance_id) else {
            warn!(
                "Instance {:?} is not in the healthy set, skipping its IP record",
                event.instance_id
            );
            return;
        };

        info!("Creating IP based DNS record for {:?}", event.instance_id);
        let context = self
            .context(event, role)
            .with(Placeholder::AvailabilityZone, instance.availability_zone.as_str())
            .with(Placeholder::Ip, instance.private_ip.to_string());

        let name = match pattern.render(&context) {
            Ok(name) => name,
            Err(e) => {
                let record = format!(
                    "{} record for {}",
                    PatternKind::Instance.key(),
                    event.instance_id
                );
                self.fail(pass, record, e);
                return;
            }
        };

        let desired =
            DesiredRecord::new(name.clone(), RecordType::A, [instance.private_ip.to_string()]);
        let (record, result) = self.converge(desired, cancel).await;
        let created = result.is_ok();
        self.settle(pass, record, result);
        if !created {
            // No marker without the record it would point at
            return;
        }

        let marker = marker_name(&event.instance_id, &event.region, &self.config.domain);
        let recorded = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled(marker.clone())),
            r = self.ownership.record_ownership(
                &event.instance_id,
                &name,
                &event.region,
                &self.config.domain,
            ) => r,
        };

        match recorded {
            Ok(()) => {
                self.emit_event(ReconcileEvent::OwnershipRecorded {
                    instance_id: event.instance_id.clone(),
                    record_name: name.clone(),
                });
                pass.report.instance_record = Some(name);
            }
            Err(e) => self.fail(pass, marker, e),
        }
    }

    /// Remove the terminating instance's own record through its marker
    async fn clear_ownership(
        &self,
        event: &LifecycleEvent,
        pass: &mut Pass,
        cancel: &CancellationToken,
    ) {
        info!("Removing IP based DNS record for {:?}", event.instance_id);
        let marker = marker_name(&event.instance_id, &event.region, &self.config.domain);

        let cleared = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled(marker.clone())),
            r = self.ownership.resolve_and_clear(
                &event.instance_id,
                &event.region,
                &self.config.domain,
            ) => r,
        };

        match cleared {
            Ok(names) => {
                self.emit_event(ReconcileEvent::OwnershipCleared {
                    instance_id: event.instance_id.clone(),
                    record_names: names.clone(),
                });
                pass.report.cleared = names;
            }
            Err(Error::OwnershipNotFound(marker)) => {
                warn!("No ownership marker at {}, nothing to delete", marker);
            }
            Err(Error::Reconcile(failures)) => {
                for failure in failures {
                    self.fail(pass, failure.record, failure.error);
                }
            }
            Err(e) => self.fail(pass, marker, e),
        }
    }

    /// Plan and apply one record, unless cancelled first
    async fn converge(
        &self,
        desired: DesiredRecord,
        cancel: &CancellationToken,
    ) -> (String, Result<Action>) {
        let name = desired.name.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled(name.clone())),
            r = self.plan_and_apply(&desired) => r,
        };
        (name, result)
    }

    async fn plan_and_apply(&self, desired: &DesiredRecord) -> Result<Action> {
        let action = planner::plan(desired, self.applier.as_ref()).await?;

        match (action.apply(self.applier.as_ref()).await?, &action) {
            (Applied::Changed, Action::Upsert { name, values, .. }) => {
                info!("Upserted {} -> {:?}", name, values);
                self.emit_event(ReconcileEvent::RecordUpserted {
                    record_name: name.clone(),
                    values: values.clone(),
                });
            }
            (Applied::Changed, Action::Delete { name, current_values, .. }) => {
                info!("Deleted {} (was {:?})", name, current_values);
                self.emit_event(ReconcileEvent::RecordDeleted {
                    record_name: name.clone(),
                    values: current_values.clone(),
                });
            }
            (Applied::AlreadyConverged, _) | (Applied::Changed, Action::NoOp) => {
                self.emit_event(ReconcileEvent::RecordSkipped {
                    record_name: desired.name.clone(),
                    reason: "already absent".to_string(),
                });
            }
        }

        Ok(action)
    }

    /// Record the outcome of one converged record
    fn settle(&self, pass: &mut Pass, record: String, result: Result<Action>) {
        match result {
            Ok(action) => pass.report.actions.push(action),
            Err(e) => self.fail(pass, record, e),
        }
    }

    fn fail(&self, pass: &mut Pass, record: String, error: Error) {
        error!("Record {} failed: {}", record, error);
        self.emit_event(ReconcileEvent::RecordFailed {
            record_name: record.clone(),
            error: error.to_string(),
        });
        pass.failures.push(RecordFailure { record, error });
    }

    /// End the pass on a topology lookup failure
    ///
    /// Failures collected before the lookup follow the discovery error inside
    /// `Error::Reconcile`.
    fn abort_discovery(
        &self,
        mut pass: Pass,
        event: &LifecycleEvent,
        error: Error,
    ) -> Result<ReconcileReport> {
        error!("Unable to find instances for {:?}: {}", event.group_id, error);
        let error = match error {
            Error::Discovery(_) => error,
            other => Error::discovery(other.to_string()),
        };

        if pass.failures.is_empty() {
            self.emit_event(ReconcileEvent::Finished {
                kind: pass.report.kind,
                actions: pass.report.actions.len(),
                failures: 1,
            });
            return Err(error);
        }

        self.emit_event(ReconcileEvent::RecordFailed {
            record_name: "topology".to_string(),
            error: error.to_string(),
        });
        let failure = RecordFailure {
            record: "topology".to_string(),
            error,
        };
        pass.failures.insert(0, failure);
        self.finish(pass)
    }

    fn finish(&self, pass: Pass) -> Result<ReconcileReport> {
        self.emit_event(ReconcileEvent::Finished {
            kind: pass.report.kind,
            actions: pass.report.actions.len(),
            failures: pass.failures.len(),
        });

        if pass.failures.is_empty() {
            info!(
                "Reconciled {} action(s) for {} event",
                pass.report.actions.len(),
                pass.report.kind
            );
            Ok(pass.report)
        } else {
            Err(Error::Reconcile(pass.failures))
        }
    }

    /// Values every pattern kind can use
    fn context(&self, event: &LifecycleEvent, role: &str) -> RenderContext {
        let mut context = RenderContext::new()
            .with(Placeholder::AutoScalingGroup, event.group_id.as_str())
            .with(Placeholder::Role, role)
            .with(Placeholder::Region, event.region.as_str());

        if !self.config.environment_name.is_empty() {
            context.set(Placeholder::EnvironmentName, self.config.environment_name.as_str());
        }
        if !self.config.domain.is_empty() {
            context.set(Placeholder::Domain, self.config.domain.as_str());
        }
        context
    }

    /// Group name with the `-{environment}` suffix removed
    fn role(&self, group_id: &str) -> String {
        if self.config.environment_name.is_empty() {
            return group_id.to_string();
        }
        group_id.replace(&format!("-{}", self.config.environment_name), "")
    }

    /// Emit a reconcile event
    fn emit_event(&self, event: ReconcileEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Increase event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
