// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Hot-plug reconciliation
//!
//! Each tick enumerates the visible endpoints of all enabled device
//! families and diffs them against the [`DeviceRegistry`]. Newly
//! visible endpoints are opened and attached, endpoints that have
//! disappeared are detached. Exactly one notification is emitted
//! for each transition.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use strum::IntoEnumIterator as _;

use crate::{
    config::Config,
    notify::{EventSink, Lifecycle, Notification},
    registry::{
        DeviceFamily, DeviceId, DeviceRegistry, Direction, EndpointHandle, EndpointKind,
        WorkerToken,
    },
    transport::{DiscoveredEndpoint, OutputEndpoint, Transport},
};

mod worker;
use self::worker::{InputWorker, Termination};

#[cfg(test)]
mod tests;

/// State shared by the reconciler, all input workers, and senders
pub struct HotplugContext {
    registry: DeviceRegistry,
    transport: Box<dyn Transport>,
    sink: Box<dyn EventSink>,
    config: Config,
    stopping: AtomicBool,
}

impl fmt::Debug for HotplugContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotplugContext")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("stopping", &self.stopping)
            .finish_non_exhaustive()
    }
}

impl HotplugContext {
    #[must_use]
    pub fn new(
        transport: impl Transport + 'static,
        sink: impl EventSink + 'static,
        config: Config,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            transport: Box::new(transport),
            sink: Box::new(sink),
            config,
            stopping: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    /// Observed by the reconciler and all workers.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub(crate) fn set_stopping(&self, stopping: bool) {
        self.stopping.store(stopping, Ordering::Release);
    }

    fn notify_lifecycle(&self, id: &DeviceId, kind: EndpointKind, lifecycle: Lifecycle) {
        match lifecycle {
            Lifecycle::Attached => log::info!("Attached {kind} {id}"),
            Lifecycle::Detached => log::info!("Detached {kind} {id}"),
        }
        Notification::lifecycle(id, kind.direction, lifecycle).emit(self.sink());
    }

    /// Detach after a permanent read failure of an input worker.
    ///
    /// Also detaches the output with the same id of the same family.
    /// Notifications are only emitted for entries that are actually
    /// removed, which prevents duplicates if the reconciler has already
    /// detached them. A stale worker whose input has already been
    /// detached leaves all entries of a re-attached device untouched.
    fn detach_failed_input(&self, kind: EndpointKind, id: &DeviceId, token: &WorkerToken) {
        debug_assert_eq!(kind.direction, Direction::Input);
        if !self.registry.remove_input_of_worker(kind, id, token) {
            log::debug!("{kind} {id} has already been detached");
            return;
        }
        self.notify_lifecycle(id, kind, Lifecycle::Detached);
        let output_kind = kind.counterpart();
        if self.registry.remove(output_kind, id).is_some() {
            self.notify_lifecycle(id, output_kind, Lifecycle::Detached);
        }
    }

    /// Detach after a permanent write failure.
    ///
    /// The entry is only removed if it still refers to the failed endpoint.
    pub(crate) fn detach_failed_output(
        &self,
        kind: EndpointKind,
        id: &DeviceId,
        failed: &Arc<dyn OutputEndpoint>,
    ) {
        debug_assert_eq!(kind.direction, Direction::Output);
        if self.registry.remove_output(kind, id, failed) {
            self.notify_lifecycle(id, kind, Lifecycle::Detached);
        }
    }
}

/// Periodically synchronizes the registry with the visible endpoints.
///
/// Owns all input workers.
#[derive(Debug)]
pub struct HotplugReconciler {
    context: Arc<HotplugContext>,
    workers: Vec<InputWorker>,
}

impl HotplugReconciler {
    #[must_use]
    pub const fn new(context: Arc<HotplugContext>) -> Self {
        Self {
            context,
            workers: Vec::new(),
        }
    }

    #[must_use]
    pub const fn context(&self) -> &Arc<HotplugContext> {
        &self.context
    }

    /// Number of input workers that have not been joined yet.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Perform a single reconciliation pass over all enabled families.
    pub fn tick(&mut self) {
        self.reap_finished_workers();
        for family in DeviceFamily::iter() {
            if !self.context.config().is_family_enabled(family) {
                continue;
            }
            if self.context.is_stopping() {
                return;
            }
            self.reconcile_family(family);
        }
    }

    fn reconcile_family(&mut self, family: DeviceFamily) {
        let discovered = match self.context.transport.enumerate(family) {
            Ok(discovered) => discovered,
            Err(err) => {
                // Skip the diff to prevent spurious detach notifications
                log::warn!("{err}");
                return;
            }
        };
        let mut visible_inputs = HashSet::new();
        let mut visible_outputs = HashSet::new();
        for endpoint in discovered {
            debug_assert_eq!(family, endpoint.address.family());
            let visible = match endpoint.direction {
                Direction::Input => &mut visible_inputs,
                Direction::Output => &mut visible_outputs,
            };
            visible.insert(endpoint.id.clone());
            if self.context.registry.contains(endpoint.kind(), &endpoint.id) {
                continue;
            }
            self.attach(&endpoint);
        }
        self.detach_invisible(
            EndpointKind::new(family, Direction::Input),
            &visible_inputs,
        );
        self.detach_invisible(
            EndpointKind::new(family, Direction::Output),
            &visible_outputs,
        );
    }

    fn attach(&mut self, endpoint: &DiscoveredEndpoint) {
        let id = &endpoint.id;
        if self.context.registry.cache_name(id, endpoint.name.clone()) {
            log::debug!(
                "Discovered {kind} {id}: {name}",
                kind = endpoint.kind(),
                name = endpoint.name.as_str()
            );
        }
        match endpoint.direction {
            Direction::Input => self.attach_input(endpoint),
            Direction::Output => self.attach_output(endpoint),
        }
    }

    fn attach_input(&mut self, endpoint: &DiscoveredEndpoint) {
        let context = Arc::clone(&self.context);
        let kind = endpoint.kind();
        let id = &endpoint.id;
        let input = match context.transport.open_input(endpoint) {
            Ok(input) => input,
            Err(err) => {
                log::warn!("Failed to open {kind} {id}: {err}");
                return;
            }
        };
        let token = WorkerToken::new();
        if !context
            .registry
            .insert(kind, id.clone(), EndpointHandle::Input(token.clone()))
        {
            log::debug!("{kind} {id} is already attached");
            return;
        }
        // Notify before the worker might detach the endpoint
        context.notify_lifecycle(id, kind, Lifecycle::Attached);
        match InputWorker::spawn(Arc::clone(&context), kind, id.clone(), input, token.clone()) {
            Ok(worker) => {
                self.workers.push(worker);
            }
            Err(err) => {
                log::warn!("Failed to spawn input thread for {kind} {id}: {err}");
                if context.registry.remove_input_of_worker(kind, id, &token) {
                    context.notify_lifecycle(id, kind, Lifecycle::Detached);
                }
            }
        }
    }

    fn attach_output(&self, endpoint: &DiscoveredEndpoint) {
        let kind = endpoint.kind();
        let id = &endpoint.id;
        let output = match self.context.transport.open_output(endpoint) {
            Ok(output) => output,
            Err(err) => {
                log::warn!("Failed to open {kind} {id}: {err}");
                return;
            }
        };
        if !self
            .context
            .registry
            .insert(kind, id.clone(), EndpointHandle::Output(output))
        {
            log::debug!("{kind} {id} is already attached");
            return;
        }
        self.context.notify_lifecycle(id, kind, Lifecycle::Attached);
    }

    fn detach_invisible(&self, kind: EndpointKind, visible: &HashSet<DeviceId>) {
        for id in self.context.registry.device_ids(kind) {
            if visible.contains(&id) {
                continue;
            }
            let Some(handle) = self.context.registry.remove(kind, &id) else {
                // Already detached by a worker
                continue;
            };
            if let EndpointHandle::Input(token) = &handle {
                token.cancel();
            }
            drop(handle);
            self.context.notify_lifecycle(&id, kind, Lifecycle::Detached);
        }
    }

    fn reap_finished_workers(&mut self) {
        let mut index = 0;
        while index < self.workers.len() {
            if !self.workers[index].is_finished() {
                index += 1;
                continue;
            }
            let worker = self.workers.swap_remove(index);
            let device_id = worker.device_id().clone();
            match worker.join() {
                Ok(termination) => {
                    log::debug!("Reaped input thread of {device_id}: {termination:?}");
                }
                Err(err) => {
                    log::warn!("{err}");
                }
            }
        }
    }

    /// Cancel and join all input workers and clear the registry.
    ///
    /// No detach notifications are emitted.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        for worker in &self.workers {
            worker.cancel();
        }
        let mut panicked = 0;
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(Termination::Cancelled | Termination::Failed) => (),
                Err(err) => {
                    log::warn!("{err}");
                    panicked += 1;
                }
            }
        }
        for family in DeviceFamily::iter() {
            for direction in Direction::iter() {
                let kind = EndpointKind::new(family, direction);
                for (id, _handle) in self.context.registry.drain(kind) {
                    log::debug!("Closed {kind} {id}");
                }
            }
        }
        if panicked > 0 {
            anyhow::bail!("{panicked} input thread(s) panicked");
        }
        Ok(())
    }
}

impl Drop for HotplugReconciler {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        if let Err(err) = self.shutdown() {
            log::warn!("Failed to shut down: {err}");
        }
    }
}
