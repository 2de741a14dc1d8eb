//! DaemonCore: the single task that owns the radio state.
//!
//! Client commands, backend events and catalog scans all arrive on one
//! channel and are applied one at a time.  After each accepted mutation the
//! deferred backend calls go to the worker as one batch and a snapshot goes
//! to the broadcaster, in that order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use opuscule_proto::metadata::Metadata;
use opuscule_proto::protocol::{Notice, Request};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::backend::BackendQueue;
use crate::broadcaster::BroadcastEvent;
use crate::components::Component;
use crate::dispatch::{Dispatcher, Follow};
use crate::menu::Blueprint;

/// How long shutdown waits for queued backend work.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ── Events ────────────────────────────────────────────────────────────────────

pub enum DaemonEvent {
    /// A client connected and should see the current state.
    ClientConnected,
    /// A command from a client.  The reply carries the rejection text.
    Command {
        client: usize,
        request: Request,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// A backend stopped playing on its own.
    BackendStopped { source: &'static str },
    /// Track details a backend reported.
    BackendMetadata {
        source: &'static str,
        record: Metadata,
    },
    /// The backend worker finished one batch.
    JobFinished,
    /// A component's catalog scan completed.
    CatalogLoaded {
        component: String,
        result: anyhow::Result<Vec<Blueprint>>,
    },
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore {
    dispatcher: Dispatcher,
    backend: BackendQueue,
    broadcast_tx: mpsc::UnboundedSender<BroadcastEvent>,
    /// WARN and ERROR log events, posted as FAULT messages.
    notices: mpsc::UnboundedReceiver<Notice>,
    /// For tasks the core spawns itself.
    event_tx: mpsc::UnboundedSender<DaemonEvent>,
    /// Batches submitted to the worker and not yet finished, oldest first,
    /// each with the backend sources its transport calls drive.
    in_flight: VecDeque<Vec<&'static str>>,
}

impl DaemonCore {
    pub fn new(
        dispatcher: Dispatcher,
        backend: BackendQueue,
        broadcast_tx: mpsc::UnboundedSender<BroadcastEvent>,
        notices: mpsc::UnboundedReceiver<Notice>,
        event_tx: mpsc::UnboundedSender<DaemonEvent>,
    ) -> Self {
        Self {
            dispatcher,
            backend,
            broadcast_tx,
            notices,
            event_tx,
            in_flight: VecDeque::new(),
        }
    }

    pub async fn run(
        mut self,
        mut event_rx: mpsc::UnboundedReceiver<DaemonEvent>,
    ) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        self.dispatcher.radio.sync_volume();
        for component in self.dispatcher.catalogs() {
            self.scan(component);
        }
        self.commit();

        loop {
            let evt = tokio::select! {
                biased;
                Some(notice) = self.notices.recv() => {
                    self.dispatcher.radio.messages.push(notice);
                    continue;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("DaemonCore: interrupted");
                    break;
                }
                evt = event_rx.recv() => evt,
            };

            match evt {
                None => {
                    info!("DaemonCore: event channel closed, shutting down");
                    break;
                }

                Some(DaemonEvent::ClientConnected) => self.broadcast(),

                Some(DaemonEvent::Command {
                    client,
                    request,
                    reply,
                }) => match self.dispatcher.handle(&request.command) {
                    Ok(follow) => {
                        let _ = reply.send(Ok(()));
                        self.commit();
                        match follow {
                            Follow::None => {}
                            Follow::Shutdown => {
                                info!("DaemonCore: shutdown requested by client {}", client);
                                break;
                            }
                            Follow::Rescan(tag) => match self.dispatcher.component(&tag) {
                                Some(component) => self.scan(component),
                                None => warn!("Nothing to rescan for {}", tag),
                            },
                        }
                    }
                    Err(e) => {
                        debug!("DaemonCore: client {} command rejected: {}", client, e);
                        let _ = reply.send(Err(e.to_string()));
                    }
                },

                Some(DaemonEvent::BackendStopped { source }) => {
                    // our own stop/play pairs pass through the backend too
                    if self.drives_pending(source) {
                        debug!("DaemonCore: {} stop ignored, transport calls pending", source);
                    } else if self.dispatcher.backend_stopped(source) {
                        self.commit();
                    }
                }

                Some(DaemonEvent::BackendMetadata { source, record }) => {
                    if self.dispatcher.backend_metadata(source, record) {
                        self.commit();
                    }
                }

                Some(DaemonEvent::JobFinished) => {
                    self.in_flight.pop_front();
                    if !self.dispatcher.radio.messages.is_empty() {
                        self.broadcast();
                    }
                }

                Some(DaemonEvent::CatalogLoaded { component, result }) => match result {
                    Ok(sections) => {
                        if self.dispatcher.install_catalog(&component, sections) {
                            self.commit();
                        }
                    }
                    Err(e) => warn!("Could not read the {} catalog: {:#}", component, e),
                },
            }
        }

        self.power_down(&mut event_rx).await;
        Ok(())
    }

    /// Hand the deferred calls to the worker, then broadcast.
    fn commit(&mut self) {
        let calls = self.dispatcher.radio.take_calls();
        if !calls.is_empty() {
            let sources: Vec<&'static str> =
                calls.iter().filter_map(|call| call.transport_source()).collect();
            if self.backend.submit(calls) {
                self.in_flight.push_back(sources);
            } else {
                warn!("DaemonCore: backend worker is gone");
            }
        }
        self.broadcast();
    }

    /// Whether a queued batch still plays or stops something on `source`.
    fn drives_pending(&self, source: &str) -> bool {
        self.in_flight
            .iter()
            .any(|sources| sources.iter().any(|&s| s == source))
    }

    fn broadcast(&mut self) {
        let snapshot = self.dispatcher.radio.snapshot();
        if self
            .broadcast_tx
            .send(BroadcastEvent::Snapshot(Box::new(snapshot)))
            .is_err()
        {
            debug!("DaemonCore: broadcaster is gone");
        }
    }

    fn scan(&self, component: Arc<dyn Component>) {
        if !component.has_catalog() {
            return;
        }
        let events = self.event_tx.clone();
        tokio::spawn(async move {
            let tag = component.tag();
            debug!("Scanning {} catalog", tag);
            let result = component.scan().await;
            let _ = events.send(DaemonEvent::CatalogLoaded {
                component: tag.to_string(),
                result,
            });
        });
    }

    /// Stop playback, save favorites and wait for the worker to run it.
    async fn power_down(&mut self, event_rx: &mut mpsc::UnboundedReceiver<DaemonEvent>) {
        self.dispatcher.power_down();
        self.commit();

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while !self.in_flight.is_empty() {
                match event_rx.recv().await {
                    Some(DaemonEvent::JobFinished) => {
                        self.in_flight.pop_front();
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "DaemonCore: {} backend batches still pending at exit",
                self.in_flight.len()
            );
        }
        info!("DaemonCore: stopped");
    }
}
