//! Sensor worker task
//!
//! The worker owns the sensor and is the only task that talks to it. It
//! alternates between draining requests and advancing the active workflow
//! by one step.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use fprust_core::{Session, SessionState};
use fprust_types::{DeleteTarget, EventRecord, IndexTable, SensorEvent};

use crate::config::SensorConfig;
use crate::enroll::EnrollMachine;
use crate::error::Result;
use crate::search::{SearchCycle, SearchMode};
use crate::sensor::Sensor;
use crate::workflow::{EventSink, Progress};

/// Work submitted by an engine handle
#[derive(Debug)]
pub(crate) enum Request {
    StartEnroll {
        slot: u16,
    },
    CancelEnroll,
    StartSearch {
        mode: SearchMode,
    },
    CancelSearch,
    Delete {
        target: DeleteTarget,
        reply: oneshot::Sender<Result<()>>,
    },
    TemplateCount {
        reply: oneshot::Sender<Result<u16>>,
    },
    ReadIndexTable {
        page: u8,
        reply: oneshot::Sender<Result<IndexTable>>,
    },
    FindFreeSlot {
        reply: oneshot::Sender<Result<Option<u16>>>,
    },
    Shutdown,
}

/// Stamps events and hands them to subscribers
pub(crate) struct EventPublisher {
    tx: broadcast::Sender<EventRecord>,
    seq: u64,
}

impl EventPublisher {
    pub(crate) fn new(tx: broadcast::Sender<EventRecord>) -> Self {
        Self { tx, seq: 0 }
    }
}

impl EventSink for EventPublisher {
    fn emit(&mut self, event: SensorEvent) {
        self.seq += 1;
        debug!(seq = self.seq, %event, "Event");

        // No subscribers is not an error
        let _ = self.tx.send(EventRecord::new(self.seq, event));
    }
}

enum Workflow {
    Idle,
    Enroll(EnrollMachine),
    Search(SearchCycle),
}

pub(crate) struct Worker {
    sensor: Sensor,
    session: Session,
    requests: mpsc::Receiver<Request>,
    events: EventPublisher,
    workflow: Workflow,
    max_retries: u8,
    poll_interval: Duration,
    idle_poll_interval: Duration,
    idle_threshold: u32,
}

impl Worker {
    pub(crate) fn new(
        sensor: Sensor,
        session: Session,
        requests: mpsc::Receiver<Request>,
        events: EventPublisher,
        config: &SensorConfig,
    ) -> Self {
        Self {
            sensor,
            session,
            requests,
            events,
            workflow: Workflow::Idle,
            max_retries: config.max_retries,
            poll_interval: config.poll_interval,
            idle_poll_interval: config.idle_poll_interval,
            idle_threshold: config.idle_threshold,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Sensor worker started");

        loop {
            if self.drain().await.is_break() {
                break;
            }

            if matches!(self.workflow, Workflow::Idle) {
                match self.requests.recv().await {
                    Some(request) => {
                        if self.handle(request).await.is_break() {
                            break;
                        }
                    }
                    None => break,
                }
                continue;
            }

            match self.step().await {
                Progress::Advanced => {}
                Progress::Finished => self.finish(),
                Progress::Waiting => {
                    let pause = self.pause();
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        request = self.requests.recv() => match request {
                            Some(request) => {
                                if self.handle(request).await.is_break() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            }
        }

        self.stop().await;
    }

    /// Handle every request already queued
    async fn drain(&mut self) -> ControlFlow<()> {
        loop {
            match self.requests.try_recv() {
                Ok(request) => self.handle(request).await?,
                Err(mpsc::error::TryRecvError::Empty) => return ControlFlow::Continue(()),
                Err(mpsc::error::TryRecvError::Disconnected) => return ControlFlow::Break(()),
            }
        }
    }

    async fn handle(&mut self, request: Request) -> ControlFlow<()> {
        match request {
            Request::StartEnroll { slot } => {
                if !matches!(self.workflow, Workflow::Idle) {
                    warn!(slot, "Enrollment requested while a workflow is active");
                    return ControlFlow::Continue(());
                }
                debug!(slot, "Starting enrollment");
                self.workflow = Workflow::Enroll(EnrollMachine::start(
                    slot,
                    self.max_retries,
                    &mut self.events,
                ));
            }
            Request::StartSearch { mode } => {
                if !matches!(self.workflow, Workflow::Idle) {
                    warn!(?mode, "Search requested while a workflow is active");
                    return ControlFlow::Continue(());
                }
                debug!(?mode, "Starting search");
                self.workflow = Workflow::Search(SearchCycle::new(mode, self.max_retries));
            }
            Request::CancelEnroll => match std::mem::replace(&mut self.workflow, Workflow::Idle) {
                Workflow::Enroll(machine) => {
                    let slot = machine.slot();
                    machine.cancel(&mut self.events);
                    self.session.finish(SessionState::Enrolling { slot });
                }
                other => {
                    debug!("No enrollment to cancel");
                    self.workflow = other;
                }
            },
            Request::CancelSearch => match std::mem::replace(&mut self.workflow, Workflow::Idle) {
                Workflow::Search(cycle) => {
                    cycle.cancel(&mut self.events);
                    self.session.finish(SessionState::Searching);
                }
                other => {
                    debug!("No search to cancel");
                    self.workflow = other;
                }
            },
            Request::Delete { target, reply } => {
                let result = self.delete(target).await;
                let _ = reply.send(result);
            }
            Request::TemplateCount { reply } => {
                let _ = reply.send(self.sensor.template_count().await);
            }
            Request::ReadIndexTable { page, reply } => {
                let _ = reply.send(self.sensor.read_index_table(page).await);
            }
            Request::FindFreeSlot { reply } => {
                let _ = reply.send(self.sensor.find_free_slot().await);
            }
            Request::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    async fn step(&mut self) -> Progress {
        match &mut self.workflow {
            Workflow::Enroll(machine) => machine.step(&mut self.sensor, &mut self.events).await,
            Workflow::Search(cycle) => cycle.step(&mut self.sensor, &mut self.events).await,
            Workflow::Idle => Progress::Finished,
        }
    }

    /// Release the session held by a workflow that ended on its own
    fn finish(&mut self) {
        let state = match std::mem::replace(&mut self.workflow, Workflow::Idle) {
            Workflow::Enroll(machine) => SessionState::Enrolling {
                slot: machine.slot(),
            },
            Workflow::Search(_) => SessionState::Searching,
            Workflow::Idle => return,
        };

        if !self.session.finish(state) {
            warn!(?state, "Session moved on before the workflow finished");
        }
    }

    fn pause(&self) -> Duration {
        match &self.workflow {
            Workflow::Search(cycle) if cycle.idle_polls() >= self.idle_threshold => {
                self.idle_poll_interval
            }
            _ => self.poll_interval,
        }
    }

    async fn delete(&mut self, target: DeleteTarget) -> Result<()> {
        let result = match target {
            DeleteTarget::Range { start, count } => self.sensor.delete_range(start, count).await,
            DeleteTarget::All => self.sensor.empty_library().await,
        };

        match &result {
            Ok(()) => self.events.emit(SensorEvent::DeleteOk { target }),
            Err(e) => {
                warn!(%target, error = %e, "Delete failed");
                self.events.emit(SensorEvent::DeleteFailed {
                    target,
                    reason: e.failure_reason(),
                });
            }
        }
        result
    }

    async fn stop(mut self) {
        match std::mem::replace(&mut self.workflow, Workflow::Idle) {
            Workflow::Enroll(machine) => machine.cancel(&mut self.events),
            Workflow::Search(cycle) => cycle.cancel(&mut self.events),
            Workflow::Idle => {}
        }
        self.session.reset();

        if let Err(e) = self.sensor.close().await {
            warn!(error = %e, "Failed to close sensor channel");
        }
        info!("Sensor worker stopped");
    }
}
