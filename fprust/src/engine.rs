//! Sensor engine and its request handle

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fprust_core::constants::{DEFAULT_LIBRARY_SIZE, INDEX_PAGE_SLOTS};
use fprust_core::{Session, SessionState};
use fprust_transport::Channel;
use fprust_types::{DeleteTarget, EventRecord, IndexTable, SystemParameters};

use crate::config::SensorConfig;
use crate::error::{Error, Result};
use crate::search::SearchMode;
use crate::sensor::Sensor;
use crate::worker::{EventPublisher, Request, Worker};

/// Running sensor engine
///
/// Owns the worker task. Everything else goes through an
/// [`EngineHandle`].
///
/// # Examples
///
/// ```no_run
/// use fprust::{Engine, SensorConfig, SerialChannel};
///
/// #[tokio::main]
/// async fn main() -> fprust::Result<()> {
///     let engine = Engine::start(SerialChannel::new("/dev/ttyUSB0"), SensorConfig::default()).await?;
///     let handle = engine.handle();
///     let mut events = handle.subscribe();
///
///     handle.start_enroll(3).await?;
///     while let Ok(record) = events.recv().await {
///         println!("{}", record);
///         if record.event.ends_enrollment() {
///             break;
///         }
///     }
///
///     engine.shutdown().await
/// }
/// ```
pub struct Engine {
    handle: EngineHandle,
    task: JoinHandle<()>,
}

impl Engine {
    /// Open `channel`, bring the sensor up, and spawn the worker
    ///
    /// Startup runs the handshake and password check, then reads the
    /// system parameters to learn the library size unless `config` fixes
    /// one. The channel is closed again if any required step fails.
    pub async fn start<C>(channel: C, config: SensorConfig) -> Result<Self>
    where
        C: Channel + 'static,
    {
        config.validate()?;

        let mut sensor = Sensor::new(Box::new(channel), &config);
        sensor.open().await?;

        let parameters = match Self::boot(&mut sensor, &config).await {
            Ok(parameters) => parameters,
            Err(e) => {
                warn!(error = %e, "Sensor startup failed");
                if let Err(close_err) = sensor.close().await {
                    warn!(error = %close_err, "Failed to close sensor channel");
                }
                return Err(e);
            }
        };

        let session = Session::new(sensor.capacity());
        let (requests_tx, requests_rx) = mpsc::channel(config.queue_capacity);
        let (events_tx, _) = broadcast::channel(config.event_capacity);

        let worker = Worker::new(
            sensor,
            session.clone(),
            requests_rx,
            EventPublisher::new(events_tx.clone()),
            &config,
        );
        let task = tokio::spawn(worker.run());

        info!(capacity = session.capacity(), "Sensor engine started");

        Ok(Self {
            handle: EngineHandle {
                requests: requests_tx,
                events: events_tx,
                session,
                submit_timeout: config.submit_timeout,
                parameters,
            },
            task,
        })
    }

    async fn boot(sensor: &mut Sensor, config: &SensorConfig) -> Result<Option<SystemParameters>> {
        tokio::time::sleep(config.boot_delay).await;

        sensor.handshake().await?;
        sensor.verify_password(config.password).await?;

        let parameters = match sensor.read_system_parameters().await {
            Ok(parameters) => {
                info!(%parameters, "System parameters read");
                Some(parameters)
            }
            Err(e) => {
                warn!(error = %e, "Could not read system parameters");
                None
            }
        };

        let capacity = config
            .capacity
            .or_else(|| parameters.map(|p| p.library_size))
            .filter(|&capacity| capacity > 0)
            .unwrap_or(DEFAULT_LIBRARY_SIZE);
        sensor.set_capacity(capacity);

        match sensor.template_count().await {
            Ok(count) => info!(count, capacity, "Template library"),
            Err(e) => warn!(error = %e, "Could not read template count"),
        }

        Ok(parameters)
    }

    /// Handle for submitting requests
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop the worker, cancelling any active workflow, and close the channel
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down sensor engine");

        // A closed queue means the worker is already gone
        let _ = self.handle.requests.send(Request::Shutdown).await;

        self.task.await.map_err(|e| {
            warn!(error = %e, "Sensor worker panicked");
            Error::WorkerStopped
        })
    }
}

/// Cloneable handle to a running [`Engine`]
///
/// Workflow requests are checked against the session synchronously, so an
/// invalid request fails here before anything reaches the sensor.
#[derive(Clone)]
pub struct EngineHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<EventRecord>,
    session: Session,
    submit_timeout: Duration,
    parameters: Option<SystemParameters>,
}

impl EngineHandle {
    /// Start enrolling a finger into `slot`
    ///
    /// # Errors
    ///
    /// Rejected when another workflow is active or `slot` is outside the
    /// library. Fails with [`Error::QueueFull`] when the worker does not
    /// accept the request within the submit timeout.
    pub async fn start_enroll(&self, slot: u16) -> Result<()> {
        self.session.begin_enroll(slot)?;

        if let Err(e) = self.submit(Request::StartEnroll { slot }).await {
            self.session.finish(SessionState::Enrolling { slot });
            return Err(e);
        }
        Ok(())
    }

    /// Cancel the active enrollment, if any
    pub async fn cancel_enroll(&self) -> Result<()> {
        self.submit(Request::CancelEnroll).await
    }

    /// Identify one finger
    pub async fn start_search(&self) -> Result<()> {
        self.start_search_with(SearchMode::Once).await
    }

    /// Start identification in `mode`
    pub async fn start_search_with(&self, mode: SearchMode) -> Result<()> {
        self.session.begin_search()?;

        if let Err(e) = self.submit(Request::StartSearch { mode }).await {
            self.session.finish(SessionState::Searching);
            return Err(e);
        }
        Ok(())
    }

    /// Cancel the active search, if any
    pub async fn cancel_search(&self) -> Result<()> {
        self.submit(Request::CancelSearch).await
    }

    /// Delete the template in `slot`
    pub async fn delete(&self, slot: u16) -> Result<()> {
        self.session.validate_slot(slot)?;
        self.delete_target(DeleteTarget::Range { start: slot, count: 1 })
            .await
    }

    /// Delete `count` templates starting at `start`
    pub async fn delete_range(&self, start: u16, count: u16) -> Result<()> {
        self.session.validate_range(start, count)?;
        self.delete_target(DeleteTarget::Range { start, count }).await
    }

    /// Clear the whole library
    pub async fn delete_all(&self) -> Result<()> {
        self.delete_target(DeleteTarget::All).await
    }

    async fn delete_target(&self, target: DeleteTarget) -> Result<()> {
        self.request(|reply| Request::Delete { target, reply }).await
    }

    /// Number of stored templates as reported by the sensor
    pub async fn template_count(&self) -> Result<u16> {
        self.request(|reply| Request::TemplateCount { reply }).await
    }

    /// Occupancy of library page `page`
    pub async fn read_index_table(&self, page: u8) -> Result<IndexTable> {
        let capacity = self.session.capacity();
        if u16::from(page) >= capacity.div_ceil(INDEX_PAGE_SLOTS) {
            return Err(fprust_core::Error::SlotOutOfRange {
                slot: u16::from(page).saturating_mul(INDEX_PAGE_SLOTS),
                capacity,
            }
            .into());
        }
        self.request(|reply| Request::ReadIndexTable { page, reply })
            .await
    }

    /// Lowest free slot according to the index table
    ///
    /// Purely informational: enrollment never picks a slot by itself.
    pub async fn find_free_slot(&self) -> Result<Option<u16>> {
        self.request(|reply| Request::FindFreeSlot { reply }).await
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    pub fn capacity(&self) -> u16 {
        self.session.capacity()
    }

    pub fn is_enrolling(&self) -> bool {
        self.session.is_enrolling()
    }

    pub fn is_searching(&self) -> bool {
        self.session.is_searching()
    }

    /// System parameters read at startup
    pub fn system_parameters(&self) -> Option<SystemParameters> {
        self.parameters
    }

    async fn submit(&self, request: Request) -> Result<()> {
        self.requests
            .send_timeout(request, self.submit_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => Error::QueueFull,
                mpsc::error::SendTimeoutError::Closed(_) => Error::WorkerStopped,
            })
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Request) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.submit(build(tx)).await?;
        rx.await.map_err(|_| Error::WorkerStopped)?
    }
}
