use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Semaphore,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::config::{Network, PingerConfig};
use crate::correlation::{CorrelationKey, CorrelationTable, Resolution, SequenceCounters};
use crate::error::{ProbeError, Result};
use crate::observer::{ReplyHandler, Reporter};
use crate::packet::encode_echo_request;
use crate::probe::{resolve, Endpoint, Outcome};
use crate::receiver::Listener;
use crate::socket::IcmpSocket;

/// Periodically pings a fixed set of endpoints over one raw ICMP socket.
///
/// Every endpoint owns the echo identifier given by its position in the
/// configured list, and replies are matched back to their request by
/// identifier and sequence number. Outcomes go to the registered
/// [`ReplyHandler`]s.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use async_pinger::{LogHandler, Pinger, PingerConfigBuilder, ReplyHandler};
///
/// tokio_test::block_on(async {
///     let config = PingerConfigBuilder::new()
///         .with_endpoints(["127.0.0.1", "192.0.2.1"])
///         .build()
///         .unwrap();
///     let handlers = vec![Arc::new(LogHandler) as Arc<dyn ReplyHandler>];
///     let pinger = Pinger::new(config, handlers).unwrap();
///     pinger.run().await;
/// })
/// ```
#[derive(Debug)]
pub struct Pinger {
    inner: Arc<Inner>,
    timeout: Duration,
    interval: Duration,
    _task_spawner: BackgroundTaskSpawner,
}

#[derive(Debug)]
struct Inner {
    network: Network,
    endpoints: Vec<Endpoint>,
    socket: Arc<IcmpSocket>,
    table: Arc<CorrelationTable>,
    sequences: SequenceCounters,
    reporter: Reporter,
    limiter: Option<Arc<Semaphore>>,
}

impl Pinger {
    /// Opens the socket and starts the receive loop.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if there are more endpoints than identifiers, the bind
    /// address is not an address of the configured family, or the raw socket
    /// cannot be created or bound (which usually needs elevated privileges).
    pub fn new(config: PingerConfig, handlers: Vec<Arc<dyn ReplyHandler>>) -> Result<Self> {
        let endpoints = Endpoint::from_list(&config.endpoints)?;
        let token = CancellationToken::new();
        let socket = Arc::new(IcmpSocket::bind(
            config.network,
            &config.bind_address,
            token.clone(),
        )?);
        let table = Arc::new(CorrelationTable::new());

        let mut task_spawner = BackgroundTaskSpawner::new(token);
        task_spawner.spawn(Listener::new(
            Arc::clone(&socket),
            Arc::clone(&table),
            config.network,
        ));

        log::info!(
            "pinger on {} ready for {} endpoints",
            config.network,
            endpoints.len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                network: config.network,
                endpoints,
                socket,
                table,
                sequences: SequenceCounters::new(),
                reporter: Reporter::new(handlers),
                limiter: config.max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
            }),
            timeout: config.timeout,
            interval: config.interval,
            _task_spawner: task_spawner,
        })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.inner.endpoints
    }

    /// [`Pinger::start`] with the configured timeout and interval.
    pub async fn run(&self) {
        self.start(self.timeout, self.interval).await
    }

    /// Pings every endpoint once per `interval`, forever.
    ///
    /// The first round goes out one interval after the call. Rounds never
    /// wait for earlier ones, so with `interval < timeout` several requests to
    /// the same endpoint are in flight at once.
    pub async fn start(&self, timeout: Duration, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        loop {
            ticker.tick().await;
            self.spawn_round(timeout);
        }
    }

    /// Runs a single round and returns its outcomes once every probe finished.
    ///
    /// Handlers are notified exactly as for scheduled rounds.
    pub async fn ping_once(&self, timeout: Duration) -> Vec<Outcome> {
        futures::future::join_all(self.spawn_round(timeout))
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    log::warn!("probe task ended without an outcome: {}", err);
                    None
                }
            })
            .collect()
    }

    /// Releases the socket: later sends fail and the receive loop stops.
    ///
    /// The descriptor is closed as soon as the receive loop has observed the
    /// cancellation. Probes already waiting still end by their own deadline.
    pub fn close(&self) {
        self.inner.socket.close();
    }

    fn spawn_round(&self, timeout: Duration) -> Vec<JoinHandle<Outcome>> {
        self.inner
            .endpoints
            .iter()
            .map(|endpoint| {
                let inner = Arc::clone(&self.inner);
                let endpoint = endpoint.clone();
                tokio::spawn(async move { inner.probe_and_report(&endpoint, timeout).await })
            })
            .collect()
    }
}

impl Inner {
    async fn probe_and_report(&self, endpoint: &Endpoint, timeout: Duration) -> Outcome {
        let _permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };
        let outcome = self.probe(endpoint, timeout).await;
        self.reporter.report(&outcome);
        outcome
    }

    /// One echo attempt. The reported round trip time runs from before the
    /// sequence number is taken, so it includes address resolution.
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Outcome {
        let started = Instant::now();
        let deadline = started + timeout;
        let sequence = self.sequences.next(endpoint.identifier).await;
        let key = CorrelationKey::new(endpoint.identifier, sequence);
        let failed = |cause: ProbeError| Outcome::Failed {
            endpoint: endpoint.address.clone(),
            cause,
        };

        let destination = match resolve(&endpoint.address, self.network).await {
            Ok(destination) => destination,
            Err(cause) => return failed(cause),
        };
        let request = match encode_echo_request(key.identifier, key.sequence, self.network) {
            Ok(request) => request,
            Err(err) => return failed(err.into()),
        };

        // Registered before sending, a fast reply must find its entry.
        let pending = self.table.register(key).await;
        log::debug!(
            "echo request {}/{} to {} ({})",
            key.identifier,
            key.sequence,
            endpoint.address,
            destination
        );
        if let Err(err) = self.socket.send_to(&request, destination).await {
            self.table.remove(&key).await;
            return failed(ProbeError::Write(err));
        }

        let resolution = pending.wait_until(deadline).await;
        let round_trip_time = started.elapsed();
        self.table.remove(&key).await;

        match resolution {
            Resolution::Replied => Outcome::Succeeded {
                endpoint: endpoint.address.clone(),
                round_trip_time,
                identifier: endpoint.identifier,
            },
            Resolution::Rejected(cause) => failed(cause),
            Resolution::TimedOut => Outcome::TimedOut {
                endpoint: endpoint.address.clone(),
                identifier: endpoint.identifier,
            },
        }
    }
}

#[derive(Debug)]
struct BackgroundTaskSpawner {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTaskSpawner {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            handle: None,
        }
    }

    fn spawn(&mut self, mut listener: Listener) {
        let token = self.token.clone();
        let handle = tokio::task::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::debug!("receive loop cancelled");
                },
                result = listener.listen() => {
                    if let Err(err) = result {
                        log::warn!("receive loop stopped, replies are no longer matched: {}", err);
                    }
                }
            }
        });
        self.handle = Some(handle);
    }
}

impl Drop for BackgroundTaskSpawner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}
