use crate::atc;
use crate::collector::registry::{MetricId, MetricRegistry, ble_humidity_id, ble_temperature_id};
use crate::error::{AirsenseError, Result};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One raw broadcast observed by the radio: the advertising device plus
/// its service-data payload, still undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub device: String,
    pub payload: Vec<u8>,
}

/// Trait for push-style advertisement feeds.
///
/// A subscription yields a channel of [`Advertisement`]s; the feed keeps
/// the sender side and drops it (or sees the receiver go away) when the
/// subscription ends.
pub trait AdvertisementSource: Send + 'static {
    fn subscribe(&mut self) -> impl Future<Output = Result<mpsc::Receiver<Advertisement>>> + Send;

    fn unsubscribe(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Metric identities owned by one beacon, minted when the device is first
/// seen and reused for every later broadcast.
#[derive(Debug, Clone)]
struct DeviceRecord {
    temperature: MetricId,
    humidity: MetricId,
}

/// Subscribes to a BLE advertisement feed and keeps per-device gauges
/// current in the registry.
///
/// All events are handled on one dispatch task, which is the sole writer
/// of the device map; the source must deliver events serially, which an
/// mpsc channel guarantees. The registry's own lock is the only
/// synchronization on the write path.
pub struct BleListener<S> {
    source: S,
    registry: MetricRegistry,
    running: Option<RunningTask>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl<S: AdvertisementSource> BleListener<S> {
    pub fn new(source: S, registry: MetricRegistry) -> Self {
        Self {
            source,
            registry,
            running: None,
        }
    }

    /// Begin the subscription and spawn the dispatch task. Calling this
    /// on an already-started listener is a misuse and fails.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(AirsenseError::ListenerAlreadyStarted);
        }

        let events = self.source.subscribe().await?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatch(events, self.registry.clone(), cancel.clone()));
        self.running = Some(RunningTask { cancel, handle });
        Ok(())
    }

    /// End the subscription. No event is processed after this returns;
    /// the listener may be started again afterwards.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.cancel.cancel();
        running.handle.await.ok();
        self.source.unsubscribe().await
    }
}

async fn dispatch(
    mut events: mpsc::Receiver<Advertisement>,
    registry: MetricRegistry,
    cancel: CancellationToken,
) {
    let mut devices: HashMap<String, DeviceRecord> = HashMap::new();

    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        // Most broadcasts on the air are not ours; drop them quietly
        let Some(reading) = atc::decode_service_data(&event.payload) else {
            continue;
        };

        tracing::debug!(
            "{}: temperature={} humidity={}",
            reading.mac,
            reading.temperature_c,
            reading.humidity
        );

        let record = devices.entry(reading.mac.clone()).or_insert_with(|| {
            tracing::info!("Discovered sensor {}", reading.mac);
            DeviceRecord {
                temperature: ble_temperature_id(&reading.mac),
                humidity: ble_humidity_id(&reading.mac),
            }
        });

        registry.upsert(record.temperature.clone(), reading.temperature_c);
        registry.upsert(record.humidity.clone(), reading.humidity);
    }
}
