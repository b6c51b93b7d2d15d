//! BlueZ-backed advertisement feed.
//!
//! Runs a passive LE discovery on the chosen adapter and watches the
//! service data BlueZ caches per device, forwarding Environmental
//! Sensing (0x181A) payloads as [`Advertisement`]s. BlueZ keeps the
//! latest broadcast per device, so the watcher re-emits whatever is
//! current on each pass; downstream upserts are idempotent.

use crate::collector::listener::{Advertisement, AdvertisementSource};
use crate::error::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zbus::Connection;
use zbus::fdo::ObjectManagerProxy;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

pub const ENVIRONMENTAL_SENSING_UUID: &str = "0000181a-0000-1000-8000-00805f9b34fb";

const BLUEZ_SERVICE: &str = "org.bluez";
const DEVICE_INTERFACE: &str = "org.bluez.Device1";
const POLL_PERIOD: Duration = Duration::from_millis(500);
const EVENT_QUEUE_DEPTH: usize = 64;

#[zbus::proxy(interface = "org.bluez.Adapter1", default_service = "org.bluez")]
trait Adapter1 {
    fn start_discovery(&self) -> zbus::Result<()>;

    fn stop_discovery(&self) -> zbus::Result<()>;

    fn set_discovery_filter(&self, filter: HashMap<&str, Value<'_>>) -> zbus::Result<()>;
}

#[zbus::proxy(interface = "org.bluez.Device1", default_service = "org.bluez")]
trait Device1 {
    #[zbus(property)]
    fn address(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn service_data(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

pub struct BlueZScanner {
    connection: Connection,
    adapter_path: String,
    cancel: Option<CancellationToken>,
}

impl BlueZScanner {
    /// Connect to the system bus for the given adapter (e.g. `hci0`).
    pub async fn new(adapter: &str) -> Result<Self> {
        let connection = Connection::system().await?;
        Ok(Self {
            connection,
            adapter_path: format!("/org/bluez/{adapter}"),
            cancel: None,
        })
    }

    async fn adapter(&self) -> Result<Adapter1Proxy<'_>> {
        Ok(Adapter1Proxy::builder(&self.connection)
            .path(self.adapter_path.as_str())?
            .build()
            .await?)
    }
}

impl AdvertisementSource for BlueZScanner {
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Advertisement>> {
        let adapter = self.adapter().await?;

        let mut filter: HashMap<&str, Value<'_>> = HashMap::new();
        filter.insert("Transport", Value::from("le"));
        filter.insert("DuplicateData", Value::from(true));
        adapter.set_discovery_filter(filter).await?;
        adapter.start_discovery().await?;

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let connection = self.connection.clone();
        tokio::spawn(async move {
            if let Err(e) = watch_devices(connection, tx, cancel).await {
                tracing::warn!("BLE watcher stopped: {}", e);
            }
        });

        Ok(rx)
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.adapter().await?.stop_discovery().await?;
        Ok(())
    }
}

async fn watch_devices(
    connection: Connection,
    tx: mpsc::Sender<Advertisement>,
    cancel: CancellationToken,
) -> Result<()> {
    let objects = ObjectManagerProxy::builder(&connection)
        .destination(BLUEZ_SERVICE)?
        .path("/")?
        .build()
        .await?;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(POLL_PERIOD) => {}
            _ = cancel.cancelled() => return Ok(()),
        }

        let managed = match objects.get_managed_objects().await {
            Ok(managed) => managed,
            Err(e) => {
                tracing::warn!("GetManagedObjects failed: {}", e);
                continue;
            }
        };

        for (path, interfaces) in &managed {
            if !interfaces.keys().any(|i| i.as_str() == DEVICE_INTERFACE) {
                continue;
            }
            let Some(event) = read_device(&connection, path).await else {
                continue;
            };
            if tx.send(event).await.is_err() {
                // Receiver gone, the subscription is over
                return Ok(());
            }
        }
    }
}

async fn read_device(connection: &Connection, path: &OwnedObjectPath) -> Option<Advertisement> {
    let device = Device1Proxy::builder(connection)
        .path(path.as_str())
        .ok()?
        .build()
        .await
        .ok()?;

    // Devices without service data answer with an error; not ours then
    let service_data = device.service_data().await.ok()?;
    let payload = service_data
        .iter()
        .find(|(uuid, _)| uuid.eq_ignore_ascii_case(ENVIRONMENTAL_SENSING_UUID))
        .and_then(|(_, value)| byte_array(value))?;
    let address = device.address().await.ok()?;

    Some(Advertisement {
        device: address,
        payload,
    })
}

fn byte_array(value: &OwnedValue) -> Option<Vec<u8>> {
    let Value::Array(array) = &**value else {
        return None;
    };
    let mut bytes = Vec::with_capacity(array.len());
    for item in array.iter() {
        let Value::U8(b) = item else {
            return None;
        };
        bytes.push(*b);
    }
    Some(bytes)
}
