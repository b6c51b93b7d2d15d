use airsense_rs::collector::registry::{co2_metric_id, temperature_metric_id};
use airsense_rs::collector::server::render_telemetry;
use airsense_rs::collector::{Advertisement, AdvertisementSource, BleListener, MetricRegistry, Poller};
use airsense_rs::error::{AirsenseError, Result};
use airsense_rs::{Co2Sample, Co2Sensor};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct ScriptedSensor {
    script: VecDeque<Result<Co2Sample>>,
    cancel: CancellationToken,
}

impl Co2Sensor for ScriptedSensor {
    async fn read_sample(&mut self) -> Result<Co2Sample> {
        match self.script.pop_front() {
            Some(result) => result,
            None => {
                self.cancel.cancel();
                Err(AirsenseError::SensorTimeout)
            }
        }
    }
}

struct ChannelSource {
    receiver: Option<mpsc::Receiver<Advertisement>>,
}

impl AdvertisementSource for ChannelSource {
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Advertisement>> {
        self.receiver.take().ok_or(AirsenseError::SensorGone)
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        Ok(())
    }
}

fn beacon(mac: [u8; 6], temperature_c: f64, humidity: u8) -> Advertisement {
    let raw_temp = (temperature_c * 10.0).round() as i16;
    let mut payload = Vec::new();
    payload.extend_from_slice(&mac);
    payload.extend_from_slice(&raw_temp.to_be_bytes());
    payload.push(humidity);
    payload.push(95);
    payload.extend_from_slice(&3100u16.to_be_bytes());
    payload.push(1);
    Advertisement {
        device: "ignored".to_string(),
        payload,
    }
}

#[tokio::test]
async fn both_sources_feed_one_scrapeable_registry() {
    let registry = MetricRegistry::new();
    registry.register(co2_metric_id());
    registry.register(temperature_metric_id());

    // CO2 path: one failure, one good sample, then the script runs dry
    // and shuts the poller down.
    let cancel = CancellationToken::new();
    let sensor = ScriptedSensor {
        script: VecDeque::from([
            Err(AirsenseError::SensorTimeout),
            Ok(Co2Sample {
                co2_ppm: 600,
                temperature_c: 21.0,
            }),
        ]),
        cancel: cancel.clone(),
    };
    let poller = Poller::new(sensor, registry.clone(), Duration::from_millis(1), cancel);

    // BLE path: one beacon seen twice, closing the feed ends dispatch.
    let (tx, rx) = mpsc::channel(16);
    let mut listener = BleListener::new(ChannelSource { receiver: Some(rx) }, registry.clone());
    listener.start().await.unwrap();

    tx.send(beacon([0xA4, 0xC1, 0x38, 0xAA, 0xBB, 0xCC], 19.5, 48))
        .await
        .unwrap();
    tx.send(beacon([0xA4, 0xC1, 0x38, 0xAA, 0xBB, 0xCC], 19.7, 47))
        .await
        .unwrap();
    drop(tx);

    poller.run().await;

    // The dispatch task drains the closed feed on its own; wait for the
    // BLE entries to land before asserting the full scrape.
    for _ in 0..1000 {
        if registry.snapshot().len() == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    listener.stop().await.unwrap();

    assert_eq!(
        render_telemetry(&registry.snapshot()),
        "#TYPE co2meter_co2_current gauge\n\
         co2meter_co2_current 600\n\
         #TYPE co2meter_temperature_current gauge\n\
         co2meter_temperature_current 21.0\n\
         #TYPE ble_temperature{deviceID=\"A4:C1:38:AA:BB:CC\"} gauge\n\
         ble_temperature{deviceID=\"A4:C1:38:AA:BB:CC\"} 19.7\n\
         #TYPE ble_humidity{deviceID=\"A4:C1:38:AA:BB:CC\"} gauge\n\
         ble_humidity{deviceID=\"A4:C1:38:AA:BB:CC\"} 47"
    );
}
