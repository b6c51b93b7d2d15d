use crate::collector::registry::{MetricRegistry, co2_metric_id, temperature_metric_id};
use crate::sensor::Co2Sensor;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drives a CO2 sensor on a fixed interval, publishing each good sample
/// into the registry and riding out individual read failures.
///
/// The sleep happens after each read attempt, so the effective period is
/// `interval` plus the read latency. That drift is intentional: the
/// scrape side only ever wants the latest value, not a fixed-rate series.
pub struct Poller<S> {
    sensor: S,
    registry: MetricRegistry,
    interval: Duration,
    cancel: CancellationToken,
}

impl<S: Co2Sensor> Poller<S> {
    pub fn new(
        sensor: S,
        registry: MetricRegistry,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sensor,
            registry,
            interval,
            cancel,
        }
    }

    pub async fn run(mut self) {
        loop {
            match self.sensor.read_sample().await {
                Ok(sample) => {
                    tracing::debug!(
                        "CO2 {} ppm, temperature {:.1} C",
                        sample.co2_ppm,
                        sample.temperature_c
                    );
                    self.registry.upsert(co2_metric_id(), sample.co2_ppm);
                    self.registry
                        .upsert(temperature_metric_id(), sample.temperature_c);
                }
                Err(e) => {
                    tracing::warn!("CO2 sensor read failed: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => {
                    tracing::info!("Poller stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::registry::{GaugeValue, Sample};
    use crate::error::{AirsenseError, Result};
    use crate::sensor::Co2Sample;
    use std::collections::VecDeque;

    /// Sensor that replays a script of results, then cancels the poller.
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

    fn values(registry: &MetricRegistry) -> Vec<(String, GaugeValue)> {
        registry
            .snapshot()
            .iter()
            .map(|s: &Sample| (s.id.rendered_name(), s.value))
            .collect()
    }

    #[tokio::test]
    async fn retains_last_good_sample_through_failures() {
        let cancel = CancellationToken::new();
        let sensor = ScriptedSensor {
            script: VecDeque::from([
                Err(AirsenseError::SensorTimeout),
                Ok(Co2Sample {
                    co2_ppm: 600,
                    temperature_c: 21.0,
                }),
                Err(AirsenseError::ChecksumMismatch),
            ]),
            cancel: cancel.clone(),
        };

        let registry = MetricRegistry::new();
        registry.register(co2_metric_id());
        registry.register(temperature_metric_id());

        Poller::new(sensor, registry.clone(), Duration::from_millis(1), cancel)
            .run()
            .await;

        assert_eq!(
            values(&registry),
            vec![
                (
                    "co2meter_co2_current".to_string(),
                    GaugeValue::Integer(600)
                ),
                (
                    "co2meter_temperature_current".to_string(),
                    GaugeValue::Float(21.0)
                ),
            ]
        );
    }

    #[tokio::test]
    async fn failures_alone_leave_gauges_absent() {
        let cancel = CancellationToken::new();
        let sensor = ScriptedSensor {
            script: VecDeque::from([
                Err(AirsenseError::SensorTimeout),
                Err(AirsenseError::SensorGone),
            ]),
            cancel: cancel.clone(),
        };

        let registry = MetricRegistry::new();
        registry.register(co2_metric_id());
        registry.register(temperature_metric_id());

        Poller::new(sensor, registry.clone(), Duration::from_millis(1), cancel)
            .run()
            .await;

        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.len(), 2);
    }
}
