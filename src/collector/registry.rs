use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub const CO2_METRIC: &str = "co2meter_co2_current";
pub const TEMPERATURE_METRIC: &str = "co2meter_temperature_current";
pub const BLE_TEMPERATURE_METRIC: &str = "ble_temperature";
pub const BLE_HUMIDITY_METRIC: &str = "ble_humidity";
pub const DEVICE_ID_LABEL: &str = "deviceID";

/// Stable identity of one exported time series: a metric name plus an
/// optional label set. Labels stay structured here and are only
/// concatenated into the wire name at render time.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct MetricId {
    name: &'static str,
    labels: Vec<(String, String)>,
}

impl MetricId {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            labels: Vec::new(),
        }
    }

    pub fn with_label(name: &'static str, key: &str, value: &str) -> Self {
        Self {
            name,
            labels: vec![(key.to_string(), value.to_string())],
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    /// Wire name: `name` or `name{key="value",...}`.
    pub fn rendered_name(&self) -> String {
        if self.labels.is_empty() {
            return self.name.to_string();
        }
        let labels = self
            .labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{{{}}}", self.name, labels)
    }
}

pub fn co2_metric_id() -> MetricId {
    MetricId::new(CO2_METRIC)
}

pub fn temperature_metric_id() -> MetricId {
    MetricId::new(TEMPERATURE_METRIC)
}

pub fn ble_temperature_id(device: &str) -> MetricId {
    MetricId::with_label(BLE_TEMPERATURE_METRIC, DEVICE_ID_LABEL, device)
}

pub fn ble_humidity_id(device: &str) -> MetricId {
    MetricId::with_label(BLE_HUMIDITY_METRIC, DEVICE_ID_LABEL, device)
}

/// Gauge sample value. Integer-sourced samples render without a decimal
/// point (`600`), float-sourced samples always carry one (`21.0`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GaugeValue {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for GaugeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            GaugeValue::Integer(v) => write!(f, "{v}"),
            GaugeValue::Float(v) if v.is_finite() && v.fract() == 0.0 => {
                write!(f, "{v:.1}")
            }
            GaugeValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for GaugeValue {
    fn from(v: i64) -> Self {
        GaugeValue::Integer(v)
    }
}

impl From<u16> for GaugeValue {
    fn from(v: u16) -> Self {
        GaugeValue::Integer(i64::from(v))
    }
}

impl From<u8> for GaugeValue {
    fn from(v: u8) -> Self {
        GaugeValue::Integer(i64::from(v))
    }
}

impl From<f64> for GaugeValue {
    fn from(v: f64) -> Self {
        GaugeValue::Float(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone)]
struct Metric {
    id: MetricId,
    kind: MetricKind,
    value: Option<GaugeValue>,
}

/// One entry of a registry snapshot. Entries that have never received a
/// value do not appear in snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: MetricId,
    pub kind: MetricKind,
    pub value: GaugeValue,
}

/// Concurrency-safe store of the latest value per metric identity,
/// preserving first-insertion order for stable scrape output.
///
/// Handles are cheap clones sharing one map; producers call [`upsert`]
/// from any task while the exporter takes [`snapshot`]s. Each entry is
/// inserted together with its value under the write lock, so readers can
/// never observe a half-written entry.
///
/// [`upsert`]: MetricRegistry::upsert
/// [`snapshot`]: MetricRegistry::snapshot
#[derive(Clone, Default)]
pub struct MetricRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<Metric>,
    index: HashMap<MetricId, usize>,
}

impl RegistryInner {
    fn upsert(&mut self, id: MetricId, value: Option<GaugeValue>) {
        if let Some(&i) = self.index.get(&id) {
            // Re-registration of a live entry keeps its value
            if value.is_some() {
                self.entries[i].value = value;
            }
        } else {
            self.index.insert(id.clone(), self.entries.len());
            self.entries.push(Metric {
                id,
                kind: MetricKind::Gauge,
                value,
            });
        }
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a spot in the output ordering for `id` without giving it a
    /// value. The entry stays out of snapshots until the first `upsert`.
    pub fn register(&self, id: MetricId) {
        self.inner.write().unwrap().upsert(id, None);
    }

    /// Set the latest value for `id`, inserting it at the end of the
    /// stable ordering on first sight.
    pub fn upsert(&self, id: MetricId, value: impl Into<GaugeValue>) {
        self.inner.write().unwrap().upsert(id, Some(value.into()));
    }

    /// Consistent copy of all valued entries, in first-insertion order.
    /// Safe to iterate while producers keep upserting; cross-metric
    /// atomicity is not promised, each gauge is independently fresh.
    pub fn snapshot(&self) -> Vec<Sample> {
        let inner = self.inner.read().unwrap();
        inner
            .entries
            .iter()
            .filter_map(|m| {
                m.value.map(|value| Sample {
                    id: m.id.clone(),
                    kind: m.kind,
                    value,
                })
            })
            .collect()
    }

    /// Number of entries, including registered-but-absent ones.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
