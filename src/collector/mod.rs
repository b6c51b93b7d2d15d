pub mod listener;
pub mod poller;
pub mod registry;
pub mod server;

pub use listener::{Advertisement, AdvertisementSource, BleListener};
pub use poller::Poller;
pub use registry::{GaugeValue, MetricId, MetricKind, MetricRegistry, Sample};
pub use server::TelemetryServer;
