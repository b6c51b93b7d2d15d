use crate::collector::registry::{MetricRegistry, Sample};
use axum::{Router, http::header, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TelemetryServer {
    registry: MetricRegistry,
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl TelemetryServer {
    pub fn new(registry: MetricRegistry, addr: SocketAddr, cancel: CancellationToken) -> Self {
        Self {
            registry,
            addr,
            cancel,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = Router::new().route(
            "/telemetry",
            get(move || {
                let registry = self.registry.clone();
                async move { telemetry_handler(registry).await }
            }),
        );

        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("Telemetry server listening on http://{}/telemetry", self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await?;

        tracing::info!("Telemetry server stopped");
        Ok(())
    }
}

// Scrapes serve the pollers' cached values only; a request never blocks
// on sensor I/O.
async fn telemetry_handler(registry: MetricRegistry) -> impl IntoResponse {
    let body = render_telemetry(&registry.snapshot());

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

/// Render a snapshot to the wire format: a `#TYPE` declaration line and a
/// value line per metric, in registry order.
pub fn render_telemetry(samples: &[Sample]) -> String {
    let mut lines = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let name = sample.id.rendered_name();
        lines.push(format!("#TYPE {} {}", name, sample.kind.as_str()));
        lines.push(format!("{} {}", name, sample.value));
    }
    lines.join("\n")
}
