//! Text exposition of a [`MetricsSnapshot`].
//!
//! A fresh registry is built for every render so nothing lingers between
//! scrapes. The prometheus encoder escapes `\`, `"` and newlines in label
//! values, which keeps user-controlled names and URLs on their own line.
//!
//! The encoder skips families without samples, so the per-service headers
//! are written by hand when there are no services.

use prometheus::{GaugeVec, IntGauge, Opts, Registry, TextEncoder};

use super::MetricsSnapshot;

/// Content type of the rendered text
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const SERVICE_UP: (&str, &str) = ("nimbus_service_up", "Whether the service answered its last probe (1 = online)");
const RESPONSE_TIME: (&str, &str) =
    ("nimbus_service_response_time_milliseconds", "Elapsed time of the last probe in milliseconds");

pub fn render(snapshot: &MetricsSnapshot) -> Result<String, prometheus::Error> {
    let registry = Registry::new();

    let up = GaugeVec::new(Opts::new(SERVICE_UP.0, SERVICE_UP.1), &["service_id", "name", "url", "status"])?;
    let response_time =
        GaugeVec::new(Opts::new(RESPONSE_TIME.0, RESPONSE_TIME.1), &["service_id", "name", "url"])?;
    let total = IntGauge::new("nimbus_total_services", "Number of monitored services")?;
    let online = IntGauge::new("nimbus_online_services", "Number of services currently online")?;

    registry.register(Box::new(up.clone()))?;
    registry.register(Box::new(response_time.clone()))?;
    registry.register(Box::new(total.clone()))?;
    registry.register(Box::new(online.clone()))?;

    for service in &snapshot.services {
        let id = service.service_id.to_string();
        up.with_label_values(&[id.as_str(), service.name.as_str(), service.url.as_str(), service.status.as_str()])
            .set(if service.online { 1.0 } else { 0.0 });
        response_time
            .with_label_values(&[id.as_str(), service.name.as_str(), service.url.as_str()])
            .set(service.response_time_ms as f64);
    }

    total.set(snapshot.total_services as i64);
    online.set(snapshot.online_services as i64);

    let mut text = String::new();
    if snapshot.services.is_empty() {
        for (name, help) in [SERVICE_UP, RESPONSE_TIME] {
            text.push_str(&format!("# HELP {name} {help}\n# TYPE {name} gauge\n"));
        }
    }
    text.push_str(&TextEncoder::new().encode_to_string(&registry.gather())?);
    Ok(text)
}
