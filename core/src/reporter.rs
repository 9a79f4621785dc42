//! Tails the trouble stream and renders human-readable report lines.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::event::TroubleEvent;
use crate::names;
use crate::records::PackageAttributes;
use crate::store::{ensure_stream, ensure_table, EventStream, KvTable, StreamBus};

/// Render simulated epoch seconds as `%m-%d %H:%M`.
pub fn short_time(secs: i64) -> String {
    match chrono::DateTime::from_timestamp(secs, 0) {
        Some(timestamp) => timestamp.format("%m-%d %H:%M").to_string(),
        None => secs.to_string(),
    }
}

/// One report line: the trouble event joined with the package's attributes.
///
/// Attributes a center never recorded (a package lost before weighing has no
/// weight) render as `?`.
pub fn format_line(event: &TroubleEvent, attributes: &PackageAttributes) -> String {
    let number = |value: Option<i64>| value.map_or_else(|| "?".to_string(), |v| v.to_string());
    let center = |value: Option<crate::event::Center>| {
        value.map_or_else(|| "?".to_string(), |c| c.to_string())
    };
    let estimated = attributes
        .estimated_delivery_time
        .map_or_else(|| "?".to_string(), short_time);
    let package_info = format!(
        "pkg {:<5.5} weight {:<2.2} value ${} origin {} dest {} est.del {}",
        event.package_id(),
        number(attributes.weight),
        number(attributes.declared_value),
        center(attributes.origin),
        center(attributes.destination),
        estimated,
    );
    let at_time = short_time(event.event_time());

    match event {
        TroubleEvent::LateDelivery { .. } => format!("at {at_time} late  {package_info}"),
        TroubleEvent::LostPackage { .. } => format!("at {at_time} LOST  {package_info}"),
        TroubleEvent::DelayedPackage {
            next_scanner_id, ..
        } => format!(
            "at {at_time} delay {package_info} before {}",
            next_scanner_id.as_deref().unwrap_or("?")
        ),
    }
}

/// Consumes the trouble stream, joining each event with the shared
/// attribute table and logging one line per event.
pub struct TroubleReporter {
    bus: Arc<dyn StreamBus>,
    kv: Arc<dyn KvTable>,
    scope: String,
    read_timeout: Duration,
}

impl TroubleReporter {
    pub fn new(
        bus: Arc<dyn StreamBus>,
        kv: Arc<dyn KvTable>,
        scope: &str,
        read_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            kv,
            scope: scope.to_string(),
            read_timeout,
        }
    }

    /// Tail the stream until it drains; returns the formatted lines in
    /// arrival order.
    pub async fn run(&self, wait_for_events: bool) -> Result<Vec<String>> {
        ensure_stream(self.bus.as_ref(), &self.scope, names::TROUBLE_STREAM).await?;
        ensure_table(self.kv.as_ref(), &self.scope, names::PACKAGE_ATTRIBUTES_TABLE).await?;

        tracing::debug!("begin reading from stream {:?}", names::TROUBLE_STREAM);
        let mut stream = EventStream::open(
            self.bus.as_ref(),
            &self.scope,
            names::TROUBLE_STREAM,
            self.read_timeout,
            wait_for_events,
        )
        .await?;

        let mut lines = Vec::new();
        while let Some(payload) = stream.next_event().await? {
            let event: TroubleEvent = serde_json::from_slice(&payload).with_context(|| {
                format!(
                    "malformed trouble event: {}",
                    String::from_utf8_lossy(&payload)
                )
            })?;
            let attributes = match self
                .kv
                .get(&self.scope, names::PACKAGE_ATTRIBUTES_TABLE, event.package_id())
                .await?
            {
                Some(bytes) => serde_json::from_slice(&bytes)
                    .context("malformed package-attributes record")?,
                None => PackageAttributes::default(),
            };
            let line = format_line(&event, &attributes);
            tracing::info!("{}", line);
            lines.push(line);
        }
        Ok(lines)
    }
}
