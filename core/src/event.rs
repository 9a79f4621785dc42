use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::names;

/// Errors raised while decoding wire-form scan events.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("unknown sorting center {0:?}")]
    UnknownCenter(String),
    #[error("unknown scanner id {0:?}")]
    UnknownScanner(String),
    #[error("{scanner} event for package {package_id} is missing {field}")]
    MissingField {
        scanner: ScannerId,
        package_id: String,
        field: &'static str,
    },
    #[error("next_scanner_id and next_event_time must be present together")]
    PartialNextHop,
}

/// One of the four sorting centers in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Center {
    A,
    B,
    C,
    D,
}

impl Center {
    pub const ALL: [Center; 4] = [Center::A, Center::B, Center::C, Center::D];

    pub fn code(self) -> &'static str {
        match self {
            Center::A => "A",
            Center::B => "B",
            Center::C => "C",
            Center::D => "D",
        }
    }
}

impl fmt::Display for Center {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Center {
    type Err = EventDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Center::A),
            "B" => Ok(Center::B),
            "C" => Ok(Center::C),
            "D" => Ok(Center::D),
            other => Err(EventDecodeError::UnknownCenter(other.to_string())),
        }
    }
}

/// Identifies the scanner that produced an event.
///
/// `end-of-stream` is a sentinel injected by the importer after the last
/// real scan; it flows through the pipeline but never touches shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerId {
    Intake,
    Weighing,
    PreRouting,
    Routing,
    Holding,
    HoldingAt(Center),
    Receiving,
    Output,
    EndOfStream,
}

impl ScannerId {
    /// Scanners whose events surface in customer-visible tracking.
    pub fn is_public(self) -> bool {
        matches!(
            self,
            ScannerId::Intake | ScannerId::HoldingAt(_) | ScannerId::Receiving | ScannerId::Output
        )
    }
}

impl fmt::Display for ScannerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerId::Intake => f.write_str("intake"),
            ScannerId::Weighing => f.write_str("weighing"),
            ScannerId::PreRouting => f.write_str("pre-routing"),
            ScannerId::Routing => f.write_str("routing"),
            ScannerId::Holding => f.write_str("holding"),
            ScannerId::HoldingAt(center) => write!(f, "holding_{}", center.code()),
            ScannerId::Receiving => f.write_str("receiving"),
            ScannerId::Output => f.write_str("output"),
            ScannerId::EndOfStream => f.write_str("end-of-stream"),
        }
    }
}

impl FromStr for ScannerId {
    type Err = EventDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(ScannerId::Intake),
            "weighing" => Ok(ScannerId::Weighing),
            "pre-routing" => Ok(ScannerId::PreRouting),
            "routing" => Ok(ScannerId::Routing),
            "holding" => Ok(ScannerId::Holding),
            "receiving" => Ok(ScannerId::Receiving),
            "output" => Ok(ScannerId::Output),
            "end-of-stream" => Ok(ScannerId::EndOfStream),
            other => match other.strip_prefix("holding_") {
                Some(code) => code
                    .parse()
                    .map(ScannerId::HoldingAt)
                    .map_err(|_| EventDecodeError::UnknownScanner(other.to_string())),
                None => Err(EventDecodeError::UnknownScanner(other.to_string())),
            },
        }
    }
}

impl Serialize for ScannerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScannerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The scan a package is expected to produce next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    pub scanner: ScannerId,
    pub expected_at: i64,
}

/// What a scan event carries beyond its common header, keyed by the kind of
/// scanner that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    /// First scan of a package entering the network at its origin center.
    Intake {
        next: NextHop,
        destination: Center,
        declared_value: i64,
        estimated_delivery_time: i64,
    },
    Weighing {
        next: NextHop,
        weight: i64,
    },
    /// An intermediate scan inside one center.
    Transit {
        scanner: ScannerId,
        next: Option<NextHop>,
    },
    /// The package is leaving on a truck for another center; the next scan
    /// happens at `next_center`.
    Handoff {
        scanner: ScannerId,
        next_center: Center,
        next: NextHop,
    },
    /// Final scan; the package has been delivered.
    Output,
    /// Importer sentinel marking the end of a center's input.
    EndOfStream,
}

/// A single barcode-scanner observation.
///
/// The wire form is a flat JSON object with optional fields omitted when
/// absent; see [`WireScan`] for the exact layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireScan", into = "WireScan")]
pub struct ScanEvent {
    pub event_time: i64,
    pub sorting_center: Center,
    pub package_id: String,
    pub kind: ScanKind,
}

impl ScanEvent {
    pub fn end_of_stream(center: Center, event_time: i64) -> Self {
        Self {
            event_time,
            sorting_center: center,
            package_id: names::END_OF_STREAM_PACKAGE_ID.to_string(),
            kind: ScanKind::EndOfStream,
        }
    }

    pub fn scanner(&self) -> ScannerId {
        match &self.kind {
            ScanKind::Intake { .. } => ScannerId::Intake,
            ScanKind::Weighing { .. } => ScannerId::Weighing,
            ScanKind::Transit { scanner, .. } | ScanKind::Handoff { scanner, .. } => *scanner,
            ScanKind::Output => ScannerId::Output,
            ScanKind::EndOfStream => ScannerId::EndOfStream,
        }
    }

    pub fn next(&self) -> Option<NextHop> {
        match &self.kind {
            ScanKind::Intake { next, .. }
            | ScanKind::Weighing { next, .. }
            | ScanKind::Handoff { next, .. } => Some(*next),
            ScanKind::Transit { next, .. } => *next,
            ScanKind::Output | ScanKind::EndOfStream => None,
        }
    }

    /// The center where the next scan will occur, when it differs from the
    /// current one.
    pub fn next_center(&self) -> Option<Center> {
        match &self.kind {
            ScanKind::Handoff { next_center, .. } => Some(*next_center),
            _ => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.kind, ScanKind::EndOfStream)
    }

    /// Push this event and its expected next scan forward in time.
    pub fn shift(&mut self, offset: i64) {
        if offset == 0 {
            return;
        }
        self.event_time += offset;
        match &mut self.kind {
            ScanKind::Intake { next, .. }
            | ScanKind::Weighing { next, .. }
            | ScanKind::Handoff { next, .. }
            | ScanKind::Transit {
                next: Some(next), ..
            } => next.expected_at += offset,
            _ => {}
        }
    }
}

/// Flat JSON layout shared with the simulator output and the import files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireScan {
    pub event_time: i64,
    pub sorting_center: Center,
    pub package_id: String,
    pub scanner_id: ScannerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scanner_id: Option<ScannerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_event_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_sorting_center: Option<Center>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Center>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
}

impl TryFrom<WireScan> for ScanEvent {
    type Error = EventDecodeError;

    fn try_from(wire: WireScan) -> Result<Self, Self::Error> {
        let next = match (wire.next_scanner_id, wire.next_event_time) {
            (Some(scanner), Some(expected_at)) => Some(NextHop {
                scanner,
                expected_at,
            }),
            (None, None) => None,
            _ => return Err(EventDecodeError::PartialNextHop),
        };
        let missing = |field| EventDecodeError::MissingField {
            scanner: wire.scanner_id,
            package_id: wire.package_id.clone(),
            field,
        };
        let kind = match wire.scanner_id {
            ScannerId::EndOfStream => ScanKind::EndOfStream,
            ScannerId::Output => ScanKind::Output,
            ScannerId::Intake => ScanKind::Intake {
                next: next.ok_or_else(|| missing("next_scanner_id"))?,
                destination: wire.destination.ok_or_else(|| missing("destination"))?,
                declared_value: wire
                    .declared_value
                    .ok_or_else(|| missing("declared_value"))?,
                estimated_delivery_time: wire
                    .estimated_delivery_time
                    .ok_or_else(|| missing("estimated_delivery_time"))?,
            },
            ScannerId::Weighing => ScanKind::Weighing {
                next: next.ok_or_else(|| missing("next_scanner_id"))?,
                weight: wire.weight.ok_or_else(|| missing("weight"))?,
            },
            scanner => match wire.next_sorting_center {
                Some(next_center) => ScanKind::Handoff {
                    scanner,
                    next_center,
                    next: next.ok_or_else(|| missing("next_scanner_id"))?,
                },
                None => ScanKind::Transit { scanner, next },
            },
        };
        Ok(ScanEvent {
            event_time: wire.event_time,
            sorting_center: wire.sorting_center,
            package_id: wire.package_id,
            kind,
        })
    }
}

impl From<ScanEvent> for WireScan {
    fn from(event: ScanEvent) -> Self {
        let mut wire = WireScan {
            event_time: event.event_time,
            sorting_center: event.sorting_center,
            package_id: event.package_id.clone(),
            scanner_id: event.scanner(),
            next_scanner_id: None,
            next_event_time: None,
            next_sorting_center: event.next_center(),
            destination: None,
            declared_value: None,
            estimated_delivery_time: None,
            weight: None,
        };
        if let Some(next) = event.next() {
            wire.next_scanner_id = Some(next.scanner);
            wire.next_event_time = Some(next.expected_at);
        }
        match event.kind {
            ScanKind::Intake {
                destination,
                declared_value,
                estimated_delivery_time,
                ..
            } => {
                wire.destination = Some(destination);
                wire.declared_value = Some(declared_value);
                wire.estimated_delivery_time = Some(estimated_delivery_time);
            }
            ScanKind::Weighing { weight, .. } => wire.weight = Some(weight),
            _ => {}
        }
        wire
    }
}

/// A derived record indicating a package is delayed, lost, or delivered late.
///
/// Published to the trouble stream as JSON tagged by `event_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TroubleEvent {
    DelayedPackage {
        event_time: i64,
        package_id: String,
        expected_event_time: i64,
        sorting_center: Center,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_scanner_id: Option<String>,
    },
    LateDelivery {
        event_time: i64,
        package_id: String,
        expected_event_time: i64,
        sorting_center: Center,
    },
    LostPackage {
        event_time: i64,
        package_id: String,
        sorting_center: Center,
    },
}

impl TroubleEvent {
    pub fn package_id(&self) -> &str {
        match self {
            TroubleEvent::DelayedPackage { package_id, .. }
            | TroubleEvent::LateDelivery { package_id, .. }
            | TroubleEvent::LostPackage { package_id, .. } => package_id,
        }
    }

    pub fn event_time(&self) -> i64 {
        match self {
            TroubleEvent::DelayedPackage { event_time, .. }
            | TroubleEvent::LateDelivery { event_time, .. }
            | TroubleEvent::LostPackage { event_time, .. } => *event_time,
        }
    }
}
