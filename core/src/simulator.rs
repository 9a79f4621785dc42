//! Deterministic-from-seed generator of package barcode-scan events.
//!
//! Given the same seed and parameters, the generator produces a
//! byte-identical event sequence: every draw happens in a fixed order from
//! one seeded RNG. Hop times are drawn once at construction and shared by
//! every center, so the delivery estimates stay consistent with the
//! emitted paths.

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use crate::event::{Center, NextHop, ScanEvent, ScanKind, ScannerId};

pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_HOUR: i64 = 3600;

/// Inter-center truck travel times in minutes; same-center entries are zero.
pub fn truck_travel_minutes(origin: Center, destination: Center) -> i64 {
    use Center::*;
    match (origin, destination) {
        (A, B) | (B, A) | (B, C) | (C, B) => 1440,
        (A, C) | (C, A) => 2880,
        (A, D) | (D, A) | (B, D) | (D, B) | (C, D) | (D, C) => 7200,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy)]
struct Hop {
    next: Option<ScannerId>,
    travel_secs: i64,
}

/// Scanner arrangement shared by every sorting center; the four centers run
/// the same floor layout and differ only by their code, so one set of hop
/// times is drawn for the whole run.
#[derive(Debug, Clone)]
struct PathModel {
    intake_path: Vec<Hop>,
    receiving_path: Vec<Hop>,
    output_path: Vec<Hop>,
    holding_secs: i64,
}

impl PathModel {
    fn sample(rng: &mut StdRng) -> Self {
        let mut minutes = |low: i64, high: i64| rng.random_range(low..=high) * SECONDS_PER_MINUTE;
        Self {
            intake_path: vec![
                Hop {
                    next: Some(ScannerId::Weighing),
                    travel_secs: minutes(2, 5),
                },
                Hop {
                    next: Some(ScannerId::PreRouting),
                    travel_secs: minutes(2, 5),
                },
                Hop {
                    next: Some(ScannerId::Routing),
                    travel_secs: minutes(5, 10),
                },
            ],
            receiving_path: vec![
                Hop {
                    next: Some(ScannerId::PreRouting),
                    travel_secs: minutes(2, 5),
                },
                Hop {
                    next: Some(ScannerId::Routing),
                    travel_secs: minutes(5, 10),
                },
            ],
            output_path: vec![
                Hop {
                    next: Some(ScannerId::Output),
                    travel_secs: minutes(5, 15),
                },
                Hop {
                    next: None,
                    travel_secs: 0,
                },
            ],
            holding_secs: minutes(5, 15),
        }
    }

    fn intake_secs(&self) -> i64 {
        self.intake_path.iter().map(|h| h.travel_secs).sum()
    }

    fn receiving_secs(&self) -> i64 {
        self.receiving_path.iter().map(|h| h.travel_secs).sum()
    }

    fn output_secs(&self) -> i64 {
        self.output_path.iter().map(|h| h.travel_secs).sum()
    }

    /// Hops a package follows through `center`.
    fn path(&self, center: Center, origin: Center, destination: Center) -> Vec<Hop> {
        let mut hops = if origin == center {
            self.intake_path.clone()
        } else {
            self.receiving_path.clone()
        };
        if destination == center {
            hops.extend(self.output_path.iter().copied());
        } else {
            hops.push(Hop {
                next: Some(ScannerId::HoldingAt(destination)),
                travel_secs: self.holding_secs,
            });
        }
        hops
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionKind {
    Lost,
    Delayed,
}

/// Scripted trouble for one package: after its event at `event_index`, the
/// package is either never scanned again or all later scans slip by
/// `delay_secs`.
#[derive(Debug, Clone, Copy)]
pub struct TroubleInjection {
    pub kind: InjectionKind,
    pub delay_secs: i64,
    pub event_index: usize,
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Total simulated running time in minutes (1440 = one day of scans).
    pub simulated_run_time_mins: i64,
    /// Minutes over which package intakes are spread.
    pub intake_run_time_mins: i64,
    pub package_count: u32,
    pub delayed_package_count: u32,
    pub lost_package_count: u32,
    /// Simulated epoch seconds of the first intake.
    pub simulated_start_time: i64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            simulated_run_time_mins: 1440,
            intake_run_time_mins: 300,
            package_count: 1,
            delayed_package_count: 0,
            lost_package_count: 0,
            simulated_start_time: 0,
            seed: 0,
        }
    }
}

/// Package barcode-scan simulator.
///
/// Packages are spread over the intake window; each follows the scanner
/// path of its origin center, rides a truck if its destination differs, and
/// finishes at the destination's output scanner. Emission stops for a
/// package once its next scheduled scan would fall past the end of the run.
pub struct Simulator {
    config: SimulatorConfig,
    end_time: i64,
    seconds_per_package: f64,
    paths: PathModel,
    injections: HashMap<String, TroubleInjection>,
    rng: StdRng,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        ensure!(config.package_count > 0, "package_count must be positive");
        ensure!(
            config.lost_package_count <= config.delayed_package_count,
            "lost_package_count cannot exceed delayed_package_count"
        );
        ensure!(
            config.delayed_package_count < config.package_count,
            "delayed_package_count must be less than package_count"
        );

        let mut rng = StdRng::seed_from_u64(config.seed);
        let paths = PathModel::sample(&mut rng);
        let injections = Self::sample_injections(&config, &mut rng);

        let end_time =
            config.simulated_start_time + config.simulated_run_time_mins * SECONDS_PER_MINUTE;
        let seconds_per_package = (config.intake_run_time_mins * SECONDS_PER_MINUTE) as f64
            / config.package_count as f64;
        tracing::debug!(
            "start_time {} end_time {} package_count {} seconds_per_package {}",
            config.simulated_start_time,
            end_time,
            config.package_count,
            seconds_per_package
        );

        Ok(Self {
            config,
            end_time,
            seconds_per_package,
            paths,
            injections,
            rng,
        })
    }

    fn sample_injections(
        config: &SimulatorConfig,
        rng: &mut StdRng,
    ) -> HashMap<String, TroubleInjection> {
        // most packages go missing or slip in routing
        const EVENT_INDEX_BAG: [usize; 7] = [3, 3, 3, 3, 1, 2, 4];

        let mut ids: Vec<u32> = (1..config.package_count).collect();
        ids.shuffle(rng);
        ids.truncate(config.delayed_package_count as usize);

        let injections: HashMap<String, TroubleInjection> = ids
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let kind = if (index as u32) < config.lost_package_count {
                    InjectionKind::Lost
                } else {
                    InjectionKind::Delayed
                };
                let event_index = EVENT_INDEX_BAG.choose(rng).copied().unwrap_or(3);
                (
                    id.to_string(),
                    TroubleInjection {
                        kind,
                        delay_secs: 2 * SECONDS_PER_HOUR,
                        event_index,
                    },
                )
            })
            .collect();
        tracing::debug!("trouble map {:?}", injections);
        injections
    }

    /// Which packages this run will lose or delay, and where.
    pub fn injections(&self) -> &HashMap<String, TroubleInjection> {
        &self.injections
    }

    /// Generate the full scan-event sequence for the run, ordered by scan
    /// time.
    ///
    /// The stable sort keeps each package's events in lifecycle order, so
    /// per-package FIFO survives the merge.
    pub fn events(&mut self) -> Vec<ScanEvent> {
        let mut out = Vec::new();
        let mut intake_time = self.config.simulated_start_time as f64;
        for package in 1..=self.config.package_count {
            let package_id = package.to_string();
            let lifecycle = self.package_lifecycle(intake_time, &package_id);
            let injection = self.injections.get(&package_id).copied();
            let mut delay_offset = 0i64;
            for (event_index, mut event) in lifecycle.into_iter().enumerate() {
                event.shift(delay_offset);
                out.push(event);
                if let Some(injection) = injection {
                    if injection.event_index == event_index {
                        match injection.kind {
                            InjectionKind::Lost => break,
                            InjectionKind::Delayed => delay_offset = injection.delay_secs,
                        }
                    }
                }
            }
            intake_time += self.seconds_per_package;
        }
        out.sort_by_key(|event| event.event_time);
        out
    }

    /// Events for one package from intake to output, in scan order.
    fn package_lifecycle(&mut self, intake_time: f64, package_id: &str) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        let origin = *Center::ALL.choose(&mut self.rng).unwrap_or(&Center::A);
        let destination = *Center::ALL.choose(&mut self.rng).unwrap_or(&Center::A);

        let paths = self.paths.clone();
        let mut event_time = intake_time;
        let mut scanner = ScannerId::Intake;
        for hop in paths.path(origin, origin, destination) {
            let next_event_time = event_time + hop.travel_secs as f64;
            events.push(self.scan_event(
                origin,
                event_time,
                package_id,
                scanner,
                hop.next,
                next_event_time,
                destination,
            ));
            // each actual scan lands at or just before its predicted time
            event_time = next_event_time - self.rng.random_range(0..=SECONDS_PER_MINUTE) as f64;
            if event_time >= self.end_time as f64 {
                return events;
            }
            if let Some(next) = hop.next {
                scanner = next;
            }
        }

        if destination == origin {
            // delivered; no truck leg
            return events;
        }

        // the truck leaves at the top of the next hour, so every package on
        // it reaches the destination's receiving scanner together
        let whole_hours = (event_time / SECONDS_PER_HOUR as f64).floor() as i64;
        let receiving_time = ((whole_hours + 1) * SECONDS_PER_HOUR
            + truck_travel_minutes(origin, destination) * SECONDS_PER_MINUTE)
            as f64;
        events.push(ScanEvent {
            event_time: event_time as i64,
            sorting_center: origin,
            package_id: package_id.to_string(),
            kind: ScanKind::Handoff {
                scanner,
                next_center: destination,
                next: NextHop {
                    scanner: ScannerId::Receiving,
                    expected_at: receiving_time as i64,
                },
            },
        });

        let mut event_time = receiving_time;
        let mut scanner = ScannerId::Receiving;
        for hop in paths.path(destination, origin, destination) {
            let next_event_time = event_time + hop.travel_secs as f64;
            events.push(self.scan_event(
                destination,
                event_time,
                package_id,
                scanner,
                hop.next,
                next_event_time,
                destination,
            ));
            event_time = next_event_time - self.rng.random_range(0..=SECONDS_PER_MINUTE) as f64;
            if event_time >= self.end_time as f64 {
                return events;
            }
            if let Some(next) = hop.next {
                scanner = next;
            }
        }

        events
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_event(
        &mut self,
        center: Center,
        event_time: f64,
        package_id: &str,
        scanner: ScannerId,
        next: Option<ScannerId>,
        next_event_time: f64,
        destination: Center,
    ) -> ScanEvent {
        let kind = match next {
            None => ScanKind::Output,
            Some(next_scanner) => {
                let next_hop = NextHop {
                    scanner: next_scanner,
                    expected_at: next_event_time as i64,
                };
                match scanner {
                    ScannerId::Intake => {
                        let declared_value = self.rng.random_range(10..=100);
                        ScanKind::Intake {
                            next: next_hop,
                            destination,
                            declared_value,
                            estimated_delivery_time: (self.travel_estimate(center, destination)
                                as f64
                                + event_time) as i64,
                        }
                    }
                    ScannerId::Weighing => ScanKind::Weighing {
                        next: next_hop,
                        weight: self.rng.random_range(1..=40),
                    },
                    other => ScanKind::Transit {
                        scanner: other,
                        next: Some(next_hop),
                    },
                }
            }
        };
        ScanEvent {
            event_time: event_time as i64,
            sorting_center: center,
            package_id: package_id.to_string(),
            kind,
        }
    }

    /// Estimated intake-to-delivery seconds, padded for truck loading.
    fn travel_estimate(&self, origin: Center, destination: Center) -> i64 {
        let paths = &self.paths;
        if origin == destination {
            return paths.intake_secs() + paths.output_secs() + 30 * SECONDS_PER_MINUTE;
        }

        let total = paths.intake_secs()
            + paths.holding_secs
            + paths.receiving_secs()
            + paths.output_secs()
            + truck_travel_minutes(origin, destination) * SECONDS_PER_MINUTE;
        // round up to the next whole hour for loading time on the truck
        let whole_hours = total / SECONDS_PER_HOUR;
        (whole_hours + 1) * SECONDS_PER_HOUR + 30 * SECONDS_PER_MINUTE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulate(seed: u64, package_count: u32) -> Vec<ScanEvent> {
        let mut simulator = Simulator::new(SimulatorConfig {
            simulated_run_time_mins: 14_400,
            package_count,
            seed,
            ..SimulatorConfig::default()
        })
        .unwrap();
        simulator.events()
    }

    fn find_seed(predicate: impl Fn(&[ScanEvent]) -> bool) -> u64 {
        (0..2_000)
            .find(|&seed| predicate(&simulate(seed, 1)))
            .expect("no seed matched within the search range")
    }

    fn first_intake(events: &[ScanEvent]) -> (Center, Center) {
        match &events[0].kind {
            ScanKind::Intake { destination, .. } => (events[0].sorting_center, *destination),
            other => panic!("first event should be an intake, got {other:?}"),
        }
    }

    #[test]
    fn identical_seeds_produce_identical_json() {
        let first = simulate(42, 20);
        let second = simulate(42, 20);
        assert_eq!(first, second);

        let encode = |events: &[ScanEvent]| {
            events
                .iter()
                .map(|e| serde_json::to_string(e).unwrap())
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(encode(&first), encode(&second));
    }

    #[test]
    fn different_seeds_diverge() {
        assert_ne!(simulate(1, 20), simulate(2, 20));
    }

    #[test]
    fn rejects_inconsistent_trouble_counts() {
        assert!(Simulator::new(SimulatorConfig {
            package_count: 10,
            delayed_package_count: 2,
            lost_package_count: 3,
            ..SimulatorConfig::default()
        })
        .is_err());

        assert!(Simulator::new(SimulatorConfig {
            package_count: 5,
            delayed_package_count: 5,
            ..SimulatorConfig::default()
        })
        .is_err());
    }

    #[test]
    fn same_center_package_never_hands_off() {
        let seed = find_seed(|events| {
            let (origin, destination) = first_intake(events);
            origin == destination
        });
        let events = simulate(seed, 1);

        assert_eq!(events.len(), 5);
        let scanners: Vec<ScannerId> = events.iter().map(|e| e.scanner()).collect();
        assert_eq!(
            scanners,
            vec![
                ScannerId::Intake,
                ScannerId::Weighing,
                ScannerId::PreRouting,
                ScannerId::Routing,
                ScannerId::Output,
            ]
        );
        assert!(events.iter().all(|e| e.next_center().is_none()));
        let origin = events[0].sorting_center;
        assert!(events.iter().all(|e| e.sorting_center == origin));
    }

    #[test]
    fn cross_center_package_rides_the_truck() {
        let seed = find_seed(|events| {
            let (origin, destination) = first_intake(events);
            origin == Center::A && destination == Center::B
        });
        let events = simulate(seed, 1);

        let handoff = events
            .iter()
            .find(|e| matches!(e.kind, ScanKind::Handoff { .. }))
            .expect("cross-center package must emit a handoff");
        assert_eq!(handoff.scanner(), ScannerId::HoldingAt(Center::B));
        assert_eq!(handoff.next_center(), Some(Center::B));
        let next = handoff.next().unwrap();
        assert_eq!(next.scanner, ScannerId::Receiving);
        // top of the hour plus a whole-hour truck ride
        assert_eq!(next.expected_at % SECONDS_PER_HOUR, 0);
        assert_eq!(
            next.expected_at - (handoff.event_time / SECONDS_PER_HOUR + 1) * SECONDS_PER_HOUR,
            truck_travel_minutes(Center::A, Center::B) * SECONDS_PER_MINUTE
        );

        let at_destination: Vec<ScannerId> = events
            .iter()
            .filter(|e| e.sorting_center == Center::B)
            .map(|e| e.scanner())
            .collect();
        assert_eq!(
            at_destination,
            vec![
                ScannerId::Receiving,
                ScannerId::PreRouting,
                ScannerId::Routing,
                ScannerId::Output,
            ]
        );
    }

    #[test]
    fn scans_never_arrive_after_their_prediction() {
        let events = simulate(7, 30);
        let mut expected: HashMap<(String, ScannerId), i64> = HashMap::new();
        for event in &events {
            let key = (event.package_id.clone(), event.scanner());
            if let Some(&promised) = expected.get(&key) {
                assert!(
                    event.event_time <= promised,
                    "package {} scanned at {} after promised {}",
                    event.package_id,
                    event.event_time,
                    promised
                );
            }
            if let Some(next) = event.next() {
                expected.insert(
                    (event.package_id.clone(), next.scanner),
                    next.expected_at,
                );
            }
        }
    }

    #[test]
    fn output_is_globally_ordered_by_scan_time() {
        let events = simulate(13, 25);
        assert!(events.windows(2).all(|w| w[0].event_time <= w[1].event_time));

        // and still in lifecycle order per package
        let first_package: Vec<&ScanEvent> =
            events.iter().filter(|e| e.package_id == "1").collect();
        assert_eq!(first_package[0].scanner(), ScannerId::Intake);
    }

    #[test]
    fn injections_respect_requested_counts() {
        let mut simulator = Simulator::new(SimulatorConfig {
            package_count: 20,
            delayed_package_count: 5,
            lost_package_count: 2,
            seed: 11,
            ..SimulatorConfig::default()
        })
        .unwrap();
        let injections = simulator.injections().clone();
        assert_eq!(injections.len(), 5);
        let lost = injections
            .values()
            .filter(|i| i.kind == InjectionKind::Lost)
            .count();
        assert_eq!(lost, 2);
        assert!(injections
            .values()
            .all(|i| (1..=4).contains(&i.event_index)));

        // a delayed package shifts every event after the injection point
        let events = simulator.events();
        let (package_id, injection) = injections
            .iter()
            .find(|(_, i)| i.kind == InjectionKind::Delayed)
            .expect("at least one delayed injection");
        let package_events: Vec<&ScanEvent> = events
            .iter()
            .filter(|e| &e.package_id == package_id)
            .collect();
        if package_events.len() > injection.event_index + 1 {
            let before = package_events[injection.event_index];
            let after = package_events[injection.event_index + 1];
            let promised = before.next().map(|n| n.expected_at).unwrap_or(i64::MAX);
            assert!(
                after.event_time >= promised + injection.delay_secs - SECONDS_PER_MINUTE,
                "delayed package should slip by the injected offset"
            );
        }
    }
}
