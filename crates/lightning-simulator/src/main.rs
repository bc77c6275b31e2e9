//! Desktop simulator for the lightning tracker.
//!
//! Feeds `lightning-core` with a synthetic lightning sensor on a simulated
//! clock, so the reconciliation state machine can be exercised without
//! hardware. Each cycle behaves like a wake-up from deep sleep: the tracker
//! is rebuilt from the record on disk, fed one sample and dropped again.
//!
//! The synthetic sensor passes through a storm, misses some samples, and
//! is power-cycled once (its counter restarts at zero).
//!
//! # Environment
//!
//! | Variable       | Meaning                                   | Default              |
//! |----------------|-------------------------------------------|----------------------|
//! | `RUST_LOG`     | log filter (`trace` dumps the history)    | `info`               |
//! | `SIM_CYCLES`   | number of sampling cycles to simulate     | `40`                 |
//! | `SIM_STATE_DIR`| where the tracker record is kept          | `$TMP/lightning-sim` |

mod file_store;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info, warn};

use lightning_core::{
    BaselineReason, LightningConfig, LightningSample, LightningTracker, ReconcileOutcome,
};

use file_store::FileStore;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const DEFAULT_CYCLES: u32 = 40;

/// Every n-th cycle the device "oversleeps" and misses a sample
const MISSED_SAMPLE_EVERY: u32 = 7;

/// Cycle at which the sensor loses power and its counter restarts
const SENSOR_POWER_CYCLE_AT: u32 = 23;

// ---------------------------------------------------------------------------
// Mock sensor
// ---------------------------------------------------------------------------

/// Synthetic lightning sensor with a running strike counter
struct MockLightningSensor {
    counter: i32,
    distance: u8,
    /// Small LCG so runs are reproducible
    seed: u32,
    just_started: bool,
}

impl MockLightningSensor {
    fn new() -> Self {
        Self {
            counter: 0,
            distance: 0,
            seed: 0x2545_f491,
            just_started: true,
        }
    }

    fn next_random(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.seed >> 16
    }

    /// Storm intensity rises and falls over roughly 20 cycles
    fn strikes_for_cycle(&mut self, cycle: u32) -> i32 {
        let phase = cycle as f64 / 20.0 * core::f64::consts::PI;
        let intensity = (phase.sin() * 6.0).max(0.0);
        let jitter = (self.next_random() % 3) as f64;
        (intensity + jitter - 1.0).max(0.0) as i32
    }

    fn power_cycle(&mut self) {
        self.counter = 0;
        self.just_started = true;
    }

    fn read(&mut self, timestamp: i64, cycle: u32) -> LightningSample {
        let strikes = self.strikes_for_cycle(cycle);
        if strikes > 0 {
            self.counter += strikes;
            // Storm approaches and then moves away
            self.distance = (40u32.abs_diff(cycle * 2) + 5 + self.next_random() % 4).min(255) as u8;
        }
        let startup = core::mem::take(&mut self.just_started);
        LightningSample::new(timestamp, self.counter, self.distance, startup)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn state_dir() -> PathBuf {
    std::env::var_os("SIM_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("lightning-sim"))
}

fn describe(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Baseline(BaselineReason::Uninitialized) => {
            "baseline set (first sample)".to_string()
        }
        ReconcileOutcome::Baseline(BaselineReason::CounterRegressed { previous, current }) => {
            format!("baseline reset ({previous} -> {current})")
        }
        ReconcileOutcome::ClockAnomaly { elapsed_secs, .. } => {
            format!("clock anomaly ({elapsed_secs} s)")
        }
        ReconcileOutcome::Updated {
            strikes,
            window_expired,
            skipped_buckets,
        } => {
            let mut text = format!("{strikes} strike(s)");
            if *skipped_buckets > 0 {
                text.push_str(&format!(", {skipped_buckets} bucket(s) skipped"));
            }
            if *window_expired {
                text.push_str(", history expired");
            }
            text
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = LightningConfig::default();
    let cycles: u32 = env_or("SIM_CYCLES", DEFAULT_CYCLES);
    let dir = state_dir();

    info!("Starting lightning simulator");
    info!(
        "Update interval: {} min ({} buckets), state in {}",
        config.interval.minutes(),
        config.interval.bucket_count(),
        dir.display()
    );

    let store = match FileStore::open(&dir) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot use state directory {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    };
    if let Err(e) = store.clear() {
        warn!("Could not clear previous run: {}", e);
    }

    let start = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let step = config.interval.secs();

    let mut sensor = MockLightningSensor::new();
    let mut store = Some(store);

    for cycle in 0..cycles {
        let now = start + i64::from(cycle) * step;

        if cycle == SENSOR_POWER_CYCLE_AT {
            info!("[{:>3}] sensor power cycled", cycle);
            sensor.power_cycle();
        }

        // Wake up: rebuild the tracker from persisted state
        let Some(backend) = store.take() else {
            break;
        };
        let mut tracker = LightningTracker::new(config, backend);
        if let Err(e) = tracker.load() {
            warn!("[{:>3}] running with volatile state: {}", cycle, e);
        }

        let sample = sensor.read(now, cycle);

        if cycle > 0 && cycle % MISSED_SAMPLE_EVERY == 0 {
            info!("[{:>3}] sample missed", cycle);
        } else {
            let result = tracker.reconcile(sample);
            if let Err(e) = &result.persisted {
                warn!("[{:>3}] state not persisted: {}", cycle, e);
            }
            info!(
                "[{:>3}] counter {:>4}: {}",
                cycle,
                sample.counter,
                describe(&result.outcome)
            );
        }

        match tracker.last_event() {
            Some(event) => info!(
                "      last event: {} strike(s), {} km, {} s ago",
                event.count,
                event.distance,
                now - event.timestamp
            ),
            None => info!("      last event: none"),
        }
        match tracker.past_hour_at(now) {
            Some(strikes) => info!("      past hour: {} strike(s)", strikes),
            None => info!("      past hour: no data"),
        }

        // Back to sleep
        store = Some(tracker.into_store());
    }

    info!("Simulator exiting");
}
