//! Parallel visibility sweep.
//!
//! Fans `find_passes` out over every (satellite, target) pair with a fixed
//! pool of `min(cores, tasks)` workers pulling from a shared queue. Each
//! worker builds its own propagators from the TLE strings; a propagator is
//! never shared between threads. The progress callback may fire from any
//! worker, so callers keep it idempotent and non-blocking.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};

use overpass_types::{CancelToken, PassWindow, Satellite, Target};

use crate::propagator::{OrbitError, Propagator};
use crate::visibility::{self, VisibilityConfig};

/// `(completed, total)` progress observer.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Aggregated sweep output, keyed by `(satellite_id, target_id)`.
#[derive(Debug, Default)]
pub struct ParallelSweep {
    pub passes: BTreeMap<(String, String), Vec<PassWindow>>,
    pub cancelled: bool,
}

struct SweepTask {
    satellite: Satellite,
    target: Target,
}

/// Run the sweep for every (satellite, target) pair.
///
/// Results are keyed and ordered deterministically regardless of worker
/// interleaving. On cancellation the map holds whatever finished and
/// `cancelled` is set.
pub fn run_parallel_sweep(
    satellites: &[Satellite],
    targets: &[Target],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cfg: &VisibilityConfig,
    progress: Option<ProgressFn>,
    cancel: &CancelToken,
) -> Result<ParallelSweep, OrbitError> {
    let tasks: Vec<SweepTask> = satellites
        .iter()
        .flat_map(|sat| {
            targets.iter().map(move |tgt| SweepTask {
                satellite: sat.clone(),
                target: tgt.clone(),
            })
        })
        .collect();
    let total = tasks.len();
    if total == 0 {
        return Ok(ParallelSweep::default());
    }

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(total);

    let queue: Arc<Mutex<VecDeque<SweepTask>>> = Arc::new(Mutex::new(tasks.into()));
    let results: Arc<Mutex<BTreeMap<(String, String), Vec<PassWindow>>>> =
        Arc::new(Mutex::new(BTreeMap::new()));
    let first_error: Arc<Mutex<Option<OrbitError>>> = Arc::new(Mutex::new(None));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let results = Arc::clone(&results);
        let first_error = Arc::clone(&first_error);
        let completed = Arc::clone(&completed);
        let progress = progress.clone();
        let cancel = cancel.clone();
        let cfg = *cfg;
        let window = (start, end);

        let handle = thread::spawn(move || {
            // Propagators are rebuilt per worker and cached by satellite id.
            let mut props: BTreeMap<String, Propagator> = BTreeMap::new();

            loop {
                if cancel.is_cancelled() {
                    return;
                }
                let task = {
                    let mut q = queue.lock().unwrap();
                    q.pop_front()
                };
                let Some(task) = task else { return };

                let outcome = sweep_one(&mut props, &task, window, &cfg, &cancel);
                match outcome {
                    Ok(windows) => {
                        let key = (task.satellite.id.clone(), task.target.id.clone());
                        results.lock().unwrap().insert(key, windows);
                    }
                    Err(e) => {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        cancel.cancel();
                        return;
                    }
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = &progress {
                    cb(done, total);
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().expect("sweep worker panicked");
    }

    if let Some(err) = first_error.lock().unwrap().take() {
        return Err(err);
    }

    let passes = std::mem::take(&mut *results.lock().unwrap());
    Ok(ParallelSweep {
        passes,
        cancelled: cancel.is_cancelled(),
    })
}

fn sweep_one(
    props: &mut BTreeMap<String, Propagator>,
    task: &SweepTask,
    (start, end): (DateTime<Utc>, DateTime<Utc>),
    cfg: &VisibilityConfig,
    cancel: &CancelToken,
) -> Result<Vec<PassWindow>, OrbitError> {
    if !props.contains_key(&task.satellite.id) {
        let prop = Propagator::from_tle(
            &task.satellite.name,
            &task.satellite.tle_line1,
            &task.satellite.tle_line2,
        )?;
        props.insert(task.satellite.id.clone(), prop);
    }
    let prop = &props[&task.satellite.id];
    let scan = visibility::find_passes(
        prop,
        task.target.latitude,
        task.target.longitude,
        start,
        end,
        cfg,
        cancel,
    )?;
    Ok(scan.windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use overpass_types::{BusCapabilities, ImagingModality, LockLevel};

    const ISS_LINE1: &str =
        "1 25544U 98067A   24001.00000000  .00002182  00000-0  40864-4 0  9996";
    const ISS_LINE2: &str =
        "2 25544  51.6461 339.7939 0001220  92.8340 267.3124 15.49309239426382";

    fn satellite(id: &str) -> Satellite {
        Satellite {
            id: id.to_string(),
            name: format!("{id} NAME"),
            tle_line1: ISS_LINE1.to_string(),
            tle_line2: ISS_LINE2.to_string(),
            modality: ImagingModality::Optical,
            bus: BusCapabilities::default(),
            sensor_fov_half_angle_deg: 1.0,
            active: true,
            description: String::new(),
        }
    }

    fn target(id: &str, lat: f64, lon: f64) -> Target {
        Target {
            id: id.to_string(),
            name: id.to_string(),
            latitude: lat,
            longitude: lon,
            priority: 1,
            lock_level: LockLevel::None,
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            "2024-01-01T00:00:00Z".parse().unwrap(),
            "2024-01-01T12:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn parallel_matches_serial() {
        let sats = vec![satellite("sat_a")];
        let tgts = vec![target("tgt_a", 40.0, 20.0), target("tgt_b", 41.0, 21.0)];
        let (start, end) = window();
        let cfg = VisibilityConfig::default();

        let parallel = run_parallel_sweep(
            &sats,
            &tgts,
            start,
            end,
            &cfg,
            None,
            &CancelToken::new(),
        )
        .unwrap();

        let prop = Propagator::from_tle("ISS", ISS_LINE1, ISS_LINE2).unwrap();
        for tgt in &tgts {
            let serial = visibility::find_passes(
                &prop,
                tgt.latitude,
                tgt.longitude,
                start,
                end,
                &cfg,
                &CancelToken::new(),
            )
            .unwrap();
            let key = ("sat_a".to_string(), tgt.id.clone());
            assert_eq!(parallel.passes[&key], serial.windows);
        }
    }

    #[test]
    fn progress_reaches_total() {
        let sats = vec![satellite("sat_a"), satellite("sat_b")];
        let tgts = vec![target("tgt_a", 40.0, 20.0)];
        let (start, end) = window();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |done, total| {
            assert!(done <= total);
            // Callbacks may interleave across workers; track the high water mark.
            seen_cb.fetch_max(done, Ordering::SeqCst);
        });

        let sweep = run_parallel_sweep(
            &sats,
            &tgts,
            start,
            end,
            &VisibilityConfig::default(),
            Some(progress),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(sweep.passes.len(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bad_tle_surfaces_as_error() {
        let mut sat = satellite("sat_bad");
        sat.tle_line1 = "garbage".into();
        let tgts = vec![target("tgt_a", 40.0, 20.0)];
        let (start, end) = window();
        let err = run_parallel_sweep(
            &[sat],
            &tgts,
            start,
            end,
            &VisibilityConfig::default(),
            None,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, OrbitError::InvalidEphemeris { .. }));
    }

    #[test]
    fn pre_cancelled_sweep_is_empty_and_marked() {
        let sats = vec![satellite("sat_a")];
        let tgts = vec![target("tgt_a", 40.0, 20.0)];
        let (start, end) = window();
        let token = CancelToken::new();
        token.cancel();
        let sweep = run_parallel_sweep(
            &sats,
            &tgts,
            start,
            end,
            &VisibilityConfig::default(),
            None,
            &token,
        )
        .unwrap();
        assert!(sweep.cancelled);
        assert!(sweep.passes.is_empty());
    }
}
