// batch.rs - Independent sessions on a scoped worker pool
//
// Workers pull session indices from a shared channel and push results back on
// another; each owns its session's whole processing run. One failure never
// stops the others. Results are returned in input order.

use crossbeam::channel::unbounded;
use serde::Serialize;

use crate::error::{Result, TrackerError};
use crate::loader::MeasurementSource;
use crate::pipeline::{PathTracker, ProcessingReport, TrackingResult};
use crate::storage::TrajectorySink;
use crate::types::Session;

/// Result of one session in a batch.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: String,
    pub result: Result<TrackingResult>,
}

impl SessionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// JSON-friendly view for reporting.
    pub fn summary(&self) -> OutcomeSummary<'_> {
        match &self.result {
            Ok(r) => OutcomeSummary::Processed(&r.report),
            Err(e) => OutcomeSummary::Failed {
                session_id: &self.session_id,
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeSummary<'a> {
    Processed(&'a ProcessingReport),
    Failed { session_id: &'a str, error: String },
}

/// Process sessions in parallel on up to `workers` threads.
pub fn process_sessions(
    tracker: &PathTracker,
    sessions: &[Session],
    workers: usize,
) -> Vec<SessionOutcome> {
    if sessions.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, sessions.len());

    let (job_tx, job_rx) = unbounded::<usize>();
    let (result_tx, result_rx) = unbounded::<(usize, Result<TrackingResult>)>();
    for index in 0..sessions.len() {
        // Receiver is alive until the end of this function
        let _ = job_tx.send(index);
    }
    drop(job_tx);

    log::debug!(
        "[BATCH] {} sessions on {} workers",
        sessions.len(),
        workers
    );

    let scope_result = crossbeam::scope(|s| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move |_| {
                for index in job_rx.iter() {
                    let result = tracker.process(&sessions[index]);
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);
    if scope_result.is_err() {
        log::warn!("[BATCH] a worker panicked; its sessions are reported as failed");
    }

    let mut slots: Vec<Option<Result<TrackingResult>>> = sessions.iter().map(|_| None).collect();
    for (index, result) in result_rx.try_iter() {
        slots[index] = Some(result);
    }

    sessions
        .iter()
        .zip(slots)
        .map(|(session, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(TrackerError::Worker(format!(
                    "no result for session {}",
                    session.id()
                )))
            });
            if let Err(e) = &result {
                log::warn!("[BATCH] session {} failed: {}", session.id(), e);
            }
            SessionOutcome {
                session_id: session.id().to_string(),
                result,
            }
        })
        .collect()
}

/// Load every session from `source`, process them in parallel and store each
/// successful trajectory in `sink`.
pub fn run_source(
    tracker: &PathTracker,
    source: &dyn MeasurementSource,
    sink: &mut dyn TrajectorySink,
    workers: usize,
) -> Result<Vec<SessionOutcome>> {
    let ids = source.session_ids()?;
    log::info!("[BATCH] {} sessions available", ids.len());

    let mut sessions = Vec::with_capacity(ids.len());
    let mut load_failures = Vec::new();
    for id in ids {
        match source.load_session(&id) {
            Ok(session) => sessions.push(session),
            Err(e) => {
                log::warn!("[LOADER] session {} rejected: {}", id, e);
                load_failures.push(SessionOutcome {
                    session_id: id,
                    result: Err(e),
                });
            }
        }
    }

    let mut outcomes = process_sessions(tracker, &sessions, workers);
    for outcome in outcomes.iter_mut() {
        let stored = match &outcome.result {
            Ok(result) => sink.replace(&result.trajectory),
            Err(_) => continue,
        };
        if let Err(e) = stored {
            log::warn!("[BATCH] session {} not stored: {}", outcome.session_id, e);
            outcome.result = Err(e);
        }
    }

    outcomes.extend(load_failures);
    outcomes.sort_by(|a, b| a.session_id.cmp(&b.session_id));

    let ok = outcomes.iter().filter(|o| o.is_ok()).count();
    log::info!(
        "[BATCH] {} of {} sessions processed",
        ok,
        outcomes.len()
    );
    Ok(outcomes)
}
