use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use stagemc::engine::progress::{Progress, ProgressCallback};
use stagemc::engine::state::TrialRecord;
use std::fmt::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;
/// Acceptance statistics are redrawn once per this many trials.
const TRIAL_REFRESH: u64 = 500;

/// Bar plus running trial statistics shared by every trajectory of a batch.
struct BatchView {
    pb: ProgressBar,
    trials: u64,
    accepted: u64,
    closure_failures: u64,
    retries: usize,
}

impl BatchView {
    fn acceptance_summary(&self) -> String {
        let rate = if self.trials == 0 {
            0.0
        } else {
            100.0 * self.accepted as f64 / self.trials as f64
        };
        format!(
            "{} trials, {:.1}% accepted, {} closure failures, {} retries",
            self.trials, rate, self.closure_failures, self.retries
        )
    }

    fn begin_phase(&mut self, name: &str) {
        self.pb.reset();
        self.pb.set_length(0);
        self.pb.set_style(spinner_style());
        self.pb
            .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        self.pb.set_message(name.to_string());
    }

    fn begin_models(&mut self, models: u64) {
        self.trials = 0;
        self.accepted = 0;
        self.closure_failures = 0;
        self.retries = 0;
        self.pb.disable_steady_tick();
        self.pb.reset();
        self.pb.set_length(models);
        self.pb.set_style(models_style());
        self.pb.set_message(String::new());
    }

    fn record_trial(&mut self, record: &TrialRecord) {
        self.trials += 1;
        if record.accepted {
            self.accepted += 1;
        }
        if record.closure_failed {
            self.closure_failures += 1;
        }
        if self.trials % TRIAL_REFRESH == 0 {
            let summary = self.acceptance_summary();
            self.pb.set_message(summary);
        }
    }

    fn finish_models(&mut self) {
        if let Some(length) = self.pb.length() {
            self.pb.set_position(length);
        }
        let summary = self.acceptance_summary();
        self.pb.finish_with_message(summary);
    }

    fn note(&self, line: String) {
        if self.pb.is_finished() {
            self.pb.set_message(line);
        } else {
            self.pb.println(format!("  {}", line));
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn models_style() -> ProgressStyle {
    ProgressStyle::with_template("Models [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key(
            "eta",
            |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            },
        )
        .progress_chars("##-")
}

/// Renders batch progress on stderr: a spinner while a phase is set up, a
/// bar over finished models, and running acceptance statistics.
#[derive(Clone)]
pub struct CliProgressHandler {
    view: Arc<Mutex<BatchView>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(spinner_style());
        pb.finish_and_clear();

        Self {
            view: Arc::new(Mutex::new(BatchView {
                pb,
                trials: 0,
                accepted: 0,
                closure_failures: 0,
                retries: 0,
            })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let view = Arc::clone(&self.view);

        Box::new(move |progress: Progress| {
            let Ok(mut view) = view.lock() else {
                warn!("Progress view mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::PhaseStart { name } => view.begin_phase(name),
                Progress::PhaseFinish => {
                    if !view.pb.is_finished() {
                        view.pb.finish();
                    }
                }
                Progress::TaskStart { total_steps } => view.begin_models(total_steps),
                Progress::TaskIncrement => view.pb.inc(1),
                Progress::TaskFinish => view.finish_models(),
                Progress::Trial(record) => view.record_trial(&record),
                Progress::AttemptStart { attempt, max_tries } if attempt > 1 => {
                    view.retries += 1;
                    view.note(format!(
                        "Retrying a trajectory (attempt {}/{})",
                        attempt, max_tries
                    ));
                }
                Progress::Checkpoint {
                    round,
                    passed: false,
                    reason,
                } => {
                    let at = round.map_or_else(|| "final".to_string(), |r| format!("round {}", r));
                    view.note(format!("Checkpoint failed at {}: {}", at, reason));
                }
                Progress::Message(msg) => view.note(msg),
                Progress::RoundStart { .. }
                | Progress::AttemptStart { .. }
                | Progress::Checkpoint { .. } => {}
            }
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagemc::core::moves::MoveKind;
    use std::thread;

    fn trial(accepted: bool, closure_failed: bool) -> Progress {
        Progress::Trial(TrialRecord {
            kind: MoveKind::Fragment,
            accepted,
            closure_failed,
            delta_score: 0.0,
            score: 0.0,
            best_score: 0.0,
        })
    }

    #[test]
    fn handler_starts_with_a_finished_empty_bar() {
        let handler = CliProgressHandler::new();
        let view = handler.view.lock().unwrap();
        assert_eq!(view.pb.length(), Some(0));
        assert!(view.pb.is_finished());
        assert_eq!(view.trials, 0);
    }

    #[test]
    fn batch_events_drive_bar_and_statistics() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart {
            name: "Sampling Trajectories",
        });
        {
            let view = handler.view.lock().unwrap();
            assert_eq!(view.pb.message(), "Sampling Trajectories");
            assert!(!view.pb.is_finished());
        }

        callback(Progress::TaskStart { total_steps: 4 });
        callback(trial(true, false));
        callback(trial(false, true));
        callback(Progress::AttemptStart {
            attempt: 2,
            max_tries: 3,
        });
        callback(Progress::TaskIncrement);
        {
            let view = handler.view.lock().unwrap();
            assert_eq!(view.pb.length(), Some(4));
            assert_eq!(view.pb.position(), 1);
            assert_eq!(view.trials, 2);
            assert_eq!(view.accepted, 1);
            assert_eq!(view.closure_failures, 1);
            assert_eq!(view.retries, 1);
        }

        callback(Progress::TaskFinish);
        callback(Progress::PhaseFinish);
        let view = handler.view.lock().unwrap();
        assert!(view.pb.is_finished());
        assert_eq!(view.pb.position(), 4);
        assert_eq!(
            view.pb.message(),
            "2 trials, 50.0% accepted, 1 closure failures, 1 retries"
        );
    }

    #[test]
    fn new_batch_resets_statistics() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();
        callback(Progress::TaskStart { total_steps: 1 });
        callback(trial(true, false));
        callback(Progress::TaskStart { total_steps: 2 });
        let view = handler.view.lock().unwrap();
        assert_eq!(view.trials, 0);
        assert_eq!(view.pb.length(), Some(2));
    }

    #[test]
    fn messages_after_finish_replace_the_status_line() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();
        callback(Progress::Message("Search budget exhausted".to_string()));
        let view = handler.view.lock().unwrap();
        assert_eq!(view.pb.message(), "Search budget exhausted");
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::TaskStart { total_steps: 2 });
            callback(trial(true, false));
            callback(Progress::TaskIncrement);
        })
        .join()
        .unwrap();

        let view = handler.view.lock().unwrap();
        assert_eq!(view.pb.position(), 1);
        assert_eq!(view.accepted, 1);
    }
}
