use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::models::config::AutoSaveConfig;
use crate::models::error::CaptureError;
use crate::traits::result_handler::ResultHandler;

use super::engine::EngineHandle;

/// Label given to every auto-saved snapshot.
pub const AUTO_SAVE_LABEL: &str = "Auto-saved clip";

/// Produces the handler for each auto-saved snapshot.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn ResultHandler> + Send + Sync>;

/// Wall-clock schedule for auto-save ticks.
///
/// The next tick is always one interval after the tick that just fired, so
/// a wake-up after a long suspend fires once instead of catching up.
#[derive(Debug, Clone, Default)]
pub struct AutoSaveSchedule {
    config: AutoSaveConfig,
    next_due: Option<Instant>,
}

impl AutoSaveSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply new settings. Enabling from disabled schedules the first tick
    /// one interval after `now`; an already scheduled tick is kept.
    pub fn configure(&mut self, config: AutoSaveConfig, now: Instant) {
        if !config.enabled {
            self.next_due = None;
        } else if self.next_due.is_none() {
            self.next_due = Some(now + interval(&config));
        }
        self.config = config;
    }

    pub fn config(&self) -> AutoSaveConfig {
        self.config
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Whether a tick is due at `now`. Firing reschedules from `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + interval(&self.config));
                true
            }
            _ => false,
        }
    }
}

fn interval(config: &AutoSaveConfig) -> Duration {
    Duration::from_secs(u64::from(config.interval_seconds.max(1)))
}

enum TimerCommand {
    Configure(AutoSaveConfig),
    Shutdown,
}

/// Timer thread that dumps a snapshot every `interval_seconds` while the
/// engine is capturing. Ticks while Idle are skipped.
pub struct AutoSaveScheduler {
    sender: Sender<TimerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl AutoSaveScheduler {
    pub fn spawn(
        engine: EngineHandle,
        config: AutoSaveConfig,
        handlers: HandlerFactory,
    ) -> Result<Self, CaptureError> {
        validate(&config)?;

        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("auto-save-timer".into())
            .spawn(move || timer_main(engine, config, handlers, receiver))
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to spawn auto-save timer: {}", e)))?;

        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    /// Replace the settings. Disabling cancels the pending tick.
    pub fn configure(&self, config: AutoSaveConfig) -> Result<(), CaptureError> {
        validate(&config)?;
        self.sender
            .send(TimerCommand::Configure(config))
            .map_err(|_| CaptureError::WorkerDisconnected)
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        let _ = self.sender.send(TimerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn validate(config: &AutoSaveConfig) -> Result<(), CaptureError> {
    if config.enabled && config.interval_seconds == 0 {
        return Err(CaptureError::ConfigurationFailed(
            "auto-save interval must be positive".into(),
        ));
    }
    Ok(())
}

fn timer_main(
    engine: EngineHandle,
    config: AutoSaveConfig,
    handlers: HandlerFactory,
    commands: Receiver<TimerCommand>,
) {
    let mut schedule = AutoSaveSchedule::new();
    schedule.configure(config, Instant::now());

    loop {
        let command = match schedule.next_due() {
            Some(due) => {
                let now = Instant::now();
                if schedule.fire(now) {
                    if !save(&engine, schedule.config(), &handlers) {
                        break;
                    }
                    continue;
                }
                match commands.recv_timeout(due.saturating_duration_since(now)) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            TimerCommand::Configure(config) => {
                log::info!(
                    "Auto-save {} (every {}s, {}s per clip)",
                    if config.enabled { "enabled" } else { "disabled" },
                    config.interval_seconds,
                    config.snapshot_seconds
                );
                schedule.configure(config, Instant::now());
            }
            TimerCommand::Shutdown => break,
        }
    }
}

/// Dump one auto-save snapshot. Returns false once the engine is gone.
fn save(engine: &EngineHandle, config: AutoSaveConfig, handlers: &HandlerFactory) -> bool {
    match engine.query_state() {
        Ok(status) if status.state.is_idle() => {
            log::debug!("Auto-save skipped, engine is idle");
            true
        }
        Ok(_) => {
            let seconds = f64::from(config.snapshot_seconds);
            match engine.dump_snapshot(seconds, handlers(), Some(AUTO_SAVE_LABEL.to_string())) {
                Ok(()) => true,
                Err(CaptureError::WorkerDisconnected) => false,
                Err(e) => {
                    log::warn!("Auto-save failed: {}", e);
                    true
                }
            }
        }
        Err(CaptureError::WorkerDisconnected) => false,
        Err(e) => {
            log::warn!("Auto-save failed: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::Artifact;
    use crate::models::config::EngineConfig;
    use crate::session::engine::CaptureEngine;
    use crate::test_support::{ScriptedSource, TestSinkFactory};

    fn every(seconds: u32) -> AutoSaveConfig {
        AutoSaveConfig {
            enabled: true,
            interval_seconds: seconds,
            snapshot_seconds: 300,
        }
    }

    #[test]
    fn enabling_schedules_one_interval_ahead() {
        let now = Instant::now();
        let mut schedule = AutoSaveSchedule::new();
        schedule.configure(every(600), now);

        assert_eq!(schedule.next_due(), Some(now + Duration::from_secs(600)));
        assert!(!schedule.fire(now + Duration::from_secs(599)));
        assert!(schedule.fire(now + Duration::from_secs(600)));
    }

    #[test]
    fn late_wakeup_fires_once() {
        let now = Instant::now();
        let mut schedule = AutoSaveSchedule::new();
        schedule.configure(every(600), now);

        // Ten intervals late, e.g. after a suspend.
        let late = now + Duration::from_secs(6000);
        assert!(schedule.fire(late));
        assert!(!schedule.fire(late));
        assert_eq!(schedule.next_due(), Some(late + Duration::from_secs(600)));
    }

    #[test]
    fn disabling_cancels_pending_tick() {
        let now = Instant::now();
        let mut schedule = AutoSaveSchedule::new();
        schedule.configure(every(60), now);
        schedule.configure(AutoSaveConfig::default(), now);

        assert_eq!(schedule.next_due(), None);
        assert!(!schedule.fire(now + Duration::from_secs(3600)));
    }

    #[test]
    fn reconfiguring_while_enabled_keeps_pending_tick() {
        let now = Instant::now();
        let mut schedule = AutoSaveSchedule::new();
        schedule.configure(every(60), now);
        schedule.configure(every(120), now + Duration::from_secs(30));

        assert_eq!(schedule.next_due(), Some(now + Duration::from_secs(60)));
        assert!(schedule.fire(now + Duration::from_secs(60)));
        assert_eq!(schedule.next_due(), Some(now + Duration::from_secs(180)));
    }

    #[test]
    fn spawn_rejects_zero_interval() {
        let engine = CaptureEngine::builder(Box::new(ScriptedSource::new()), Arc::new(TestSinkFactory::new()))
            .config(EngineConfig {
                listening_enabled: false,
                ..EngineConfig::default()
            })
            .spawn()
            .unwrap();
        let handlers: HandlerFactory = Arc::new(|| Box::new(|_: Result<Artifact, CaptureError>| {}) as Box<dyn ResultHandler>);

        let result = AutoSaveScheduler::spawn(engine.handle(), every(0), handlers);
        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }

    fn channel_handlers() -> (HandlerFactory, Receiver<Result<Artifact, CaptureError>>) {
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let handlers: HandlerFactory = Arc::new(move || {
            let tx = tx.lock().clone();
            Box::new(move |result: Result<Artifact, CaptureError>| {
                let _ = tx.send(result);
            }) as Box<dyn ResultHandler>
        });
        (handlers, rx)
    }

    #[test]
    fn timer_dumps_labelled_snapshot_once_per_interval() {
        let source = ScriptedSource::new();
        let sinks = TestSinkFactory::new();
        let engine = CaptureEngine::builder(Box::new(source.clone()), Arc::new(sinks.clone()))
            .config(EngineConfig {
                listening_enabled: true,
                buffer_capacity_bytes: 100_000,
                sample_rate: 1000,
                ..EngineConfig::default()
            })
            .spawn()
            .unwrap();
        source.push(&[9; 2000]);

        let (handlers, rx) = channel_handlers();
        let scheduler = AutoSaveScheduler::spawn(engine.handle(), every(1), handlers).unwrap();

        let artifact = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(artifact.label.as_deref(), Some(AUTO_SAVE_LABEL));
        assert_eq!(artifact.byte_count, 2000);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        drop(scheduler);
    }

    #[test]
    fn timer_skips_while_idle() {
        let sinks = TestSinkFactory::new();
        let engine = CaptureEngine::builder(Box::new(ScriptedSource::new()), Arc::new(sinks.clone()))
            .config(EngineConfig {
                listening_enabled: false,
                ..EngineConfig::default()
            })
            .spawn()
            .unwrap();

        let (handlers, rx) = channel_handlers();
        let scheduler = AutoSaveScheduler::spawn(engine.handle(), every(1), handlers).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(1500)).is_err());
        assert!(sinks.requests().is_empty());
        drop(scheduler);
    }

    #[test]
    fn disabled_timer_never_fires() {
        let engine = CaptureEngine::builder(Box::new(ScriptedSource::new()), Arc::new(TestSinkFactory::new()))
            .spawn()
            .unwrap();

        let (handlers, rx) = channel_handlers();
        let scheduler = AutoSaveScheduler::spawn(engine.handle(), every(1), handlers).unwrap();
        scheduler.configure(AutoSaveConfig::default()).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(1500)).is_err());
        drop(scheduler);
    }
}
