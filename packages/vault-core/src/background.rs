//! Background maintenance tasks (spec §4.2/§4.5/§4.6): the session lock
//! timer, the cached-snapshot refresh loop, and escalation/audit cleanup.
//! Plain `std::thread` loops, not tokio — the vault's caller-facing API is
//! fully synchronous (spec §5), so the maintenance threads are too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::warn;

use crate::adapters::ClockAdapter;
use crate::vault_service::VaultCore;

/// A handle to a spawned background loop. Dropping it does not stop the
/// thread — call `stop()` (or let the process exit) to end it cleanly.
pub struct BackgroundTask {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    pub fn stop(mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runs `tick` every `period`, checking `cancel` often enough that `stop()`
/// returns promptly instead of blocking for up to a full period.
fn run_periodic(period: Duration, cancel: Arc<AtomicBool>, mut tick: impl FnMut() + Send + 'static) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !cancel.load(Ordering::SeqCst) {
            tick();
            let mut waited = Duration::ZERO;
            while waited < period && !cancel.load(Ordering::SeqCst) {
                let slice = CANCEL_POLL_INTERVAL.min(period - waited);
                std::thread::sleep(slice);
                waited += slice;
            }
        }
    })
}

/// Expires the session once its TTL elapses, even if no caller happens to
/// invoke an operation in the meantime (spec §4.2).
pub fn spawn_session_lock_timer(core: Arc<VaultCore>, clock: Arc<dyn ClockAdapter>, check_period: Duration) -> BackgroundTask {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    let handle = run_periodic(check_period, cancel_clone, move || {
        let now_ms = clock.now_ms();
        let _ = core.status(now_ms);
    });
    BackgroundTask { cancel, handle: Some(handle) }
}

/// Refreshes and pushes due cached snapshots to the relay (spec §4.5).
pub fn spawn_snapshot_refresh_loop(core: Arc<VaultCore>, clock: Arc<dyn ClockAdapter>) -> BackgroundTask {
    let period = Duration::from_millis(core.config().refresh_loop_period_ms);
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    let handle = run_periodic(period, cancel_clone, move || {
        let now_ms = clock.now_ms();
        if let Err(err) = core.refresh_and_push_snapshots(now_ms) {
            warn!(error = %err, "snapshot refresh loop failed");
        }
    });
    BackgroundTask { cancel, handle: Some(handle) }
}

/// Polls the approval gateway for pending escalations and evicts stale,
/// resolved ones (spec §4.6).
pub fn spawn_escalation_cleanup_task(core: Arc<VaultCore>, clock: Arc<dyn ClockAdapter>, period: Duration) -> BackgroundTask {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    let handle = run_periodic(period, cancel_clone, move || {
        let now_ms = clock.now_ms();
        if let Err(err) = core.poll_escalations_and_cleanup(now_ms) {
            warn!(error = %err, "escalation cleanup task failed");
        }
    });
    BackgroundTask { cancel, handle: Some(handle) }
}
