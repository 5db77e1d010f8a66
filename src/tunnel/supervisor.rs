//! Background worker that owns the tunnel process.
//!
//! The worker runs on its own OS thread: it launches the binary, feeds the
//! merged output stream through [`OutputParser`] until EOF, then reaps the
//! process. The [`Supervisor`] handle kept by the server only holds a weak
//! reference to the child, which it uses to stop the process on shutdown.
//!
//! A stop requested before the worker has launched anything is recorded in
//! the shared slot, so the worker either skips the launch or kills the
//! process it just started.

use std::io::{self, BufReader};
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::launcher::{self, LaunchConfig, Launched};
use super::parser::OutputParser;
use super::status::StatusStore;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

type SharedChild = Arc<Mutex<Child>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the worker has done with the process, as seen by [`Supervisor`].
#[derive(Debug, Default)]
enum ChildSlot {
    /// The worker has not published a process yet.
    #[default]
    Pending,
    Running(Weak<Mutex<Child>>),
    /// A stop was requested; nothing may be launched or kept running.
    Stopped,
}

type SharedSlot = Arc<Mutex<ChildSlot>>;

/// Handle to the worker thread and, once launched, its process.
pub struct Supervisor {
    slot: SharedSlot,
    done: oneshot::Receiver<()>,
}

impl Supervisor {
    /// Spawns the worker thread. Launch failures are reported through
    /// `store`; only a failure to create the thread itself is returned.
    pub fn start(config: LaunchConfig, store: StatusStore) -> io::Result<Self> {
        let slot = SharedSlot::default();
        let (done_tx, done) = oneshot::channel();

        let worker_slot = Arc::clone(&slot);
        thread::Builder::new()
            .name("tunnel-output".to_string())
            .spawn(move || {
                run_worker(&config, &store, &worker_slot);
                let _ = done_tx.send(());
            })?;

        Ok(Self { slot, done })
    }

    /// Marks the slot stopped and returns the running process, if any.
    fn claim_stop(&self) -> Option<SharedChild> {
        let mut slot = lock(&self.slot);
        match std::mem::replace(&mut *slot, ChildSlot::Stopped) {
            ChildSlot::Pending => {
                info!("Stop requested before the tunnel process was launched");
                None
            }
            ChildSlot::Running(weak) => weak.upgrade(),
            ChildSlot::Stopped => None,
        }
    }

    /// Requests a graceful stop and escalates to a kill after `grace`.
    ///
    /// Returns immediately when no process is running. If the worker has not
    /// launched yet, it will not launch at all, or it kills the process it
    /// was starting.
    pub async fn terminate(&self, grace: Duration) {
        let Some(child) = self.claim_stop() else {
            return;
        };

        {
            let mut guard = lock(&child);
            if !matches!(guard.try_wait(), Ok(None)) {
                return;
            }
            info!("Stopping tunnel process (pid {})", guard.id());
            // Signalling under the lock keeps the worker from reaping the
            // pid in between.
            request_stop(&mut guard);
        }

        let deadline = Instant::now() + grace;
        loop {
            if !matches!(lock(&child).try_wait(), Ok(None)) {
                info!("Tunnel process stopped");
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        warn!(
            "Tunnel process did not stop within {:?}, killing it",
            grace
        );
        let mut guard = lock(&child);
        if let Err(e) = guard.kill() {
            error!("Failed to kill tunnel process: {}", e);
        }
    }

    /// Waits up to `timeout` for the worker to finish. Returns whether it did.
    pub async fn join(self, timeout: Duration) -> bool {
        // A dropped sender also means the worker is gone.
        tokio::time::timeout(timeout, self.done).await.is_ok()
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: `pid` belongs to a child that has not been reaped yet.
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        warn!(
            "Failed to send SIGTERM to tunnel process: {}",
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to stop tunnel process: {}", e);
    }
}

fn run_worker(config: &LaunchConfig, store: &StatusStore, slot: &Mutex<ChildSlot>) {
    if matches!(*lock(slot), ChildSlot::Stopped) {
        info!("Tunnel stopped before launch");
        store.mark_exited(None);
        return;
    }

    let Launched { child, output } = match launcher::launch(config) {
        Ok(launched) => launched,
        Err(e) => {
            error!("{}", e);
            store.set_error(e.to_string());
            if e.attempted_start() {
                store.mark_exited(None);
            }
            return;
        }
    };

    let pid = child.id();
    store.set_pid(pid);
    info!(
        "Started {} (pid {}) forwarding to {}",
        config.binary, pid, config.to
    );

    let child: SharedChild = Arc::new(Mutex::new(child));
    {
        let mut slot = lock(slot);
        if matches!(*slot, ChildSlot::Stopped) {
            drop(slot);
            warn!("Stop requested while launching, killing tunnel process");
            store.mark_exited(kill_now(&child));
            return;
        }
        *slot = ChildSlot::Running(Arc::downgrade(&child));
    }

    let parser = OutputParser::new(store.clone());
    let lines = parser.consume(BufReader::new(output));
    debug!("Tunnel output closed after {} lines", lines);

    let code = match wait_for_exit(&child) {
        Ok(status) => {
            info!("Tunnel process exited: {}", status);
            status.code()
        }
        Err(e) => {
            warn!("Failed to wait for tunnel process: {}", e);
            None
        }
    };
    store.mark_exited(code);
}

fn kill_now(child: &Mutex<Child>) -> Option<i32> {
    let mut guard = lock(child);
    if let Err(e) = guard.kill() {
        error!("Failed to kill tunnel process: {}", e);
    }
    match guard.wait() {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Failed to wait for tunnel process: {}", e);
            None
        }
    }
}

/// Polls instead of blocking in `wait` so the lock stays available for
/// [`Supervisor::terminate`].
fn wait_for_exit(child: &Mutex<Child>) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = lock(child).try_wait()? {
            return Ok(status);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}
