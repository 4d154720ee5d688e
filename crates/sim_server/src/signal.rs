//! Process signal handling.
//!
//! A single listener thread per process waits for Ctrl-C on a small tokio
//! runtime and invokes every registered callback. Each [`SignalHandler`]
//! owns one registration and removes it when dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::Mutex;
use tracing::{error, info};

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    callbacks: Mutex<BTreeMap<u64, Callback>>,
    next_id: AtomicU64,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static LISTENER: OnceLock<bool> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::default)
}

/// Start the listener thread once. Returns whether it is running.
fn listener() -> bool {
    *LISTENER.get_or_init(|| {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name("sim-signal".into())
            .spawn(move || listen(tx));
        match spawned {
            Ok(_) => rx.recv().unwrap_or(false),
            Err(err) => {
                error!(error = %err, "failed to spawn signal listener");
                false
            }
        }
    })
}

fn listen(ready: crossbeam_channel::Sender<bool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build signal runtime");
            let _ = ready.send(false);
            return;
        }
    };
    let _ = ready.send(true);

    loop {
        match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("interrupt received");
                let callbacks: Vec<Callback> = registry().callbacks.lock().values().cloned().collect();
                for callback in callbacks {
                    callback();
                }
            }
            Err(err) => {
                error!(error = %err, "failed to listen for interrupts");
                return;
            }
        }
    }
}

/// A registered interrupt callback.
pub struct SignalHandler {
    id: u64,
    initialized: bool,
}

impl SignalHandler {
    /// Register `callback` to run on every Ctrl-C.
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        let initialized = listener();
        let registry = registry();
        let id = registry.next_id.fetch_add(1, Ordering::Relaxed);
        registry.callbacks.lock().insert(id, Arc::new(callback));
        Self { id, initialized }
    }

    /// Whether the process listener is running. Run control refuses to start
    /// without it.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized
    }
}

impl std::fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandler")
            .field("id", &self.id)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        registry().callbacks.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_registers_and_unregisters() {
        let handler = SignalHandler::new(|| {});
        assert!(handler.initialized());
        let id = handler.id;
        assert!(registry().callbacks.lock().contains_key(&id));
        drop(handler);
        assert!(!registry().callbacks.lock().contains_key(&id));
    }

    #[test]
    fn test_handlers_get_distinct_ids() {
        let a = SignalHandler::new(|| {});
        let b = SignalHandler::new(|| {});
        assert_ne!(a.id, b.id);
    }
}
