//! Background workers: the outbox drain loop and the hold-expiry sweep.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use frontdesk_events::Event;
use frontdesk_sms::{OutboxWorker, WorkerDeps};

use crate::app::AppState;

pub fn spawn_all(
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if state.config.features.sms {
        let worker = OutboxWorker::new(WorkerDeps {
            outbox: state.outbox.clone(),
            optouts: state.optouts.clone(),
            rates: state.rates.clone(),
            tenants: state.tenants.clone(),
            audit: state.audit.clone(),
            carrier: state.carrier.clone(),
            clock: state.clock.clone(),
            config: state.config.sms.clone(),
        });
        handles.push(tokio::spawn(worker.run(shutdown.clone())));
    } else {
        info!("sms feature disabled, outbox worker not started");
    }

    handles.push(tokio::spawn(hold_sweep(state.clone(), shutdown.clone())));
    handles.push(tokio::spawn(voice_call_sweep(state, shutdown)));
    handles
}

/// Periodically delete expired holds and emit `HoldExpired` so the
/// follow-up handler can react.
async fn hold_sweep(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(
        state.config.booking.hold_cleanup_interval_ms,
    ));
    info!("hold-expiry sweep started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match state.holds.sweep_expired() {
                    Ok(expired) => {
                        for hold in expired {
                            state.bus.emit(&Event::HoldExpired { hold });
                        }
                    }
                    Err(e) => error!("hold sweep failed: {e}"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("hold-expiry sweep shutting down");
                    break;
                }
            }
        }
    }
}

/// Evict abandoned calls from the in-process voice session table.
async fn voice_call_sweep(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = state.voice_calls.evict_stale(state.clock.now_utc());
                if evicted > 0 {
                    info!(count = evicted, "stale voice calls evicted");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("voice call sweep shutting down");
                    break;
                }
            }
        }
    }
}
