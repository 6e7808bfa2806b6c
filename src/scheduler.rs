//! Self-rearming timer that fires once per Chile midnight.

use crate::time::{format_chile, until_next_chile_midnight};
use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{error, info};

type TickFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type Tick = Arc<dyn Fn() -> TickFuture + Send + Sync>;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Running {
    handle: JoinHandle<()>,
    // Held while a tick is dispatched; `stop` flips it under the same lock.
    active: Arc<Mutex<bool>>,
}

pub struct MidnightScheduler {
    on_tick: Tick,
    clock: Clock,
    running: Mutex<Option<Running>>,
}

impl MidnightScheduler {
    pub fn new<F, Fut, E>(on_tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let on_tick: Tick = Arc::new(move || -> TickFuture {
            let tick = on_tick();
            Box::pin(async move { tick.await.map_err(|err| err.to_string()) })
        });
        Self {
            on_tick,
            clock: Arc::new(Utc::now),
            running: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let active = Arc::new(Mutex::new(true));
        let handle = tokio::spawn(run(
            Arc::clone(&self.on_tick),
            Arc::clone(&self.clock),
            Arc::clone(&active),
        ));
        *running = Some(Running { handle, active });
    }

    /// No tick starts after this returns; one already dispatched runs to completion.
    pub fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = taken {
            *running.active.lock().unwrap_or_else(PoisonError::into_inner) = false;
            running.handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for MidnightScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(on_tick: Tick, clock: Clock, active: Arc<Mutex<bool>>) {
    let mut reason = "start";
    loop {
        let delay = until_next_chile_midnight(clock());
        info!(
            delay_secs = delay.as_secs(),
            reason, "scheduling next Chile midnight tick"
        );
        tokio::time::sleep(delay).await;

        // Own task, so a panic is reported like any other failure.
        let tick = {
            let active = active.lock().unwrap_or_else(PoisonError::into_inner);
            if !*active {
                return;
            }
            tokio::spawn(on_tick())
        };

        match tick.await {
            Ok(Ok(())) => info!("midnight tick executed at {}", format_chile(clock())),
            Ok(Err(err)) => error!("error in midnight tick: {err}"),
            Err(err) => error!("midnight tick aborted: {err}"),
        }
        reason = "post-tick";
    }
}
