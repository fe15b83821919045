use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug)]
struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Cancellable idle-disconnect timer. At most one is outstanding.
///
/// Arming replaces the previous timer. A timer that already woke up when it
/// got replaced still runs its callback, so the callback must confirm with
/// [`IdleWatchdog::claim`] that its generation is still the armed one.
#[derive(Debug)]
pub struct IdleWatchdog {
    delay: Duration,
    generation: u64,
    armed: Option<Armed>,
}

impl IdleWatchdog {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            armed: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Must be called from inside a tokio runtime.
    pub fn arm<F>(&mut self, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation);
        });

        debug!("⏲️ Watchdog armado (#{}, {:?})", generation, delay);
        self.armed = Some(Armed { generation, handle });
        generation
    }

    /// Returns true when a timer was pending.
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.handle.abort();
                debug!("⏲️ Watchdog cancelado (#{})", armed.generation);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Disarms and returns true if `generation` is the timer currently armed.
    pub fn claim(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
