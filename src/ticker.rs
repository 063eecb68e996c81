use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// A flag shared between a background thread and its owner. Once cancelled, any pending or future
/// wait returns immediately.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn cancel(&self) {
        let (cancelled, condvar) = &*self.inner;

        *cancelled.lock().unwrap_or_else(PoisonError::into_inner) = true;

        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (cancelled, _) = &*self.inner;

        *cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `timeout` or until cancelled, whichever comes first. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (cancelled, condvar) = &*self.inner;

        let deadline = Instant::now() + timeout;

        let mut guard = cancelled.lock().unwrap_or_else(PoisonError::into_inner);

        // Spurious wakeups go back to sleep for the remainder
        while !*guard {
            let now = Instant::now();

            if now >= deadline {
                break;
            }

            guard = condvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        *guard
    }
}

/// Spawns a thread which calls `tick` repeatedly, sleeping for the returned duration in between.
/// The thread exits when `tick` returns `None` or the token is cancelled.
pub fn spawn<F>(
    name: String,
    token: CancellationToken,
    mut tick: F,
) -> io::Result<thread::JoinHandle<()>>
where
    F: FnMut() -> Option<Duration> + Send + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        while !token.is_cancelled() {
            let delay = match tick() {
                Some(delay) => delay,
                None => break,
            };

            if token.wait_timeout(delay) {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn stops_when_tick_returns_none() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let handle = spawn("tick-test".into(), CancellationToken::new(), move || {
            if count_clone.fetch_add(1, Ordering::SeqCst) < 4 {
                Some(Duration::from_millis(1))
            } else {
                None
            }
        })
        .unwrap();

        handle.join().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn cancel_interrupts_wait() {
        let token = CancellationToken::new();

        let handle =
            spawn("tick-test".into(), token.clone(), || Some(Duration::from_secs(3600))).unwrap();

        let begin = Instant::now();

        token.cancel();
        handle.join().unwrap();

        assert!(token.is_cancelled());
        assert!(begin.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn wait_timeout_elapses() {
        let token = CancellationToken::new();

        let begin = Instant::now();

        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(begin.elapsed() >= Duration::from_millis(20));

        token.cancel();

        assert!(token.wait_timeout(Duration::from_secs(3600)));
    }
}
