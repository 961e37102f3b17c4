use crate::domain::ports::{BrowserSession, SessionLauncher};
use crate::utils::error::{MonitorError, Result};
use crate::utils::monitor::MemoryProbe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Exclusive access to the shared browser session. Dropping it releases the lock.
pub type SessionGuard<'a, S> = MappedMutexGuard<'a, S>;

/// Owns the one browser session of the process.
///
/// The session is launched by the first `acquire`, kept across callers, and
/// torn down by `recycle` (after a driver fault or by the memory watchdog) so
/// the next `acquire` starts a fresh one.
pub struct SessionManager<L: SessionLauncher> {
    launcher: L,
    slot: Mutex<Option<L::Session>>,
    launches: AtomicU64,
}

impl<L: SessionLauncher> SessionManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            slot: Mutex::new(None),
            launches: AtomicU64::new(0),
        }
    }

    /// Waits for any other holder to finish, launching the session if none is alive.
    pub async fn acquire(&self) -> Result<SessionGuard<'_, L::Session>> {
        let mut slot = self.slot.lock().await;
        if slot.is_none() {
            tracing::info!("🌐 Launching browser session");
            let session = self.launcher.launch().await.map_err(|e| match e {
                MonitorError::SessionInit { .. } => e,
                other => MonitorError::SessionInit {
                    message: other.to_string(),
                },
            })?;
            self.launches.fetch_add(1, Ordering::Relaxed);
            *slot = Some(session);
        }

        MutexGuard::try_map(slot, |slot| slot.as_mut()).map_err(|_| MonitorError::SessionInit {
            message: "browser session slot empty after launch".to_string(),
        })
    }

    /// Closes the live session, if any. Returns whether one was closed.
    pub async fn recycle(&self, reason: &str) -> bool {
        let session = self.slot.lock().await.take();
        match session {
            Some(session) => {
                tracing::warn!("♻️ Recycling browser session: {}", reason);
                if let Err(e) = session.quit().await {
                    tracing::warn!("Browser session did not quit cleanly: {}", e);
                }
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Number of sessions launched so far.
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    pub async fn shutdown(&self) {
        if self.recycle("shutdown").await {
            tracing::info!("Browser session closed");
        }
    }
}

impl<L: SessionLauncher + 'static> SessionManager<L> {
    /// Samples memory every `interval` (first sample immediately) and recycles
    /// the session whenever usage is above `ceiling_bytes`.
    pub fn spawn_watchdog<P>(self: &Arc<Self>, probe: P, interval: Duration, ceiling_bytes: u64) -> JoinHandle<()>
    where
        P: MemoryProbe + 'static,
    {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(bytes) = probe.resident_bytes() else {
                    tracing::debug!("Memory sample unavailable");
                    continue;
                };
                tracing::debug!("Memory sample: {}MB", bytes / 1024 / 1024);
                if bytes > ceiling_bytes {
                    tracing::warn!(
                        "Memory usage {}MB exceeds ceiling {}MB",
                        bytes / 1024 / 1024,
                        ceiling_bytes / 1024 / 1024
                    );
                    manager.recycle("memory ceiling exceeded").await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{DriverResult, ElementHandle};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    struct FakeSession {
        quit: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&self, _url: &str) -> DriverResult<()> {
            Ok(())
        }
        async fn find_visible(&self, _selector: &str) -> DriverResult<Option<ElementHandle>> {
            Ok(None)
        }
        async fn text(&self, _element: &ElementHandle) -> DriverResult<String> {
            Ok(String::new())
        }
        async fn child_attribute(&self, _e: &ElementHandle, _t: &str, _a: &str) -> DriverResult<Option<String>> {
            Ok(None)
        }
        async fn current_url(&self) -> DriverResult<String> {
            Ok("about:blank".to_string())
        }
        async fn page_source(&self) -> DriverResult<String> {
            Ok(String::new())
        }
        async fn screenshot_png(&self) -> DriverResult<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn quit(&self) -> DriverResult<()> {
            self.quit.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        fail: bool,
        quit_flag: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SessionLauncher for FakeLauncher {
        type Session = FakeSession;

        async fn launch(&self) -> Result<FakeSession> {
            if self.fail {
                return Err(MonitorError::ConfigError {
                    message: "chromedriver not found".to_string(),
                });
            }
            Ok(FakeSession {
                quit: Arc::clone(&self.quit_flag),
            })
        }
    }

    struct FixedProbe(u64);

    impl MemoryProbe for FixedProbe {
        fn resident_bytes(&self) -> Option<u64> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn test_session_launched_lazily_and_reused() {
        let manager = SessionManager::new(FakeLauncher::default());
        assert!(!manager.is_active().await);
        assert_eq!(manager.launch_count(), 0);

        drop(manager.acquire().await.unwrap());
        drop(manager.acquire().await.unwrap());

        assert!(manager.is_active().await);
        assert_eq!(manager.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_session_init_error() {
        let manager = SessionManager::new(FakeLauncher {
            fail: true,
            ..Default::default()
        });

        let err = manager.acquire().await.err().unwrap();
        assert!(matches!(err, MonitorError::SessionInit { .. }));
        assert!(err.to_string().contains("chromedriver not found"));
        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn test_recycle_quits_and_relaunches() {
        let launcher = FakeLauncher::default();
        let quit_flag = Arc::clone(&launcher.quit_flag);
        let manager = SessionManager::new(launcher);

        drop(manager.acquire().await.unwrap());
        assert!(manager.recycle("test").await);
        assert!(quit_flag.load(Ordering::SeqCst));
        assert!(!manager.is_active().await);
        assert!(!manager.recycle("again").await);

        drop(manager.acquire().await.unwrap());
        assert_eq!(manager.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let manager = Arc::new(SessionManager::new(FakeLauncher::default()));
        let guard = manager.acquire().await.unwrap();

        let contender = Arc::clone(&manager);
        let waiter = tokio::spawn(async move {
            let started = Instant::now();
            let _guard = contender.acquire().await.unwrap();
            started.elapsed()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(guard);

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_millis(40));
        assert_eq!(manager.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_watchdog_recycles_over_ceiling() {
        let manager = Arc::new(SessionManager::new(FakeLauncher::default()));
        drop(manager.acquire().await.unwrap());

        let watchdog = manager.spawn_watchdog(FixedProbe(600 * 1024 * 1024), Duration::from_millis(10), 500 * 1024 * 1024);
        tokio::time::sleep(Duration::from_millis(50)).await;
        watchdog.abort();

        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn test_watchdog_leaves_session_under_ceiling() {
        let manager = Arc::new(SessionManager::new(FakeLauncher::default()));
        drop(manager.acquire().await.unwrap());

        let watchdog = manager.spawn_watchdog(FixedProbe(100 * 1024 * 1024), Duration::from_millis(10), 500 * 1024 * 1024);
        tokio::time::sleep(Duration::from_millis(50)).await;
        watchdog.abort();

        assert!(manager.is_active().await);
        assert_eq!(manager.launch_count(), 1);
    }
}
