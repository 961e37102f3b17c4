use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};

/// Source of resident memory samples for the session watchdog.
pub trait MemoryProbe: Send + Sync {
    fn resident_bytes(&self) -> Option<u64>;
}

#[derive(Debug, Clone)]
pub struct SystemStats {
    pub own_memory_mb: u64,
    pub tree_memory_bytes: u64,
    pub tree_memory_mb: u64,
    pub peak_memory_mb: u64,
    pub child_processes: usize,
    pub elapsed_time: Duration,
}

/// Samples this process together with its descendants, which is where the
/// driver and browser processes live.
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
    peak_memory: Mutex<u64>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Memory sampling disabled, current pid unavailable: {}", e);
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            start_time: Instant::now(),
            peak_memory: Mutex::new(0),
        }
    }

    pub fn get_stats(&self) -> Option<SystemStats> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_all();

        let own = system.process(pid)?.memory();
        let tree = process_tree(&system, pid);
        let tree_bytes: u64 = tree
            .iter()
            .filter_map(|pid| system.process(*pid))
            .map(|process| process.memory())
            .sum();

        let tree_mb = tree_bytes / 1024 / 1024;
        let mut peak = self.peak_memory.lock().ok()?;
        if tree_mb > *peak {
            *peak = tree_mb;
        }

        Some(SystemStats {
            own_memory_mb: own / 1024 / 1024,
            tree_memory_bytes: tree_bytes,
            tree_memory_mb: tree_mb,
            peak_memory_mb: *peak,
            child_processes: tree.len() - 1,
            elapsed_time: self.start_time.elapsed(),
        })
    }

    pub fn log_stats(&self, phase: &str) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 {} - Memory: {}MB (self {}MB, {} child processes), Peak: {}MB, Uptime: {:?}",
                phase,
                stats.tree_memory_mb,
                stats.own_memory_mb,
                stats.child_processes,
                stats.peak_memory_mb,
                stats.elapsed_time
            );
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMonitor {
    fn resident_bytes(&self) -> Option<u64> {
        self.get_stats().map(|stats| stats.tree_memory_bytes)
    }
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for std::sync::Arc<P> {
    fn resident_bytes(&self) -> Option<u64> {
        (**self).resident_bytes()
    }
}

/// `root` and every process descending from it.
fn process_tree(system: &System, root: Pid) -> HashSet<Pid> {
    let mut tree = HashSet::from([root]);
    // parents can be listed after their children, so sweep until stable
    loop {
        let before = tree.len();
        for (pid, process) in system.processes() {
            if process.parent().is_some_and(|parent| tree.contains(&parent)) {
                tree.insert(*pid);
            }
        }
        if tree.len() == before {
            return tree;
        }
    }
}
