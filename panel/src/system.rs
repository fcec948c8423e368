use firefly_core::{PanelError, PanelResult};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use sysinfo::{Disks, ProcessesToUpdate, System};
use tracing::debug;

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Summary shown on the dashboard, values pre-formatted for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub cpu: String,
    pub memory: String,
    pub processes: String,
    pub disk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

/// Samples OS counters. CPU figures are measured over `sample_interval`.
#[derive(Debug, Clone)]
pub struct SystemMonitor {
    sample_interval: Duration,
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl SystemMonitor {
    pub fn new(sample_interval: Duration) -> Self {
        Self { sample_interval }
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Takes two CPU readings `sample_interval` apart without blocking the runtime
    async fn sample(&self) -> PanelResult<System> {
        let system = tokio::task::spawn_blocking(|| {
            let mut system = System::new();
            system.refresh_cpu_usage();
            system.refresh_processes(ProcessesToUpdate::All, true);
            system
        })
        .await
        .map_err(|e| PanelError::System(format!("Sampling task failed: {}", e)))?;

        tokio::time::sleep(self.sample_interval).await;

        tokio::task::spawn_blocking(move || {
            let mut system = system;
            system.refresh_cpu_usage();
            system.refresh_memory();
            system.refresh_processes(ProcessesToUpdate::All, true);
            system
        })
        .await
        .map_err(|e| PanelError::System(format!("Sampling task failed: {}", e)))
    }

    pub async fn resources(&self) -> PanelResult<ResourceSummary> {
        let system = self.sample().await?;
        let disk_used = tokio::task::spawn_blocking(root_disk_used)
            .await
            .map_err(|e| PanelError::System(format!("Disk query failed: {}", e)))?;

        let summary = ResourceSummary {
            cpu: format!("{:.1}%", system.global_cpu_usage()),
            memory: format!("{:.1}MB", system.used_memory() as f64 / MIB),
            processes: system.processes().len().to_string(),
            disk: format!("{:.1}GB", disk_used as f64 / GIB),
        };
        debug!(?summary, "Sampled system resources");
        Ok(summary)
    }

    /// The `limit` processes with the largest resident memory
    pub async fn top_processes(&self, limit: usize) -> PanelResult<Vec<ProcessInfo>> {
        let system = self.sample().await?;

        let processes = system
            .processes()
            .values()
            .map(|process| ProcessInfo {
                pid: process.pid().as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                memory_mb: round1(process.memory() as f64 / MIB),
                cpu_percent: round1(f64::from(process.cpu_usage())),
            })
            .collect();

        Ok(top_by_memory(processes, limit))
    }
}

/// Used bytes of the filesystem mounted at `/`, or of all disks when there is none
fn root_disk_used() -> u64 {
    let disks = Disks::new_with_refreshed_list();
    let used = |disk: &sysinfo::Disk| disk.total_space().saturating_sub(disk.available_space());

    match disks.list().iter().find(|disk| disk.mount_point() == Path::new("/")) {
        Some(root) => used(root),
        None => disks.list().iter().map(used).sum(),
    }
}

fn top_by_memory(mut processes: Vec<ProcessInfo>, limit: usize) -> Vec<ProcessInfo> {
    processes.sort_by(|a, b| b.memory_mb.total_cmp(&a.memory_mb));
    processes.truncate(limit);
    processes
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
