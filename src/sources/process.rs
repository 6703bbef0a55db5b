use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::Mutex;
use tracing::trace;

use super::ProcessRuntime;
use crate::{ProcessMemory, SystemMetrics};

/// Resource counters of the current process, read through `sysinfo`
pub struct SysinfoRuntime {
    pid: Pid,
    system: Mutex<System>,
    started: Instant,
}

impl SysinfoRuntime {
    pub fn new() -> anyhow::Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("cannot resolve own pid: {e}"))?;

        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
            started: Instant::now(),
        })
    }
}

#[async_trait]
impl ProcessRuntime for SysinfoRuntime {
    async fn sample(&self) -> anyhow::Result<SystemMetrics> {
        let mut sys = self.system.lock().await;
        sys.refresh_memory();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        let process = sys
            .process(self.pid)
            .ok_or_else(|| anyhow!("process {} not found", self.pid))?;

        let metrics = SystemMetrics {
            memory: ProcessMemory {
                used: process.memory(),
                virtual_size: process.virtual_memory(),
                system_total: sys.total_memory(),
            },
            uptime_secs: self.uptime_secs(),
            cpu_usage: process.cpu_usage(),
        };
        trace!("sampled process resources: {metrics:?}");

        Ok(metrics)
    }

    fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
