//! CPU hot-plug through `/sys/devices/system/cpu`.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::error::{Error, Result};

pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

pub type CpuSet = BTreeSet<u32>;

/// Parse a kernel CPU list such as `0-3,6,8-9`.
pub fn parse_cpu_list(list: &str) -> Result<CpuSet> {
    let mut cpus = CpuSet::new();
    for range in list.trim().split(',').filter(|r| !r.is_empty()) {
        let bad = || Error::Cpu(format!("malformed CPU list: {list:?}"));
        match range.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.parse().map_err(|_| bad())?;
                let hi: u32 = hi.parse().map_err(|_| bad())?;
                cpus.extend(lo..=hi);
            }
            None => {
                cpus.insert(range.parse().map_err(|_| bad())?);
            }
        }
    }
    Ok(cpus)
}

#[derive(Clone, Debug)]
pub struct CpuHotplug {
    root: PathBuf,
}

impl Default for CpuHotplug {
    fn default() -> Self {
        Self::with_root(SYSFS_CPU_ROOT)
    }
}

impl CpuHotplug {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_cpu_file(&self, name: &str) -> Result<CpuSet> {
        parse_cpu_list(&fs::read_to_string(self.root.join(name))?)
    }

    pub fn online_cpus(&self) -> Result<CpuSet> {
        self.read_cpu_file("online")
    }

    pub fn offline_cpus(&self) -> Result<CpuSet> {
        self.read_cpu_file("offline")
    }

    pub fn online_count(&self) -> Result<usize> {
        Ok(self.online_cpus()?.len())
    }

    pub fn set_cpu_online(&self, cpu: u32, online: bool) -> Result<()> {
        let path = self.root.join(format!("cpu{cpu}")).join("online");
        fs::write(path, if online { "1" } else { "0" })?;
        Ok(())
    }

    fn set_cpus_online<'a>(&self, cpus: impl IntoIterator<Item = &'a u32>, online: bool) -> Result<()> {
        for &cpu in cpus {
            self.set_cpu_online(cpu, online)?;
        }
        Ok(())
    }

    /// Bring exactly `cpus` online, taking every other CPU offline.
    pub fn set_online_cpus(&self, cpus: &CpuSet) -> Result<()> {
        self.set_cpus_online(self.online_cpus()?.difference(cpus), false)?;
        self.set_cpus_online(self.offline_cpus()?.intersection(cpus), true)
    }

    /// Take exactly `cpus` offline, bringing every other CPU online.
    pub fn set_offline_cpus(&self, cpus: &CpuSet) -> Result<()> {
        self.set_cpus_online(self.online_cpus()?.intersection(cpus), false)?;
        self.set_cpus_online(self.offline_cpus()?.difference(cpus), true)
    }

    /// Adjust the number of online CPUs to `count`, enabling the
    /// lowest-numbered offline CPUs or disabling the highest-numbered online
    /// ones. Impossible requests fail before any CPU is touched.
    pub fn set_online_count(&self, count: usize) -> Result<()> {
        let online = self.online_cpus()?;
        let offline = self.offline_cpus()?;

        if count > online.len() + offline.len() {
            return Err(Error::Cpu(format!(
                "cannot get {count} CPUs online: only {} more are available",
                offline.len()
            )));
        }
        if count < 1 {
            return Err(Error::Cpu("cannot get less than one CPU online".to_string()));
        }

        if count < online.len() {
            let to_disable = online.len() - count;
            self.set_cpus_online(online.iter().rev().take(to_disable), false)?;
        } else if count > online.len() {
            let to_enable = count - online.len();
            self.set_cpus_online(offline.iter().take(to_enable), true)?;
        } else {
            return Ok(());
        }

        let new_count = self.online_count()?;
        if new_count != count {
            return Err(Error::Cpu(format!(
                "got {new_count} CPUs online instead of {count}"
            )));
        }
        info!("{count} CPUs online");
        Ok(())
    }

    /// Remember the current online set; it is restored when the guard drops.
    pub fn save_online(&self) -> Result<OnlineCpusGuard<'_>> {
        Ok(OnlineCpusGuard {
            hotplug: self,
            saved: self.online_cpus()?,
        })
    }
}

pub struct OnlineCpusGuard<'a> {
    hotplug: &'a CpuHotplug,
    saved: CpuSet,
}

impl OnlineCpusGuard<'_> {
    pub fn saved(&self) -> &CpuSet {
        &self.saved
    }
}

impl Drop for OnlineCpusGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.hotplug.set_online_cpus(&self.saved) {
            warn!("failed to restore online CPUs {:?}: {e}", self.saved);
        }
    }
}
