//! Kernel-side benchmark: two modules and a sysfs counter interface.
//!
//! Writing a loop count to `count` and reading `time` fires the trivial
//! tracepoint `count` times on every online CPU and reports the summed
//! duration in microseconds.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{info, warn};

use crate::command::checked_output;
use crate::error::Result;

pub const BENCH_SYSFS: &str = "/sys/kernel/lttng_benchmark";
pub const SYS_MODULE_ROOT: &str = "/sys/module";

#[derive(Clone, Debug)]
pub struct KernelModule {
    path: PathBuf,
    name: String,
    sys_module_root: PathBuf,
}

impl KernelModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            sys_module_root: PathBuf::from(SYS_MODULE_ROOT),
        }
    }

    pub fn with_sys_module_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sys_module_root = root.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.sys_module_root.join(&self.name).exists()
    }

    /// Returns whether the module had to be inserted.
    pub fn load(&self) -> Result<bool> {
        if self.is_loaded() {
            return Ok(false);
        }
        checked_output(Command::new("insmod").arg(&self.path))?;
        info!("loaded {}", self.name);
        Ok(true)
    }

    pub fn unload(&self) -> Result<()> {
        if !self.is_loaded() {
            return Ok(());
        }
        checked_output(Command::new("rmmod").arg(&self.name))?;
        info!("unloaded {}", self.name);
        Ok(())
    }
}

/// Drives the benchmark module. Modules inserted by this value are removed
/// again when it drops.
pub struct KernelBench {
    main: KernelModule,
    probe: KernelModule,
    sysfs: PathBuf,
    inserted: Vec<KernelModule>,
}

impl KernelBench {
    /// Modules are expected as `<module_dir>/lttng_benchmark.ko` and
    /// `<module_dir>/lttng_benchmark_probe.ko`.
    pub fn new(module_dir: &Path) -> Self {
        Self::with_modules(
            KernelModule::new(module_dir.join("lttng_benchmark.ko")),
            KernelModule::new(module_dir.join("lttng_benchmark_probe.ko")),
            BENCH_SYSFS,
        )
    }

    pub fn with_modules(main: KernelModule, probe: KernelModule, sysfs: impl Into<PathBuf>) -> Self {
        Self {
            main,
            probe,
            sysfs: sysfs.into(),
            inserted: Vec::new(),
        }
    }

    fn load_modules(&mut self) -> Result<()> {
        for module in [&self.main, &self.probe] {
            if module.load()? {
                self.inserted.push(module.clone());
            }
        }
        Ok(())
    }

    /// Run the in-kernel loop `count` times per CPU; returns seconds.
    pub fn benchmark(&mut self, count: u64) -> Result<f64> {
        self.load_modules()?;
        fs::write(self.sysfs.join("count"), count.to_string())?;
        let time = fs::read_to_string(self.sysfs.join("time"))?;
        let micros: f64 = time.trim().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad benchmark time {time:?}: {e}"),
            )
        })?;
        Ok(micros / 1e6)
    }

    /// Tracepoints fired by the module.
    pub fn events(&self) -> Result<Vec<String>> {
        Ok(fs::read_to_string(self.sysfs.join("events"))?
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Remove the modules inserted by [`KernelBench::benchmark`], probe
    /// first. Modules that were already loaded are left alone.
    pub fn unload_modules(&mut self) -> Result<()> {
        while let Some(module) = self.inserted.pop() {
            module.unload()?;
        }
        Ok(())
    }
}

impl Drop for KernelBench {
    fn drop(&mut self) {
        if let Err(e) = self.unload_modules() {
            warn!("failed to unload kernel modules: {e}");
        }
    }
}
