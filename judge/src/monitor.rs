//! Resource sampling for running child processes
//!
//! Reads CPU time, resident memory and bytes written of a process from
//! procfs. Every reading is independently fallible: `None` means the value
//! is not available right now (the process exited, or its accounting file
//! could not be read) and callers keep polling instead of treating it as
//! a limit breach.

use std::fs;
use std::path::PathBuf;

use nix::sys::utsname::uname;
use nix::unistd::{sysconf, SysconfVar};
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_PAGE_SIZE: u64 = 4096;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("cannot discover the host clock tick frequency: {0}")]
    ClockTicks(String),
}

/// Host constants needed to convert procfs counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostClock {
    pub ticks_per_second: u64,
    pub page_size: u64,
}

impl HostClock {
    /// Discover the tick frequency and page size of the running kernel
    pub fn discover() -> Result<Self, MonitorError> {
        let ticks_per_second = match sysconf(SysconfVar::CLK_TCK) {
            Ok(Some(ticks)) if ticks > 0 => ticks as u64,
            _ => config_hz_from_boot()?,
        };

        let page_size = match sysconf(SysconfVar::PAGE_SIZE) {
            Ok(Some(size)) if size > 0 => size as u64,
            _ => {
                warn!("Cannot query page size, assuming {} bytes", DEFAULT_PAGE_SIZE);
                DEFAULT_PAGE_SIZE
            }
        };

        Ok(Self {
            ticks_per_second,
            page_size,
        })
    }

    pub fn ticks_to_ms(&self, ticks: u64) -> u64 {
        ticks.saturating_mul(1000) / self.ticks_per_second
    }

    pub fn pages_to_kb(&self, pages: u64) -> u64 {
        pages.saturating_mul(self.page_size) / 1024
    }
}

/// Discover the host clock at startup; workers cannot judge without it
pub fn init_host_clock() -> Result<HostClock, MonitorError> {
    let clock = HostClock::discover()?;
    info!(
        "Host clock: {} ticks/s, page size {} bytes",
        clock.ticks_per_second, clock.page_size
    );
    Ok(clock)
}

/// Read `CONFIG_HZ` from the kernel build configuration
fn config_hz_from_boot() -> Result<u64, MonitorError> {
    let uts = uname().map_err(|e| MonitorError::ClockTicks(format!("uname failed: {}", e)))?;
    let path = format!("/boot/config-{}", uts.release().to_string_lossy());
    let content = fs::read_to_string(&path)
        .map_err(|e| MonitorError::ClockTicks(format!("cannot read {}: {}", path, e)))?;
    parse_config_hz(&content)
        .ok_or_else(|| MonitorError::ClockTicks(format!("no CONFIG_HZ in {}", path)))
}

fn parse_config_hz(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("CONFIG_HZ="))
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|&hz| hz > 0)
}

/// One polling tick worth of readings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sample {
    pub cpu_time_ms: Option<u64>,
    pub memory_kb: Option<u64>,
    pub write_bytes: Option<u64>,
}

/// Source of per-process resource readings
pub trait ResourceSampler: Send + Sync {
    /// User plus kernel CPU time in milliseconds
    fn cpu_time_ms(&self, pid: u32) -> Option<u64>;
    /// Resident memory in KB
    fn memory_kb(&self, pid: u32) -> Option<u64>;
    /// Cumulative bytes written
    fn write_bytes(&self, pid: u32) -> Option<u64>;

    fn sample(&self, pid: u32) -> Sample {
        Sample {
            cpu_time_ms: self.cpu_time_ms(pid),
            memory_kb: self.memory_kb(pid),
            write_bytes: self.write_bytes(pid),
        }
    }
}

/// Sampler backed by `/proc/<pid>/{stat,statm,io}`
#[derive(Debug, Clone)]
pub struct ProcSampler {
    clock: HostClock,
    proc_root: PathBuf,
}

impl ProcSampler {
    pub fn new(clock: HostClock) -> Self {
        Self {
            clock,
            proc_root: PathBuf::from("/proc"),
        }
    }

    fn read(&self, pid: u32, file: &str) -> Option<String> {
        fs::read_to_string(self.proc_root.join(pid.to_string()).join(file)).ok()
    }
}

impl ResourceSampler for ProcSampler {
    fn cpu_time_ms(&self, pid: u32) -> Option<u64> {
        let (utime, stime) = parse_stat_ticks(&self.read(pid, "stat")?)?;
        Some(self.clock.ticks_to_ms(utime + stime))
    }

    fn memory_kb(&self, pid: u32) -> Option<u64> {
        let pages = parse_statm_resident(&self.read(pid, "statm")?)?;
        Some(self.clock.pages_to_kb(pages))
    }

    fn write_bytes(&self, pid: u32) -> Option<u64> {
        parse_io_wchar(&self.read(pid, "io")?)
    }
}

/// Extract `(utime, stime)` ticks from `/proc/<pid>/stat`.
///
/// The command name is parenthesized and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
fn parse_stat_ticks(content: &str) -> Option<(u64, u64)> {
    let rest = &content[content.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    // fields after the name start at `state` (field 3); utime is field 14
    let utime = fields.nth(11)?.parse().ok()?;
    let stime = fields.next()?.parse().ok()?;
    Some((utime, stime))
}

fn parse_statm_resident(content: &str) -> Option<u64> {
    content.split_whitespace().nth(1)?.parse().ok()
}

fn parse_io_wchar(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("wchar:"))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "4242 (my (odd) prog) R 1 4242 4242 0 -1 4194304 120 0 0 0 250 50 0 0 20 0 1 0 123 4096 300 18446744073709551615";

    fn clock() -> HostClock {
        HostClock {
            ticks_per_second: 100,
            page_size: 4096,
        }
    }

    #[test]
    fn test_parse_stat_ticks_with_parenthesized_name() {
        assert_eq!(parse_stat_ticks(STAT), Some((250, 50)));
        assert_eq!(parse_stat_ticks("garbage"), None);
    }

    #[test]
    fn test_tick_and_page_conversion() {
        assert_eq!(clock().ticks_to_ms(300), 3000);
        assert_eq!(clock().pages_to_kb(300), 1200);
    }

    #[test]
    fn test_parse_statm_and_io() {
        assert_eq!(parse_statm_resident("1000 300 20 5 0 80 0\n"), Some(300));
        let io = "rchar: 100\nwchar: 2048\nsyscr: 3\nsyscw: 4\n";
        assert_eq!(parse_io_wchar(io), Some(2048));
        assert_eq!(parse_io_wchar("rchar: 100\n"), None);
    }

    #[test]
    fn test_parse_config_hz() {
        let config = "CONFIG_HZ_250=y\nCONFIG_HZ=250\nCONFIG_SCHED_HRTICK=y\n";
        assert_eq!(parse_config_hz(config), Some(250));
        assert_eq!(parse_config_hz("CONFIG_HZ_1000=y\n"), None);
    }

    #[test]
    fn test_proc_sampler_reads_own_process() {
        let sampler = ProcSampler::new(HostClock::discover().unwrap());
        let pid = std::process::id();
        assert!(sampler.cpu_time_ms(pid).is_some());
        assert!(sampler.memory_kb(pid).unwrap() > 0);
    }

    #[test]
    fn test_proc_sampler_unknown_for_missing_process() {
        let sampler = ProcSampler {
            clock: clock(),
            proc_root: tempfile::tempdir().unwrap().path().to_path_buf(),
        };
        assert_eq!(sampler.sample(1), Sample::default());
    }
}
