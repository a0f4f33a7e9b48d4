/// Process memory statistics surfaced in progress updates.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub used_mb: u64,
    pub avail_mb: u64,
}

pub fn memory_stats_mb() -> MemoryStats {
    #[cfg(target_os = "linux")]
    {
        use std::fs;
        let used_mb = fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("VmRSS:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
            })
            .map(|kb| kb / 1024)
            .unwrap_or(0);
        let avail_mb = fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("MemAvailable:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
            })
            .map(|kb| kb / 1024)
            .unwrap_or(0);
        return MemoryStats { used_mb, avail_mb };
    }

    #[allow(unreachable_code)]
    MemoryStats { used_mb: 0, avail_mb: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_do_not_panic() {
        let _ = memory_stats_mb();
    }
}
