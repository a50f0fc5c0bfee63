//! Socket topology and CPU availability.
//!
//! The per-socket worklists need two facts: how many sockets exist, and
//! which socket a given worker nominally belongs to. Both come from
//! sysfs on Linux; anywhere else (or on any parse failure) the topology
//! collapses to a single socket, which turns the per-socket variants
//! into their global equivalents — exactly the required degradation.
//!
//! Worker-to-socket assignment is nominal (worker `w` ↔ cpu `w % ncpus`):
//! workers are not pinned, so this is a locality heuristic, not a
//! placement guarantee.
//!
//! # Container awareness
//!
//! The default worker count comes from the *allowed* CPU set
//! (`sched_getaffinity`), not the host CPU count: in a container pinned
//! to 4 of 64 cores, 4 workers is the right default.

/// Socket layout used to place per-socket chunk lists.
#[derive(Clone, Debug)]
pub struct Topology {
    sockets: usize,
    /// Dense socket id per CPU index. Empty means "synthetic": socket is
    /// `cpu % sockets`.
    cpu_socket: Vec<usize>,
}

impl Topology {
    /// Query the machine. Falls back to a single socket when the
    /// topology cannot be read.
    pub fn detect() -> Self {
        Self::detect_sysfs().unwrap_or_else(Self::single)
    }

    /// A single socket: per-socket variants collapse to global.
    pub fn single() -> Self {
        Self {
            sockets: 1,
            cpu_socket: Vec::new(),
        }
    }

    /// Synthetic topology with `sockets` sockets, CPUs assigned
    /// round-robin. Used by tests and benchmarks to exercise the
    /// per-socket paths on any machine.
    pub fn with_sockets(sockets: usize) -> Self {
        assert!(sockets > 0, "Topology: sockets must be > 0");
        Self {
            sockets,
            cpu_socket: Vec::new(),
        }
    }

    pub fn sockets(&self) -> usize {
        self.sockets
    }

    /// Socket for worker `w` under the nominal `w ↔ cpu` assignment.
    pub fn socket_of_worker(&self, w: usize) -> usize {
        if self.cpu_socket.is_empty() {
            return w % self.sockets;
        }
        self.cpu_socket[w % self.cpu_socket.len()]
    }

    #[cfg(target_os = "linux")]
    fn detect_sysfs() -> Option<Self> {
        let cpus = allowed_cpu_count();
        let mut package_ids = Vec::with_capacity(cpus);
        for cpu in 0..cpus {
            let path =
                format!("/sys/devices/system/cpu/cpu{cpu}/topology/physical_package_id");
            let raw = std::fs::read_to_string(path).ok()?;
            package_ids.push(raw.trim().parse::<usize>().ok()?);
        }
        if package_ids.is_empty() {
            return None;
        }

        // Densify package ids (they need not be contiguous).
        let mut seen: Vec<usize> = package_ids.clone();
        seen.sort_unstable();
        seen.dedup();
        let cpu_socket = package_ids
            .iter()
            .map(|id| seen.binary_search(id).expect("id came from this set"))
            .collect();

        Some(Self {
            sockets: seen.len(),
            cpu_socket,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn detect_sysfs() -> Option<Self> {
        None
    }
}

/// Number of CPUs this process may run on.
///
/// Prefers the affinity mask (cgroup/cpuset aware); falls back to
/// `available_parallelism`.
pub(crate) fn allowed_cpu_count() -> usize {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: cpu_set_t is plain-old-data; zeroed is a valid empty
        // set, and sched_getaffinity only writes within its size.
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) == 0
            {
                let count = libc::CPU_COUNT(&set);
                if count > 0 {
                    return count as usize;
                }
            }
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
