use super::lifecycle::LifecycleState;
use super::traits::TenantRepository;
use parking_lot::Mutex;
use std::collections::BTreeSet;

pub const DEFAULT_PORT_RANGE: [u16; 2] = [6000, 7000];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no available port in range {start}..={end}")]
pub struct NoPortsAvailable {
    pub start: u16,
    pub end: u16,
}

/// Hands out unique ports from an inclusive range.
///
/// Every operation takes the same lock, so a scan-and-mark can never race
/// another caller. Ports are not persisted; see `reserve_port` for how the
/// server seeds the set from the tenant database on startup.
pub struct PortAllocator {
    range: [u16; 2],
    allocated: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    pub fn new(range: [u16; 2]) -> Self {
        Self {
            range,
            allocated: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn range(&self) -> [u16; 2] {
        self.range
    }

    /// Claim the lowest free port in the range.
    pub fn allocate_port(&self) -> Result<u16, NoPortsAvailable> {
        let mut allocated = self.allocated.lock();
        for port in self.range[0]..=self.range[1] {
            if allocated.insert(port) {
                return Ok(port);
            }
        }
        Err(NoPortsAvailable {
            start: self.range[0],
            end: self.range[1],
        })
    }

    /// Return a port to the pool. Unknown or already released ports are ignored.
    pub fn release_port(&self, port: u16) {
        self.allocated.lock().remove(&port);
    }

    /// Mark a port as owned without scanning. Returns `false` when the port is
    /// outside the range or already taken.
    pub fn reserve_port(&self, port: u16) -> bool {
        if !(self.range[0]..=self.range[1]).contains(&port) {
            return false;
        }
        self.allocated.lock().insert(port)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.lock().len()
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_RANGE)
    }
}

/// Re-reserve the ports of every tenant that is not `Failed`, so a restart
/// never hands out a port a live tenant still listens on. Returns how many
/// ports were reserved.
pub async fn reconcile_ports(
    repo: &dyn TenantRepository,
    ports: &PortAllocator,
) -> anyhow::Result<usize> {
    let mut reserved = 0;
    for record in repo.list_with_ports().await? {
        if record.state == LifecycleState::Failed.as_str() {
            continue;
        }
        let Some(port) = record.port else { continue };
        if ports.reserve_port(port) {
            reserved += 1;
        } else {
            tracing::warn!("reconcile: port {} of {} not reserved", port, record.domain);
        }
    }
    Ok(reserved)
}
