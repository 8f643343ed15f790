//! Processing element (physical CPU core) of a host.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Allocation state of a processing element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PeStatus {
    Free,
    Busy,
    Failed,
}

impl Display for PeStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PeStatus::Free => write!(f, "free"),
            PeStatus::Busy => write!(f, "busy"),
            PeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Single CPU core with fixed MIPS capacity.
///
/// The allocated amount is only changed by the VM scheduler of the host owning the core
/// and never exceeds the core capacity.
#[derive(Clone, Debug, Serialize)]
pub struct Pe {
    capacity: f64,
    allocated: f64,
    status: PeStatus,
}

impl Pe {
    pub fn new(capacity: f64) -> Self {
        Self {
            capacity,
            allocated: 0.,
            status: PeStatus::Free,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn allocated_mips(&self) -> f64 {
        self.allocated
    }

    /// Returns the unallocated capacity, which is zero for failed cores.
    pub fn available_mips(&self) -> f64 {
        if self.is_working() {
            (self.capacity - self.allocated).max(0.)
        } else {
            0.
        }
    }

    pub fn status(&self) -> PeStatus {
        self.status
    }

    pub fn is_working(&self) -> bool {
        self.status != PeStatus::Failed
    }

    pub fn is_free(&self) -> bool {
        self.status == PeStatus::Free
    }

    /// Takes up to `mips` from the available capacity and returns the amount actually taken.
    pub(crate) fn allocate(&mut self, mips: f64) -> f64 {
        let taken = mips.min(self.available_mips()).max(0.);
        if taken > 0. {
            self.allocated += taken;
            self.status = PeStatus::Busy;
        }
        taken
    }

    /// Marks the core busy without changing its allocated amount.
    pub(crate) fn reserve(&mut self) {
        if self.is_working() {
            self.status = PeStatus::Busy;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.allocated = 0.;
        if self.is_working() {
            self.status = PeStatus::Free;
        }
    }

    pub(crate) fn set_failed(&mut self) {
        self.allocated = 0.;
        self.status = PeStatus::Failed;
    }
}

/// Creates `count` identical cores.
pub fn make_pes(count: u32, mips_per_pe: f64) -> Vec<Pe> {
    (0..count).map(|_| Pe::new(mips_per_pe)).collect()
}
