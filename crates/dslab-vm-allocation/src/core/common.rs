//! Common identifiers and types.

use serde::Serialize;

/// Index of a host inside the resource pool.
pub type HostId = u32;

/// Identifier of a virtual machine.
pub type VmId = u32;

/// Per-vPE MIPS request or allocation of a single VM.
pub type MipsShare = Vec<f64>;

/// Outcome of checking whether a VM fits on a host.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum AllocationVerdict {
    NotEnoughPes,
    NotEnoughMips,
    NotEnoughMemory,
    NotEnoughBandwidth,
    NotEnoughStorage,
    Success,
}

/// Sums the MIPS of a share.
pub fn total_mips(share: &[f64]) -> f64 {
    share.iter().sum()
}
