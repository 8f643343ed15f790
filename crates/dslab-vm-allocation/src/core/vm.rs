//! Representation of virtual machine and its migration state.

use std::fmt::{Display, Formatter};

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::core::common::{HostId, MipsShare, VmId};
use crate::core::config::DEFAULT_UTILIZATION_HISTORY_SIZE;
use crate::core::load_model::{ConstantLoadModel, LoadModel};
use crate::core::utilization_history::UtilizationHistory;

/// Migration state of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MigrationState {
    None,
    MigratingIn,
    MigratingOut,
}

impl Display for MigrationState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            MigrationState::None => write!(f, "none"),
            MigrationState::MigratingIn => write!(f, "migrating_in"),
            MigrationState::MigratingOut => write!(f, "migrating_out"),
        }
    }
}

/// Represents virtual machine (VM).
///
// VM is characterized by its ID and resource requirements (vPEs, MIPS per vPE, memory, bandwidth and storage).
// The CPU load model defines the fraction of requested MIPS actually demanded at each moment, so the demand of a VM
// may be much lower than its capacity.
#[derive(Clone)]
pub struct Vm {
    pub id: VmId,
    pes: u32,
    mips_per_pe: f64,
    ram: u64,
    bw: u64,
    storage: u64,
    host: Option<HostId>,
    migration_state: MigrationState,
    start_time: f64,
    cpu_load_model: Box<dyn LoadModel>,
    utilization_history: UtilizationHistory,
}

impl Serialize for Vm {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Vm", 6)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("pes", &self.pes)?;
        state.serialize_field("mips_per_pe", &self.mips_per_pe)?;
        state.serialize_field("ram", &self.ram)?;
        state.serialize_field("host", &self.host)?;
        state.serialize_field("migration_state", &self.migration_state)?;
        state.end()
    }
}

impl Vm {
    /// Creates VM with full constant CPU load.
    pub fn new(id: VmId, pes: u32, mips_per_pe: f64, ram: u64, bw: u64, storage: u64) -> Self {
        Self::with_load_model(
            id,
            pes,
            mips_per_pe,
            ram,
            bw,
            storage,
            Box::new(ConstantLoadModel::new(1.)),
        )
    }

    /// Creates VM whose CPU demand follows the given load model.
    pub fn with_load_model(
        id: VmId,
        pes: u32,
        mips_per_pe: f64,
        ram: u64,
        bw: u64,
        storage: u64,
        cpu_load_model: Box<dyn LoadModel>,
    ) -> Self {
        Self {
            id,
            pes,
            mips_per_pe,
            ram,
            bw,
            storage,
            host: None,
            migration_state: MigrationState::None,
            start_time: 0.,
            cpu_load_model,
            utilization_history: UtilizationHistory::new(DEFAULT_UTILIZATION_HISTORY_SIZE),
        }
    }

    pub fn pes(&self) -> u32 {
        self.pes
    }

    pub fn mips_per_pe(&self) -> f64 {
        self.mips_per_pe
    }

    pub fn ram(&self) -> u64 {
        self.ram
    }

    pub fn bw(&self) -> u64 {
        self.bw
    }

    pub fn storage(&self) -> u64 {
        self.storage
    }

    /// Returns host where VM currently resides. During migration this is the source host.
    pub fn host(&self) -> Option<HostId> {
        self.host
    }

    pub fn is_created(&self) -> bool {
        self.host.is_some()
    }

    pub fn migration_state(&self) -> MigrationState {
        self.migration_state
    }

    pub fn is_in_migration(&self) -> bool {
        self.migration_state != MigrationState::None
    }

    /// Sets migration state. Normally it is changed by the resource pool when a migration starts or completes.
    pub fn set_migration_state(&mut self, state: MigrationState) {
        self.migration_state = state;
    }

    /// Returns the peak MIPS the VM may request (all vPEs at full speed).
    pub fn total_mips_capacity(&self) -> f64 {
        self.pes as f64 * self.mips_per_pe
    }

    /// Returns the fraction of VM CPU capacity demanded at the given time.
    pub fn cpu_utilization(&self, time: f64) -> f64 {
        self.cpu_load_model
            .get_resource_load(time, time - self.start_time)
            .clamp(0., 1.)
    }

    /// Returns the current per-vPE MIPS request.
    pub fn current_requested_mips(&self, time: f64) -> MipsShare {
        let mips = self.mips_per_pe * self.cpu_utilization(time);
        vec![mips; self.pes as usize]
    }

    /// Returns the full-speed per-vPE MIPS request.
    pub fn peak_requested_mips(&self) -> MipsShare {
        vec![self.mips_per_pe; self.pes as usize]
    }

    pub fn utilization_history(&self) -> &UtilizationHistory {
        &self.utilization_history
    }

    /// Replaces utilization history with an empty one of the given size.
    pub fn set_history_size(&mut self, size: usize) {
        self.utilization_history = UtilizationHistory::new(size);
    }

    pub fn record_utilization(&mut self, time: f64, utilization: f64) {
        self.utilization_history.add(time, utilization);
    }

    pub(crate) fn set_host(&mut self, host: Option<HostId>, time: f64) {
        if self.host.is_none() && host.is_some() {
            self.start_time = time;
        }
        self.host = host;
    }

    pub(crate) fn set_pes(&mut self, pes: u32) {
        self.pes = pes;
    }

    pub(crate) fn set_ram(&mut self, ram: u64) {
        self.ram = ram;
    }

    pub(crate) fn set_bw(&mut self, bw: u64) {
        self.bw = bw;
    }

    /// Returns a copy of this VM with a different number of vPEs, used to probe scheduler capacity.
    pub(crate) fn with_pes(&self, pes: u32) -> Self {
        let mut probe = self.clone();
        probe.pes = pes;
        probe
    }
}
