use approx::assert_abs_diff_eq;
use rand::prelude::*;
use rand_pcg::Pcg64;

use dslab_vm_allocation::core::load_model::ConstantLoadModel;
use dslab_vm_allocation::core::pe::{make_pes, Pe, PeStatus};
use dslab_vm_allocation::core::vm::Vm;
use dslab_vm_allocation::core::vm_scheduler::VmScheduler;
use dslab_vm_allocation::core::vm_schedulers::space_shared::VmSchedulerSpaceShared;
use dslab_vm_allocation::core::vm_schedulers::time_shared::{share_capacity, VmSchedulerTimeShared};

fn vm(id: u32, pes: u32, mips: f64) -> Vm {
    Vm::new(id, pes, mips, 1024, 100, 1000)
}

fn check_capacity(pes: &[Pe]) {
    for pe in pes {
        assert!(pe.allocated_mips() <= pe.capacity() + 1e-9);
    }
}

#[test]
// Three equal VMs on a single core divide it equally.
fn test_oversubscription_equal_requests() {
    let mut pes = make_pes(1, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    for id in 0..3 {
        assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(id, 1, 1000.), &[1000.]));
    }
    for id in 0..3 {
        assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(id), 333.3, epsilon = 0.5);
    }
    check_capacity(&pes);
    assert_abs_diff_eq!(scheduler.available_mips(&pes), 0., epsilon = 1e-6);
}

#[test]
// Small request is satisfied in full, the rest is divided proportionally.
fn test_oversubscription_unequal_requests() {
    let mut pes = make_pes(1, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    scheduler.allocate_pes_for_vm(&mut pes, &vm(0, 1, 1000.), &[100.]);
    scheduler.allocate_pes_for_vm(&mut pes, &vm(1, 1, 1000.), &[600.]);
    scheduler.allocate_pes_for_vm(&mut pes, &vm(2, 1, 1000.), &[900.]);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(0), 100., epsilon = 1e-6);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(1), 360., epsilon = 1e-6);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(2), 540., epsilon = 1e-6);
    assert_abs_diff_eq!(scheduler.total_requested_mips(), 1600., epsilon = 1e-9);
    check_capacity(&pes);
}

#[test]
fn test_share_spans_neighboring_cores() {
    let mut pes = make_pes(2, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(0, 2, 1000.), &[600., 600.]));
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(1, 1, 1000.), &[600.]));
    assert_eq!(scheduler.allocated_mips(0), vec![600., 600.]);
    assert_eq!(scheduler.allocated_mips(1), vec![600.]);
    assert_abs_diff_eq!(pes[0].allocated_mips(), 1000., epsilon = 1e-9);
    assert_abs_diff_eq!(pes[1].allocated_mips(), 800., epsilon = 1e-9);
    assert_abs_diff_eq!(scheduler.available_mips(&pes), 200., epsilon = 1e-9);
    assert_abs_diff_eq!(scheduler.max_available_mips(&pes), 200., epsilon = 1e-9);
}

#[test]
// A vPE can't get more than a single core.
fn test_request_capped_by_core_capacity() {
    let mut pes = make_pes(4, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(0, 1, 1500.), &[1500.]));
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(0), 1000., epsilon = 1e-9);
}

#[test]
fn test_repeated_allocation_is_idempotent() {
    let mut pes = make_pes(2, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    let vm0 = vm(0, 2, 1000.);
    let vm1 = vm(1, 1, 1000.);
    scheduler.allocate_pes_for_vm(&mut pes, &vm0, &[800., 800.]);
    scheduler.allocate_pes_for_vm(&mut pes, &vm1, &[900.]);
    let first = scheduler.allocated_mips(0);
    let available = scheduler.available_mips(&pes);
    scheduler.allocate_pes_for_vm(&mut pes, &vm0, &[800., 800.]);
    assert_eq!(scheduler.allocated_mips(0), first);
    assert_eq!(scheduler.available_mips(&pes), available);
    assert_eq!(scheduler.state().vm_count(), 2);
    check_capacity(&pes);
}

#[test]
// VM requesting 250 MIPS while migrating in gets 90% of it.
fn test_migration_overhead() {
    let mut pes = make_pes(2, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    let migrating = Vm::with_load_model(0, 1, 1000., 1024, 100, 1000, Box::new(ConstantLoadModel::new(0.25)));
    scheduler.add_vm_migrating_in(&mut pes, migrating.id);
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &migrating, &migrating.current_requested_mips(0.)));
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(0), 225., epsilon = 1e-9);
    assert!(scheduler.vms_migrating_in().contains(&0));

    scheduler.remove_vm_migrating_in(&mut pes, 0);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(0), 250., epsilon = 1e-9);

    scheduler.add_vm_migrating_out(&mut pes, 0);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(0), 225., epsilon = 1e-9);
    assert!(scheduler.vms_migrating_out().contains(&0));
}

#[test]
// Overhead is applied after the capacity is divided.
fn test_migration_overhead_under_oversubscription() {
    let mut pes = make_pes(1, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    scheduler.allocate_pes_for_vm(&mut pes, &vm(0, 1, 1000.), &[1000.]);
    scheduler.add_vm_migrating_out(&mut pes, 0);
    scheduler.allocate_pes_for_vm(&mut pes, &vm(1, 1, 1000.), &[1000.]);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(0), 450., epsilon = 1e-9);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(1), 500., epsilon = 1e-9);
}

#[test]
fn test_not_enough_pes() {
    let mut pes = make_pes(2, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    let big = vm(0, 3, 100.);
    assert!(!scheduler.is_suitable_for_vm(&pes, &big));
    assert!(!scheduler.allocate_pes_for_vm(&mut pes, &big, &[100., 100., 100.]));
    assert!(!scheduler.state().contains(0));
    // admission doesn't depend on free MIPS
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(1, 2, 1000.), &[1000., 1000.]));
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(2, 2, 1000.), &[1000., 1000.]));
    assert!(!scheduler.is_suitable_for_vm(&pes, &vm(3, 1, 1000.)));
    check_capacity(&pes);
}

#[test]
fn test_deallocate_all_restores_capacity() {
    let mut pes = make_pes(4, 500.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    for id in 0..5 {
        scheduler.allocate_pes_for_vm(&mut pes, &vm(id, 2, 500.), &[500., 300.]);
    }
    scheduler.add_vm_migrating_out(&mut pes, 3);
    check_capacity(&pes);
    scheduler.deallocate_pes_for_vm(&mut pes, 1);
    assert!(scheduler.allocated_mips(1).is_empty());
    scheduler.deallocate_pes_for_all_vms(&mut pes);
    assert_eq!(scheduler.available_mips(&pes), 2000.);
    assert_eq!(scheduler.total_allocated_mips(), 0.);
    assert!(scheduler.vms_migrating_out().is_empty());
    assert!(pes.iter().all(|pe| pe.status() == PeStatus::Free));
}

#[test]
fn test_share_capacity_random_requests() {
    let mut rand = Pcg64::seed_from_u64(123);
    for _ in 0..500 {
        let n = rand.gen_range(1..20);
        let requests: Vec<f64> = (0..n).map(|_| rand.gen_range(0. ..2000.)).collect();
        let capacity = rand.gen_range(100. ..10000.);
        let shares = share_capacity(&requests, capacity);
        let total_request: f64 = requests.iter().sum();
        let total_share: f64 = shares.iter().sum();

        assert_eq!(shares.len(), requests.len());
        assert!(total_share <= capacity + 1e-6);
        if total_request <= capacity {
            assert_eq!(shares, requests);
        } else {
            assert_abs_diff_eq!(total_share, capacity, epsilon = 1e-6);
        }
        for (share, request) in shares.iter().zip(&requests) {
            assert!(*share >= 0.);
            assert!(*share <= request + 1e-9);
            if *request <= capacity / n as f64 {
                assert_abs_diff_eq!(*share, *request, epsilon = 1e-9);
            }
        }
        assert_eq!(share_capacity(&requests, capacity), shares);
    }
}

#[test]
fn test_capacity_invariant_random_load() {
    let mut rand = Pcg64::seed_from_u64(456);
    let mut pes = make_pes(8, 1000.);
    let mut scheduler = VmSchedulerTimeShared::new(0.1).unwrap();
    for step in 0..200 {
        let id = rand.gen_range(0..12);
        if rand.gen_bool(0.2) {
            scheduler.deallocate_pes_for_vm(&mut pes, id);
        } else {
            let vpes = rand.gen_range(1..5);
            let request: Vec<f64> = (0..vpes).map(|_| rand.gen_range(0. ..1200.)).collect();
            assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(id, vpes, 1000.), &request));
        }
        if step % 7 == 0 {
            scheduler.add_vm_migrating_in(&mut pes, id);
        }
        check_capacity(&pes);
        assert!(scheduler.total_allocated_mips() <= 8000. + 1e-6);
    }
}

#[test]
fn test_space_shared() {
    let mut pes = make_pes(4, 1000.);
    let mut scheduler = VmSchedulerSpaceShared::new(0.1).unwrap();
    assert!(scheduler.dedicates_pes());
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(0, 2, 1000.), &[700., 1000.]));
    assert_eq!(scheduler.assigned_pes(0), &[0, 1]);
    assert_eq!(scheduler.allocated_mips(0), vec![700., 1000.]);
    assert_eq!(scheduler.available_mips(&pes), 2000.);

    // cores are not shared
    assert!(!scheduler.is_suitable_for_vm(&pes, &vm(1, 3, 100.)));
    assert!(!scheduler.allocate_pes_for_vm(&mut pes, &vm(1, 3, 100.), &[100., 100., 100.]));
    // core capacity must cover the request
    assert!(!scheduler.allocate_pes_for_vm(&mut pes, &vm(2, 1, 1500.), &[1500.]));

    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(3, 2, 500.), &[500., 500.]));
    assert_eq!(scheduler.assigned_pes(3), &[2, 3]);
    assert_eq!(scheduler.available_mips(&pes), 0.);
    assert!(pes.iter().all(|pe| pe.status() == PeStatus::Busy));

    scheduler.add_vm_migrating_out(&mut pes, 3);
    assert_abs_diff_eq!(scheduler.total_allocated_mips_for_vm(3), 900., epsilon = 1e-9);

    scheduler.deallocate_pes_for_vm(&mut pes, 0);
    assert_eq!(scheduler.available_mips(&pes), 2000.);
    assert_eq!(scheduler.max_available_mips(&pes), 1000.);
    assert!(scheduler.allocate_pes_for_vm(&mut pes, &vm(1, 2, 100.), &[100., 100.]));
    assert_eq!(scheduler.assigned_pes(1), &[0, 1]);
    check_capacity(&pes);
}

#[test]
fn test_bad_overhead() {
    assert!(VmSchedulerTimeShared::new(-0.1).is_err());
    assert!(VmSchedulerSpaceShared::new(1.5).is_err());
    assert!(VmSchedulerTimeShared::new(f64::NAN).is_err());
}
