//! SET batch coordinator.
//!
//! Runs the phased write protocol across every variable binding of one
//! SET request. Validation is phase-major: every binding passes RESERVE1
//! before any RESERVE2 runs, and every binding passes both reserves
//! before the first ACTION touches anything. The first failure aborts the
//! batch: bindings whose ACTION already ran receive UNDO in reverse
//! order, and the manager sees a single error-status with the 1-based
//! index of the offending binding. COMMIT and FREE never surface errors;
//! problems there are logged.
//!
//! The caller serializes batches — at most one is in flight at a time.

use crate::keeper::{Access, OidErr};
use crate::oidmap::OidMap;
use log::{debug, error};
use rasn_snmp::v3::VarBind;

/// What the manager is told when a batch fails: RFC 3416 error-status
/// and the index of the binding that caused it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SetFailure {
    pub status: u32,
    pub index: u32,
}

impl SetFailure {
    fn new(err: OidErr, pos: usize) -> Self {
        SetFailure {
            status: err.error_status(),
            index: (pos + 1) as u32,
        }
    }
}

/// Apply one SET request. On success the bindings are returned unchanged
/// for the response PDU; on failure the table state is exactly what it
/// was before the request arrived.
pub fn apply_set_batch(
    oid_map: &mut OidMap,
    bindings: Vec<VarBind>,
) -> Result<Vec<VarBind>, SetFailure> {
    // Resolve every binding to its keeper before starting any phase.
    let mut targets: Vec<usize> = Vec::with_capacity(bindings.len());
    for (pos, vbind) in bindings.iter().enumerate() {
        let which = match oid_map.covering(&vbind.name) {
            Some(which) => which,
            None => return Err(SetFailure::new(OidErr::NoSuchName, pos)),
        };
        let keeper = oid_map.idx(which);
        match keeper.access(vbind.name.clone()) {
            Access::ReadWrite | Access::ReadCreate => targets.push(which),
            _ => return Err(SetFailure::new(OidErr::NotWritable, pos)),
        }
    }

    // RESERVE1: pure validation, nothing is touched yet.
    for (pos, vbind) in bindings.iter().enumerate() {
        let keeper = oid_map.idx(targets[pos]);
        if let Err(err) = keeper.reserve1(vbind.name.clone(), &vbind.value) {
            debug!("RESERVE1 refused binding {0}: {err:?}", pos + 1);
            free_all(oid_map, &targets);
            return Err(SetFailure::new(err, pos));
        }
    }

    // RESERVE2: memory reservation, final preparation.
    for (pos, vbind) in bindings.iter().enumerate() {
        let keeper = oid_map.idx(targets[pos]);
        if let Err(err) = keeper.reserve2(vbind.name.clone(), &vbind.value) {
            debug!("RESERVE2 refused binding {0}: {err:?}", pos + 1);
            free_all(oid_map, &targets);
            return Err(SetFailure::new(err, pos));
        }
    }

    // ACTION: reversible application.
    let mut applied: Vec<usize> = Vec::with_capacity(bindings.len());
    for (pos, vbind) in bindings.iter().enumerate() {
        let keeper = oid_map.idx(targets[pos]);
        match keeper.action(vbind.name.clone(), &vbind.value) {
            Ok(()) => applied.push(pos),
            Err(err) => {
                debug!("ACTION failed for binding {0}: {err:?}", pos + 1);
                for p in applied.iter().rev() {
                    let keeper = oid_map.idx(targets[*p]);
                    if let Err(uerr) = keeper.undo(bindings[*p].name.clone()) {
                        error!("UNDO failed for binding {0}: {uerr:?}", p + 1);
                    }
                }
                free_all(oid_map, &targets);
                return Err(SetFailure::new(err, pos));
            }
        }
    }

    // COMMIT: must not fail. Anything that goes wrong here is logged and
    // the batch still reports success.
    for (pos, vbind) in bindings.iter().enumerate() {
        let keeper = oid_map.idx(targets[pos]);
        if let Err(err) = keeper.commit(vbind.name.clone()) {
            error!("COMMIT failed for binding {0}: {err:?}", pos + 1);
        }
    }
    free_all(oid_map, &targets);
    Ok(bindings)
}

/// FREE runs once per keeper involved in the batch, success or not.
fn free_all(oid_map: &mut OidMap, targets: &[usize]) {
    let mut seen: Vec<usize> = Vec::new();
    for which in targets {
        if !seen.contains(which) {
            seen.push(*which);
            oid_map.idx(*which).free();
        }
    }
}
