//! Row transaction state machine.
//!
//! One [`RowTxn`] exists per row touched by a SET batch. It carries the
//! provisional row for a pending creation, the extracted row for a pending
//! destroy, staged value copies made during RESERVE2 and the undo log for
//! everything ACTION has applied. The phase ordering is enforced by an
//! explicit state machine; a phase call that arrives out of order is a
//! `GenErr`, not undefined behavior.

use crate::keeper::{check_type, Access, OType, OidErr};
use num_traits::cast::ToPrimitive;
use rasn_smi::v2::{ObjectSyntax, SimpleSyntax};

/// RowStatus textual convention (RFC 2579).
///
/// `CreateAndGo`, `CreateAndWait` and `Destroy` are transition requests and
/// never rest in a row; `NotReady` is reported by the agent but is not a
/// settable target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RowStatus {
    Active,
    NotInService,
    NotReady,
    CreateAndGo,
    CreateAndWait,
    Destroy,
}

impl RowStatus {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(RowStatus::Active),
            2 => Some(RowStatus::NotInService),
            3 => Some(RowStatus::NotReady),
            4 => Some(RowStatus::CreateAndGo),
            5 => Some(RowStatus::CreateAndWait),
            6 => Some(RowStatus::Destroy),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            RowStatus::Active => 1,
            RowStatus::NotInService => 2,
            RowStatus::NotReady => 3,
            RowStatus::CreateAndGo => 4,
            RowStatus::CreateAndWait => 5,
            RowStatus::Destroy => 6,
        }
    }

    /// Decode a settable RowStatus from a wire value. `NotReady` is
    /// reserved to the agent, so it is rejected here along with anything
    /// outside 1..6.
    pub fn from_set_value(value: &ObjectSyntax) -> Result<Self, OidErr> {
        if let ObjectSyntax::Simple(SimpleSyntax::Integer(i)) = value {
            let raw = i.to_i64().ok_or(OidErr::WrongValue)?;
            let status = RowStatus::from_i64(raw).ok_or(OidErr::WrongValue)?;
            if status == RowStatus::NotReady {
                return Err(OidErr::WrongValue);
            }
            Ok(status)
        } else {
            Err(OidErr::WrongType)
        }
    }
}

/// StorageType textual convention (RFC 2579).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StorageType {
    Other,
    Volatile,
    NonVolatile,
    Permanent,
    ReadOnly,
}

impl StorageType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(StorageType::Other),
            2 => Some(StorageType::Volatile),
            3 => Some(StorageType::NonVolatile),
            4 => Some(StorageType::Permanent),
            5 => Some(StorageType::ReadOnly),
            _ => None,
        }
    }

    pub fn from_syntax(value: &ObjectSyntax) -> Option<Self> {
        if let ObjectSyntax::Simple(SimpleSyntax::Integer(i)) = value {
            StorageType::from_i64(i.to_i64()?)
        } else {
            None
        }
    }

    /// Rows with these storage types survive an agent restart.
    pub fn is_durable(&self) -> bool {
        matches!(
            self,
            StorageType::NonVolatile | StorageType::Permanent | StorageType::ReadOnly
        )
    }
}

/// Write policy for one table column: declared type, access and the value
/// constraints RESERVE1 checks before anything is touched.
#[derive(Clone, Copy, Debug)]
pub struct ColumnPolicy {
    pub otype: OType,
    pub access: Access,
    pub min_len: usize,
    pub max_len: usize,
    /// Integer values accepted on write, if the column is so constrained.
    pub write_values: Option<&'static [i64]>,
}

const ROW_STATUS_SET_VALUES: [i64; 5] = [1, 2, 4, 5, 6];
const STORAGE_TYPE_SET_VALUES: [i64; 3] = [1, 2, 3];

impl ColumnPolicy {
    pub fn integer(access: Access) -> Self {
        ColumnPolicy {
            otype: OType::Integer,
            access,
            min_len: 0,
            max_len: usize::MAX,
            write_values: None,
        }
    }

    pub fn string(access: Access, min_len: usize, max_len: usize) -> Self {
        ColumnPolicy {
            otype: OType::String,
            access,
            min_len,
            max_len,
            write_values: None,
        }
    }

    /// RowStatus column: integers 1..6 on the wire, `notReady` never
    /// accepted as a target.
    pub fn row_status(access: Access) -> Self {
        ColumnPolicy {
            otype: OType::RowStatus,
            access,
            min_len: 0,
            max_len: usize::MAX,
            write_values: Some(&ROW_STATUS_SET_VALUES),
        }
    }

    /// StorageType column: only other, volatile and nonVolatile are
    /// accepted on write.
    pub fn storage_type(access: Access) -> Self {
        ColumnPolicy {
            otype: OType::StorageType,
            access,
            min_len: 0,
            max_len: usize::MAX,
            write_values: Some(&STORAGE_TYPE_SET_VALUES),
        }
    }

    pub fn writable(&self) -> bool {
        self.access == Access::ReadWrite || self.access == Access::ReadCreate
    }

    /// Syntax checks for RESERVE1: wire type, octet length, enumeration
    /// membership. State-dependent checks live in the table engine.
    pub fn validate(&self, value: &ObjectSyntax) -> Result<(), OidErr> {
        if !check_type(self.otype, value) {
            return Err(OidErr::WrongType);
        }
        if let ObjectSyntax::Simple(SimpleSyntax::String(s)) = value {
            if s.len() < self.min_len || s.len() > self.max_len {
                return Err(OidErr::WrongLength);
            }
        }
        if let Some(legal) = self.write_values {
            if let ObjectSyntax::Simple(SimpleSyntax::Integer(i)) = value {
                let raw = i.to_i64().ok_or(OidErr::WrongValue)?;
                if !legal.contains(&raw) {
                    return Err(OidErr::WrongValue);
                }
            }
        }
        Ok(())
    }
}

/// Named states of the per-row transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxnState {
    Idle,
    Reserved,
    Applied,
    Committed,
    RolledBack,
}

/// One reversible step recorded by ACTION.
#[derive(Debug)]
pub enum UndoOp {
    /// Put the prior value back into the named column.
    Restore { col: usize, prior: ObjectSyntax },
    /// Pull the provisional row back out of the store.
    RemoveProvisional,
    /// Re-insert the row extracted by a destroy.
    ReinsertExtracted,
}

/// Per-row transaction context for one SET batch.
///
/// Owned by the table keeper; dropped on FREE. Dropping it releases the
/// provisional row of an abandoned creation, so there is no leak path when
/// a batch dies between RESERVE1 and COMMIT.
#[derive(Debug)]
pub struct RowTxn {
    pub index: Vec<u32>,
    state: TxnState,
    /// RowStatus transition requested by this batch, if any.
    pub requested_status: Option<RowStatus>,
    /// Index column values decoded during RESERVE1 of a creation.
    pub identity: Option<Vec<ObjectSyntax>>,
    /// Row built at RESERVE2 for a pending creation. Moves into the store
    /// at ACTION.
    pub provisional: Option<Vec<ObjectSyntax>>,
    /// The provisional row currently sits in the store.
    pub inserted: bool,
    /// Row pulled out of the store by a destroy ACTION, kept for UNDO.
    pub extracted: Option<Vec<ObjectSyntax>>,
    /// Value copies made during RESERVE2, consumed by ACTION.
    staged: Vec<(usize, ObjectSyntax)>,
    undo_log: Vec<UndoOp>,
}

impl RowTxn {
    pub fn new(index: Vec<u32>) -> Self {
        RowTxn {
            index,
            state: TxnState::Idle,
            requested_status: None,
            identity: None,
            provisional: None,
            inserted: false,
            extracted: None,
            staged: Vec::new(),
            undo_log: Vec::new(),
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// RESERVE1 / RESERVE2 entry check.
    pub fn reserve(&mut self) -> Result<(), OidErr> {
        match self.state {
            TxnState::Idle | TxnState::Reserved => {
                self.state = TxnState::Reserved;
                Ok(())
            }
            _ => Err(OidErr::GenErr),
        }
    }

    /// ACTION entry check. Rejects ACTION with no prior RESERVE.
    pub fn apply(&mut self) -> Result<(), OidErr> {
        match self.state {
            TxnState::Reserved | TxnState::Applied => {
                self.state = TxnState::Applied;
                Ok(())
            }
            _ => Err(OidErr::GenErr),
        }
    }

    /// UNDO entry check. Legal after RESERVE (nothing applied yet) or
    /// ACTION; repeated per-field undo stays in `RolledBack`.
    pub fn roll_back(&mut self) -> Result<(), OidErr> {
        match self.state {
            TxnState::Reserved | TxnState::Applied | TxnState::RolledBack => {
                self.state = TxnState::RolledBack;
                Ok(())
            }
            _ => Err(OidErr::GenErr),
        }
    }

    /// COMMIT entry check; per-field commits keep the state at `Committed`.
    pub fn finalize(&mut self) -> Result<(), OidErr> {
        match self.state {
            TxnState::Applied | TxnState::Committed => {
                self.state = TxnState::Committed;
                Ok(())
            }
            _ => Err(OidErr::GenErr),
        }
    }

    /// Stage a value copy for `col`, allocating fallibly.
    pub fn stage(&mut self, col: usize, value: &ObjectSyntax) -> Result<(), OidErr> {
        if let ObjectSyntax::Simple(SimpleSyntax::String(s)) = value {
            let mut buf: Vec<u8> = Vec::new();
            buf.try_reserve_exact(s.len())
                .map_err(|_| OidErr::ResourceUnavailable)?;
            buf.extend_from_slice(s);
            self.staged.push((
                col,
                ObjectSyntax::Simple(SimpleSyntax::String(buf.into())),
            ));
        } else {
            self.staged.push((col, value.clone()));
        }
        Ok(())
    }

    /// Take the staged copy for `col`, if RESERVE2 made one.
    pub fn take_staged(&mut self, col: usize) -> Option<ObjectSyntax> {
        let pos = self.staged.iter().position(|(c, _)| *c == col)?;
        Some(self.staged.remove(pos).1)
    }

    pub fn record(&mut self, op: UndoOp) {
        self.undo_log.push(op);
    }

    /// Pop the most recent undo entry belonging to `col`. Lifecycle
    /// entries (provisional / extracted rows) belong to the status column.
    pub fn take_undo(&mut self, col: usize, status_col: usize) -> Option<UndoOp> {
        let pos = self.undo_log.iter().rposition(|op| match op {
            UndoOp::Restore { col: c, .. } => *c == col,
            UndoOp::RemoveProvisional | UndoOp::ReinsertExtracted => col == status_col,
        })?;
        Some(self.undo_log.remove(pos))
    }

    /// Drop undo state for `col` once that field is committed.
    pub fn discard_undo(&mut self, col: usize, status_col: usize) {
        self.undo_log.retain(|op| match op {
            UndoOp::Restore { col: c, .. } => *c != col,
            UndoOp::RemoveProvisional | UndoOp::ReinsertExtracted => col != status_col,
        });
    }

    pub fn creation_pending(&self) -> bool {
        matches!(
            self.requested_status,
            Some(RowStatus::CreateAndGo) | Some(RowStatus::CreateAndWait)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasn::types::{Integer, OctetString};

    fn simple_from_int(value: i32) -> ObjectSyntax {
        ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(value)))
    }

    fn simple_from_str(value: &'static [u8]) -> ObjectSyntax {
        ObjectSyntax::Simple(SimpleSyntax::String(OctetString::from_static(value)))
    }

    #[test]
    fn not_ready_is_not_settable() {
        let res = RowStatus::from_set_value(&simple_from_int(3));
        assert_eq!(res, Err(OidErr::WrongValue));
        let res = RowStatus::from_set_value(&simple_from_int(7));
        assert_eq!(res, Err(OidErr::WrongValue));
        let res = RowStatus::from_set_value(&simple_from_int(6));
        assert_eq!(res, Ok(RowStatus::Destroy));
    }

    #[test]
    fn storage_type_durability() {
        assert!(!StorageType::Volatile.is_durable());
        assert!(!StorageType::Other.is_durable());
        assert!(StorageType::NonVolatile.is_durable());
        assert!(StorageType::Permanent.is_durable());
    }

    #[test]
    fn string_policy_length_bounds() {
        let pol = ColumnPolicy::string(Access::ReadCreate, 1, 4);
        assert_eq!(pol.validate(&simple_from_str(b"ab")), Ok(()));
        assert_eq!(pol.validate(&simple_from_str(b"")), Err(OidErr::WrongLength));
        assert_eq!(
            pol.validate(&simple_from_str(b"abcde")),
            Err(OidErr::WrongLength)
        );
        assert_eq!(
            pol.validate(&simple_from_int(2)),
            Err(OidErr::WrongType)
        );
    }

    #[test]
    fn storage_policy_write_values() {
        let pol = ColumnPolicy::storage_type(Access::ReadCreate);
        assert_eq!(pol.validate(&simple_from_int(3)), Ok(()));
        assert_eq!(pol.validate(&simple_from_int(4)), Err(OidErr::WrongValue));
        assert_eq!(pol.validate(&simple_from_int(0)), Err(OidErr::WrongValue));
    }

    #[test]
    fn phase_order_is_enforced() {
        let mut txn = RowTxn::new(vec![1]);
        assert_eq!(txn.state(), TxnState::Idle);
        // ACTION before RESERVE is detected
        assert_eq!(txn.apply(), Err(OidErr::GenErr));
        assert_eq!(txn.reserve(), Ok(()));
        assert_eq!(txn.reserve(), Ok(()));
        assert_eq!(txn.apply(), Ok(()));
        // RESERVE after ACTION is a protocol violation
        assert_eq!(txn.reserve(), Err(OidErr::GenErr));
        assert_eq!(txn.finalize(), Ok(()));
        assert_eq!(txn.state(), TxnState::Committed);
        // COMMIT then UNDO makes no sense
        assert_eq!(txn.roll_back(), Err(OidErr::GenErr));
    }

    #[test]
    fn rollback_from_reserved() {
        let mut txn = RowTxn::new(vec![1]);
        txn.reserve().unwrap();
        assert_eq!(txn.roll_back(), Ok(()));
        assert_eq!(txn.state(), TxnState::RolledBack);
        assert_eq!(txn.finalize(), Err(OidErr::GenErr));
    }

    #[test]
    fn staged_values_are_taken_once() {
        let mut txn = RowTxn::new(vec![1]);
        txn.stage(2, &simple_from_str(b"abc")).unwrap();
        assert_eq!(txn.take_staged(2), Some(simple_from_str(b"abc")));
        assert_eq!(txn.take_staged(2), None);
    }

    #[test]
    fn undo_entries_pop_per_column() {
        let mut txn = RowTxn::new(vec![1]);
        txn.record(UndoOp::Restore {
            col: 2,
            prior: simple_from_str(b"old"),
        });
        txn.record(UndoOp::RemoveProvisional);
        // status column owns the lifecycle entry
        assert!(matches!(
            txn.take_undo(4, 4),
            Some(UndoOp::RemoveProvisional)
        ));
        assert!(matches!(
            txn.take_undo(2, 4),
            Some(UndoOp::Restore { col: 2, .. })
        ));
        assert!(txn.take_undo(2, 4).is_none());
    }
}
