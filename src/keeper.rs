//! Shared types for objects registered in the OID map.
//!
//! Every managed object (scalar or table) implements [`OidKeeper`]. Writes
//! go through a phased protocol driven by the batch coordinator in the
//! `batch` module: RESERVE1 and RESERVE2 validate and acquire resources,
//! ACTION applies reversibly, UNDO rolls back, COMMIT finalizes and FREE
//! releases whatever is left. COMMIT and FREE must not fail; any trouble
//! there is logged by the driver rather than returned to the manager.

use rasn::types::ObjectIdentifier;
use rasn_smi::v2::{ApplicationSyntax, ObjectSyntax, SimpleSyntax};
use rasn_snmp::v3::{VarBind, VarBindValue};

/// MAX-ACCESS clause of an object, reduced to what the agent needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Access {
    NoAccess,
    NotificationOnly,
    ReadOnly,
    ReadWrite,
    ReadCreate,
}

/// Wire type tag for a managed object.
///
/// `RowStatus` and `StorageType` are integers on the wire, but carry
/// textual-convention semantics the table engine cares about, so they get
/// their own tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OType {
    Integer,
    String,
    ObjectId,
    Address,
    Unsigned,
    Arbitrary,
    Counter,
    BigCounter,
    Ticks,
    RowStatus,
    StorageType,
}

/// Check that a decoded value matches the declared type of the object.
pub fn check_type(otype: OType, value: &ObjectSyntax) -> bool {
    match value {
        ObjectSyntax::Simple(SimpleSyntax::Integer(_)) => matches!(
            otype,
            OType::Integer | OType::RowStatus | OType::StorageType
        ),
        ObjectSyntax::Simple(SimpleSyntax::String(_)) => otype == OType::String,
        ObjectSyntax::Simple(SimpleSyntax::ObjectId(_)) => otype == OType::ObjectId,
        ObjectSyntax::ApplicationWide(ApplicationSyntax::Address(_)) => otype == OType::Address,
        ObjectSyntax::ApplicationWide(ApplicationSyntax::Unsigned(_)) => otype == OType::Unsigned,
        ObjectSyntax::ApplicationWide(ApplicationSyntax::Arbitrary(_)) => {
            otype == OType::Arbitrary
        }
        ObjectSyntax::ApplicationWide(ApplicationSyntax::Counter(_)) => otype == OType::Counter,
        ObjectSyntax::ApplicationWide(ApplicationSyntax::BigCounter(_)) => {
            otype == OType::BigCounter
        }
        ObjectSyntax::ApplicationWide(ApplicationSyntax::Ticks(_)) => otype == OType::Ticks,
    }
}

/// Error conditions raised by keepers.
///
/// Most variants correspond directly to RFC 3416 error-status values, see
/// [`OidErr::error_status`]. `NoSuchInstance` and `OutOfRange` are used by
/// the read path (GET / GETNEXT walking) and never escape a SET batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OidErr {
    /// Value's declared type does not match the object's type.
    WrongType,
    /// Value size is invalid for the object.
    WrongLength,
    /// Value outside the legal set for the object.
    WrongValue,
    /// No row can ever be created under this name.
    NoCreation,
    /// Value conflicts with the current state of the row.
    InconsistentValue,
    /// Index portion of the name cannot be decoded.
    InconsistentName,
    /// Allocation failed during RESERVE2.
    ResourceUnavailable,
    /// Name does not resolve to a writable instance.
    NoSuchName,
    /// Name resolves below a keeper but not to an instance.
    NoSuchInstance,
    /// Object is not writable at all.
    NotWritable,
    /// Object is not readable.
    NoAccess,
    /// Walked off the end of this keeper's subtree.
    OutOfRange,
    /// Internal invariant violated, including out-of-order phase calls.
    GenErr,
}

impl OidErr {
    /// RFC 3416 error-status code reported to the manager.
    pub fn error_status(&self) -> u32 {
        match self {
            OidErr::NoSuchName | OidErr::NoSuchInstance | OidErr::OutOfRange => 2,
            OidErr::GenErr => 5,
            OidErr::NoAccess => 6,
            OidErr::WrongType => 7,
            OidErr::WrongLength => 8,
            OidErr::WrongValue => 10,
            OidErr::NoCreation => 11,
            OidErr::InconsistentValue => 12,
            OidErr::ResourceUnavailable => 13,
            OidErr::NotWritable => 17,
            OidErr::InconsistentName => 18,
        }
    }
}

/// A managed object: one scalar or one table subtree.
///
/// The write protocol is phase-major across a SET batch: the driver calls
/// `reserve1` for every binding, then `reserve2` for every binding, then
/// `action`; only when every `action` has succeeded does any `commit` run.
/// `undo` is called for each binding whose `action` ran when a later
/// binding fails. `free` runs exactly once per keeper at the end of the
/// batch, whatever the outcome.
pub trait OidKeeper {
    fn is_scalar(&self, oid: ObjectIdentifier) -> bool;

    fn get(&self, oid: ObjectIdentifier) -> Result<VarBindValue, OidErr>;

    fn get_next(&self, oid: ObjectIdentifier) -> Result<VarBind, OidErr>;

    fn access(&self, oid: ObjectIdentifier) -> Access;

    /// Validate the value against the object's syntax and current state.
    /// Performs no mutation.
    fn reserve1(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr>;

    /// Acquire memory for the staged value. For row creation this builds
    /// the provisional row.
    fn reserve2(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr>;

    /// Apply the change, keeping enough state to reverse it.
    fn action(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr>;

    /// Reverse this binding's `action`. An error here means the phase
    /// sequence was violated; the driver logs it.
    fn undo(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr>;

    /// Finalize. Must not fail; an error return is logged, never surfaced.
    fn commit(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr>;

    /// Drop any scratch state left over from the batch.
    fn free(&mut self);

    /// Single-binding convenience running the whole phase sequence.
    fn set(&mut self, oid: ObjectIdentifier, value: VarBindValue) -> Result<VarBindValue, OidErr> {
        let staged = self
            .reserve1(oid.clone(), &value)
            .and_then(|_| self.reserve2(oid.clone(), &value));
        if let Err(err) = staged {
            self.free();
            return Err(err);
        }
        if let Err(err) = self.action(oid.clone(), &value) {
            self.free();
            return Err(err);
        }
        let commit_res = self.commit(oid);
        self.free();
        commit_res?;
        Ok(value)
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
    fn integer_tags_cover_textual_conventions() {
        let v = simple_from_int(1);
        assert!(check_type(OType::Integer, &v));
        assert!(check_type(OType::RowStatus, &v));
        assert!(check_type(OType::StorageType, &v));
        assert!(!check_type(OType::String, &v));
    }

    #[test]
    fn string_tag_rejects_integer() {
        let v = simple_from_str(b"abc");
        assert!(check_type(OType::String, &v));
        assert!(!check_type(OType::Integer, &v));
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(OidErr::WrongType.error_status(), 7);
        assert_eq!(OidErr::WrongLength.error_status(), 8);
        assert_eq!(OidErr::WrongValue.error_status(), 10);
        assert_eq!(OidErr::InconsistentValue.error_status(), 12);
        assert_eq!(OidErr::InconsistentName.error_status(), 18);
        assert_eq!(OidErr::NotWritable.error_status(), 17);
        assert_eq!(OidErr::GenErr.error_status(), 5);
    }
}
