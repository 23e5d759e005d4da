//! Simplistic scalar stored in memory.
//!
//! Scalars take part in the same phased write protocol as tables, but the
//! bookkeeping is much lighter: RESERVE1 validates, ACTION swaps the value
//! keeping the old one for UNDO, and COMMIT drops the snapshot. The
//! persistent variant writes its value through to a file on COMMIT.

use crate::keeper::{check_type, Access, OType, OidErr, OidKeeper};
use crate::store::{decode_value, encode_value};
use log::warn;
use rasn::types::ObjectIdentifier;
use rasn_smi::v2::ObjectSyntax;
use rasn_snmp::v3::{VarBind, VarBindValue};
use std::fs::{read_to_string, write};

pub struct ScalarMemOid {
    value: ObjectSyntax,
    otype: OType,
    access: Access,
    reserved: bool,
    saved: Option<ObjectSyntax>,
}

impl ScalarMemOid {
    /// Initialize with initial value, type tag and access.
    ///
    /// There is a self consistency check that the initial value matches
    /// the declared type; a mismatch is a programming error and panics.
    pub fn new(value: ObjectSyntax, otype: OType, access: Access) -> Self {
        if !check_type(otype, &value) {
            panic!("Initial value is unexpected type {otype:?} {value:?}");
        }
        ScalarMemOid {
            value,
            otype,
            access,
            reserved: false,
            saved: None,
        }
    }
}

impl OidKeeper for ScalarMemOid {
    fn is_scalar(&self, _oid: ObjectIdentifier) -> bool {
        true
    }

    fn get(&self, _oid: ObjectIdentifier) -> Result<VarBindValue, OidErr> {
        if self.access == Access::NoAccess || self.access == Access::NotificationOnly {
            Err(OidErr::NoAccess)
        } else {
            Ok(VarBindValue::Value(self.value.clone()))
        }
    }

    // Scalar, so next item always lies outside
    fn get_next(&self, _oid: ObjectIdentifier) -> Result<VarBind, OidErr> {
        Err(OidErr::OutOfRange)
    }

    fn access(&self, _oid: ObjectIdentifier) -> Access {
        self.access
    }

    fn reserve1(&mut self, _oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        if self.access != Access::ReadWrite && self.access != Access::ReadCreate {
            return Err(OidErr::NotWritable);
        }
        if let VarBindValue::Value(new_value) = value {
            if !check_type(self.otype, new_value) {
                return Err(OidErr::WrongType);
            }
            self.reserved = true;
            Ok(())
        } else {
            Err(OidErr::WrongType)
        }
    }

    fn reserve2(&mut self, _oid: ObjectIdentifier, _value: &VarBindValue) -> Result<(), OidErr> {
        if self.reserved {
            Ok(())
        } else {
            Err(OidErr::GenErr)
        }
    }

    fn action(&mut self, _oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        if !self.reserved {
            return Err(OidErr::GenErr);
        }
        if let VarBindValue::Value(new_value) = value {
            self.saved = Some(self.value.clone());
            self.value = new_value.clone();
            Ok(())
        } else {
            Err(OidErr::WrongType)
        }
    }

    fn undo(&mut self, _oid: ObjectIdentifier) -> Result<(), OidErr> {
        if let Some(old) = self.saved.take() {
            self.value = old;
        }
        Ok(())
    }

    fn commit(&mut self, _oid: ObjectIdentifier) -> Result<(), OidErr> {
        if self.saved.take().is_none() && !self.reserved {
            return Err(OidErr::GenErr);
        }
        Ok(())
    }

    fn free(&mut self) {
        self.reserved = false;
        self.saved = None;
    }
}

/// Scalar that survives agent restarts by writing itself to a file.
pub struct PersistentScalar {
    scalar: ScalarMemOid,
    file_name: String,
}

impl PersistentScalar {
    pub fn new(value: ObjectSyntax, otype: OType, access: Access, file_name: String) -> Self {
        let scalar = ScalarMemOid::new(value, otype, access);
        PersistentScalar { scalar, file_name }
    }

    /// Replace the in-memory value with the stored one, if there is one
    /// and it parses.
    pub fn load(&mut self) -> Result<(), OidErr> {
        let text = read_to_string(&self.file_name).map_err(|_| OidErr::ResourceUnavailable)?;
        let token = text.trim_end();
        let value = decode_value(self.scalar.otype, token).map_err(|_| OidErr::GenErr)?;
        self.scalar.value = value;
        Ok(())
    }

    fn save(&self) {
        match encode_value(self.scalar.otype, &self.scalar.value) {
            Ok(token) => {
                if let Err(err) = write(&self.file_name, token.as_bytes()) {
                    warn!("Could not persist scalar to {0}: {err}", self.file_name);
                }
            }
            Err(err) => warn!("Scalar value not storable: {err}"),
        }
    }
}

impl OidKeeper for PersistentScalar {
    fn is_scalar(&self, oid: ObjectIdentifier) -> bool {
        self.scalar.is_scalar(oid)
    }

    fn get(&self, oid: ObjectIdentifier) -> Result<VarBindValue, OidErr> {
        self.scalar.get(oid)
    }

    fn get_next(&self, oid: ObjectIdentifier) -> Result<VarBind, OidErr> {
        self.scalar.get_next(oid)
    }

    fn access(&self, oid: ObjectIdentifier) -> Access {
        self.scalar.access(oid)
    }

    fn reserve1(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        self.scalar.reserve1(oid, value)
    }

    fn reserve2(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        self.scalar.reserve2(oid, value)
    }

    fn action(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        self.scalar.action(oid, value)
    }

    fn undo(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr> {
        self.scalar.undo(oid)
    }

    fn commit(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr> {
        let res = self.scalar.commit(oid);
        if res.is_ok() {
            self.save();
        }
        res
    }

    fn free(&mut self) {
        self.scalar.free();
    }
}
