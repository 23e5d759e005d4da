use crate::config::Config;
use crate::keeper::{Access, OidErr, OidKeeper};
use crate::oidmap::OidMap;
use crate::table::TableMemOid;
use crate::txn::ColumnPolicy;
use rasn::types::{Integer, ObjectIdentifier, OctetString};
use rasn_smi::v2::{ObjectSyntax, SimpleSyntax};
use rasn_snmp::v3::{VarBind, VarBindValue};
use std::path::Path;

fn simple_from_int(value: i32) -> ObjectSyntax {
    ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(value)))
}

fn simple_from_str(value: &[u8]) -> ObjectSyntax {
    ObjectSyntax::Simple(SimpleSyntax::String(OctetString::copy_from_slice(value)))
}

const ARC_NOTIFY_FILTER_PROFILE_TABLE: [u32; 9] = [1, 3, 6, 1, 6, 3, 13, 1, 2];

const PROFILE_NAME_MAX: usize = 32;
const STORAGE_FILE: &str = "notify_filter_profile";

// This table is used to associate a notification filter profile with a
// particular set of target parameters. The index is the (implied) name of
// the target parameters entry the profile applies to, so the row itself
// carries it as a not-accessible column, followed by:
//
//  * the name of the filter profile to be used when generating
//    notifications (1..32 octets, must be set before the row activates),
//  * the storage type for the row,
//  * the row status column through which rows are created, taken in and
//    out of service, and destroyed.

pub struct KeepNotifyFilterProfileTable {
    table: TableMemOid,
}

impl KeepNotifyFilterProfileTable {
    pub fn new(config: &Config) -> Self {
        let base_oid: ObjectIdentifier =
            ObjectIdentifier::new(&ARC_NOTIFY_FILTER_PROFILE_TABLE).unwrap();
        let path = Path::new(&config.storage_path).join(STORAGE_FILE);
        KeepNotifyFilterProfileTable {
            table: TableMemOid::new(
                vec![
                    simple_from_str(b""),
                    simple_from_str(b""),
                    simple_from_int(3),
                    simple_from_int(3),
                ],
                4,
                &base_oid,
                vec![
                    ColumnPolicy::string(Access::NoAccess, 1, PROFILE_NAME_MAX),
                    ColumnPolicy::string(Access::ReadCreate, 1, PROFILE_NAME_MAX),
                    ColumnPolicy::storage_type(Access::ReadCreate),
                    ColumnPolicy::row_status(Access::ReadCreate),
                ],
                vec![1usize],
                true,
                vec![2usize],
                Some(path),
            ),
        }
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }
}

impl OidKeeper for KeepNotifyFilterProfileTable {
    fn is_scalar(&self, _oid: ObjectIdentifier) -> bool {
        false
    }
    fn get(&self, oid: ObjectIdentifier) -> Result<VarBindValue, OidErr> {
        self.table.get(oid)
    }
    fn get_next(&self, oid: ObjectIdentifier) -> Result<VarBind, OidErr> {
        self.table.get_next(oid)
    }
    fn access(&self, oid: ObjectIdentifier) -> Access {
        self.table.access(oid)
    }
    fn reserve1(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        self.table.reserve1(oid, value)
    }
    fn reserve2(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        self.table.reserve2(oid, value)
    }
    fn action(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        self.table.action(oid, value)
    }
    fn undo(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr> {
        self.table.undo(oid)
    }
    fn commit(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr> {
        self.table.commit(oid)
    }
    fn free(&mut self) {
        self.table.free()
    }
}

pub fn load_handler(oid_map: &mut OidMap, config: &Config) {
    let oid_notify_filter_profile_table: ObjectIdentifier =
        ObjectIdentifier::new(&ARC_NOTIFY_FILTER_PROFILE_TABLE).unwrap();
    let k_notify_filter_profile_table: Box<dyn OidKeeper> =
        Box::new(KeepNotifyFilterProfileTable::new(config));
    oid_map.push(
        oid_notify_filter_profile_table,
        k_notify_filter_profile_table,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;
    use std::fs::{create_dir_all, remove_dir_all};

    fn test_config(tag: &str) -> Config {
        let dir = temp_dir().join(format!("nfp_handler_{tag}"));
        create_dir_all(&dir).unwrap();
        Config {
            storage_path: dir.to_str().unwrap().to_string(),
        }
    }

    // column oid for the row indexed by "lan"
    fn col_oid(col: u32) -> ObjectIdentifier {
        let mut arcs = vec![1, 3, 6, 1, 6, 3, 13, 1, 2, 1, col];
        arcs.extend_from_slice(&[b'l' as u32, b'a' as u32, b'n' as u32]);
        ObjectIdentifier::new(arcs).unwrap()
    }

    #[test]
    fn create_modify_destroy_cycle() {
        let config = test_config("cycle");
        let mut keeper = KeepNotifyFilterProfileTable::new(&config);
        keeper
            .set(col_oid(4), VarBindValue::Value(simple_from_int(5)))
            .unwrap();
        keeper
            .set(
                col_oid(2),
                VarBindValue::Value(simple_from_str(b"log-everything")),
            )
            .unwrap();
        keeper
            .set(col_oid(4), VarBindValue::Value(simple_from_int(1)))
            .unwrap();
        assert_eq!(
            keeper.get(col_oid(4)).unwrap(),
            VarBindValue::Value(simple_from_int(1))
        );
        keeper
            .set(col_oid(4), VarBindValue::Value(simple_from_int(6)))
            .unwrap();
        assert_eq!(keeper.row_count(), 0);
        remove_dir_all(config.storage_path).unwrap();
    }

    #[test]
    fn committed_rows_survive_restart() {
        let config = test_config("restart");
        {
            let mut keeper = KeepNotifyFilterProfileTable::new(&config);
            keeper
                .set(col_oid(4), VarBindValue::Value(simple_from_int(5)))
                .unwrap();
            keeper
                .set(
                    col_oid(2),
                    VarBindValue::Value(simple_from_str(b"log-everything")),
                )
                .unwrap();
            keeper
                .set(col_oid(4), VarBindValue::Value(simple_from_int(1)))
                .unwrap();
        }
        let keeper = KeepNotifyFilterProfileTable::new(&config);
        assert_eq!(keeper.row_count(), 1);
        assert_eq!(
            keeper.get(col_oid(2)).unwrap(),
            VarBindValue::Value(simple_from_str(b"log-everything"))
        );
        assert_eq!(
            keeper.get(col_oid(4)).unwrap(),
            VarBindValue::Value(simple_from_int(1))
        );
        remove_dir_all(config.storage_path).unwrap();
    }

    #[test]
    fn volatile_rows_are_not_persisted() {
        let config = test_config("volatile");
        {
            let mut keeper = KeepNotifyFilterProfileTable::new(&config);
            keeper
                .set(col_oid(4), VarBindValue::Value(simple_from_int(5)))
                .unwrap();
            keeper
                .set(
                    col_oid(2),
                    VarBindValue::Value(simple_from_str(b"transient")),
                )
                .unwrap();
            keeper
                .set(col_oid(3), VarBindValue::Value(simple_from_int(2)))
                .unwrap();
        }
        let keeper = KeepNotifyFilterProfileTable::new(&config);
        assert_eq!(keeper.row_count(), 0);
        remove_dir_all(config.storage_path).unwrap();
    }

    #[test]
    fn load_handler_registers_table() {
        let config = test_config("register");
        let mut oid_map = OidMap::new();
        load_handler(&mut oid_map, &config);
        oid_map.sort();
        assert_eq!(oid_map.len(), 1);
        let base = ObjectIdentifier::new(&ARC_NOTIFY_FILTER_PROFILE_TABLE).unwrap();
        assert!(oid_map.search(&base).is_ok());
        remove_dir_all(config.storage_path).unwrap();
    }
}
