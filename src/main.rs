use log::info;
use rasn::types::{Integer, ObjectIdentifier, OctetString};
use rasn_smi::v2::{ObjectSyntax, SimpleSyntax};
use rasn_snmp::v3::{VarBind, VarBindValue};

use snmp_row_engine::batch::apply_set_batch;
use snmp_row_engine::config::Config;
use snmp_row_engine::handlers::load_handlers;
use snmp_row_engine::oidmap::OidMap;

// Walk through a create / activate / read-back cycle on the notification
// filter profile table, the way an agent's SET path would drive it.

const ARC_TABLE: [u32; 9] = [1, 3, 6, 1, 6, 3, 13, 1, 2];

fn instance_oid(col: u32, index: &[u8]) -> ObjectIdentifier {
    let mut arcs: Vec<u32> = ARC_TABLE.to_vec();
    arcs.push(1);
    arcs.push(col);
    for b in index {
        arcs.push(u32::from(*b));
    }
    ObjectIdentifier::new(arcs).unwrap()
}

fn main() {
    env_logger::init();
    let config = Config::load();
    let mut oid_map = OidMap::new();
    load_handlers(&mut oid_map, &config);
    oid_map.sort();

    // One batch creates the row and names its filter profile.
    let bindings = vec![
        VarBind {
            name: instance_oid(2, b"wan-router"),
            value: VarBindValue::Value(ObjectSyntax::Simple(SimpleSyntax::String(
                OctetString::from_static(b"log-everything"),
            ))),
        },
        VarBind {
            name: instance_oid(4, b"wan-router"),
            value: VarBindValue::Value(ObjectSyntax::Simple(SimpleSyntax::Integer(
                Integer::from(4),
            ))),
        },
    ];
    match apply_set_batch(&mut oid_map, bindings) {
        Ok(applied) => info!("SET batch applied, {} binding(s)", applied.len()),
        Err(failure) => {
            println!(
                "SET batch failed: error-status {0} at index {1}",
                failure.status, failure.index
            );
            return;
        }
    }

    let status_oid = instance_oid(4, b"wan-router");
    let which = oid_map
        .covering(&status_oid)
        .expect("table was registered above");
    match oid_map.idx(which).get(status_oid) {
        Ok(VarBindValue::Value(value)) => {
            println!("Row for 'wan-router' committed, rowStatus = {value:?}")
        }
        other => println!("Unexpected read-back: {other:?}"),
    }
}
