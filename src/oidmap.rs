use crate::keeper::OidKeeper;
use log::info;
use rasn::types::ObjectIdentifier;

/// Mapping between ObjectIdentifiers and the keepers that serve them.
///
/// This simplistic implementation uses a sorted vector of (OID, keeper)
/// tuples. Exact lookups are binary searches; a miss returns the insert
/// point, whose predecessor is the keeper whose subtree would contain the
/// OID. Most MIBs are small, so logN is 5 or 6 and real back end
/// operations are vastly slower than the lookup.
pub struct OidMap {
    store: Vec<(ObjectIdentifier, Box<dyn OidKeeper>)>,
}

impl OidMap {
    pub fn new() -> Self {
        let store: Vec<(ObjectIdentifier, Box<dyn OidKeeper>)> = vec![];
        OidMap { store }
    }

    pub fn push(&mut self, oid: ObjectIdentifier, arg: Box<dyn OidKeeper>) {
        self.store.push((oid, arg));
    }

    pub fn sort(&mut self) {
        self.store.sort_by(|a, b| a.0.cmp(&b.0));
        info!("Sorted");
    }

    /// Binary search for the keeper registered at `oid`, or the insert
    /// point if there is no exact match.
    pub fn search(&self, oid: &ObjectIdentifier) -> Result<usize, usize> {
        self.store.binary_search_by(|a| a.0.cmp(oid))
    }

    /// The keeper whose registration covers `oid`: an exact match, or the
    /// entry before the insert point (tables and scalars own the subtree
    /// below their registration).
    pub fn covering(&self, oid: &ObjectIdentifier) -> Option<usize> {
        match self.search(oid) {
            Ok(which) => Some(which),
            Err(0) => None,
            Err(insert_point) => Some(insert_point - 1),
        }
    }

    /// Return the keeper that owns the next key after `oid`, if any.
    pub fn search_next(&mut self, oid: &ObjectIdentifier) -> Option<&mut Box<dyn OidKeeper>> {
        let bin_res = self.store.binary_search_by(|a| a.0.cmp(oid));
        match bin_res {
            Ok(which) => {
                if which < self.store.len() - 1 {
                    Some(&mut self.store[which + 1].1)
                } else {
                    None
                }
            }
            Err(insert_point) => {
                if insert_point < self.store.len() {
                    Some(&mut self.store[insert_point].1)
                } else {
                    None
                }
            }
        }
    }

    pub fn idx(&mut self, i: usize) -> &mut Box<dyn OidKeeper> {
        &mut self.store[i].1
    }

    pub fn oid(&self, i: usize) -> &ObjectIdentifier {
        &self.store[i].0
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for OidMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::{Access, OType};
    use crate::scalar::ScalarMemOid;
    use rasn::types::Integer;
    use rasn_smi::v2::{ObjectSyntax, SimpleSyntax};

    fn scalar() -> Box<dyn OidKeeper> {
        Box::new(ScalarMemOid::new(
            ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(42))),
            OType::Integer,
            Access::ReadWrite,
        ))
    }

    fn map_fixture() -> OidMap {
        let mut map = OidMap::new();
        map.push(ObjectIdentifier::new(&[1, 3, 6, 1, 9]).unwrap(), scalar());
        map.push(ObjectIdentifier::new(&[1, 3, 6, 1, 4]).unwrap(), scalar());
        map.sort();
        map
    }

    #[test]
    fn sort_orders_entries() {
        let map = map_fixture();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.oid(0),
            &ObjectIdentifier::new(&[1, 3, 6, 1, 4]).unwrap()
        );
    }

    #[test]
    fn covering_resolves_subtree_instances() {
        let map = map_fixture();
        let exact = ObjectIdentifier::new(&[1, 3, 6, 1, 4]).unwrap();
        assert_eq!(map.covering(&exact), Some(0));
        // instance below a registration resolves to its keeper
        let inst = ObjectIdentifier::new(&[1, 3, 6, 1, 4, 0]).unwrap();
        assert_eq!(map.covering(&inst), Some(0));
        let inst2 = ObjectIdentifier::new(&[1, 3, 6, 1, 9, 1, 2]).unwrap();
        assert_eq!(map.covering(&inst2), Some(1));
        // before the first registration there is nothing
        let early = ObjectIdentifier::new(&[1, 2]).unwrap();
        assert_eq!(map.covering(&early), None);
    }

    #[test]
    fn search_next_steps_over_entries() {
        let mut map = map_fixture();
        let first = ObjectIdentifier::new(&[1, 3, 6, 1, 4]).unwrap();
        assert!(map.search_next(&first).is_some());
        let last = ObjectIdentifier::new(&[1, 3, 6, 1, 9]).unwrap();
        assert!(map.search_next(&last).is_none());
    }
}
