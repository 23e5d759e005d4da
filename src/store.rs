//! Row storage for one table: keyed lookup plus durable persistence.
//!
//! Rows are held sorted by their index arcs. `extract` removes a row from
//! visibility while handing ownership back to the caller, which is how a
//! destroy transaction keeps the row recoverable until COMMIT. `persist`
//! rewrites the backing file; it is fire and forget — the table engine
//! logs failures and carries on, since COMMIT is not allowed to fail.

use crate::keeper::OType;
use crate::txn::StorageType;
use log::warn;
use num_traits::cast::ToPrimitive;
use rasn::types::{Integer, ObjectIdentifier};
use rasn_smi::v2::{ObjectSyntax, SimpleSyntax};
use std::fs::{read_to_string, write};
use std::io;
use std::path::PathBuf;

pub struct RowStore {
    rows: Vec<(Vec<u32>, Vec<ObjectSyntax>)>,
    path: Option<PathBuf>,
}

impl RowStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        RowStore {
            rows: Vec::new(),
            path,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[(Vec<u32>, Vec<ObjectSyntax>)] {
        &self.rows
    }

    fn position(&self, index: &[u32]) -> Result<usize, usize> {
        self.rows.binary_search_by(|(idx, _)| idx.as_slice().cmp(index))
    }

    pub fn find(&self, index: &[u32]) -> Option<&Vec<ObjectSyntax>> {
        match self.position(index) {
            Ok(pos) => Some(&self.rows[pos].1),
            Err(_) => None,
        }
    }

    pub fn find_mut(&mut self, index: &[u32]) -> Option<&mut Vec<ObjectSyntax>> {
        match self.position(index) {
            Ok(pos) => Some(&mut self.rows[pos].1),
            Err(_) => None,
        }
    }

    /// Insert keeping the rows sorted. The table invariant is one row per
    /// index; colliding inserts replace and are logged, since the engine
    /// validates existence before creating.
    pub fn insert(&mut self, index: Vec<u32>, row: Vec<ObjectSyntax>) {
        match self.position(&index) {
            Ok(pos) => {
                warn!("Replacing row with duplicate index {index:?}");
                self.rows[pos].1 = row;
            }
            Err(pos) => self.rows.insert(pos, (index, row)),
        }
    }

    /// Remove the row from visibility, returning ownership to the caller.
    pub fn extract(&mut self, index: &[u32]) -> Option<Vec<ObjectSyntax>> {
        match self.position(index) {
            Ok(pos) => Some(self.rows.remove(pos).1),
            Err(_) => None,
        }
    }

    /// Rewrite the backing file with every durable row.
    ///
    /// Rows whose storage-type column says `volatile` or `other` are not
    /// written. With no backing path this is a no-op.
    pub fn persist(&self, otypes: &[OType], storage_col: Option<usize>) -> io::Result<()> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let mut out = String::new();
        for (_, row) in &self.rows {
            if let Some(scol) = storage_col {
                let durable = StorageType::from_syntax(&row[scol - 1])
                    .map(|st| st.is_durable())
                    .unwrap_or(false);
                if !durable {
                    continue;
                }
            }
            let mut fields: Vec<String> = Vec::with_capacity(row.len());
            for (value, otype) in row.iter().zip(otypes) {
                fields.push(encode_value(*otype, value)?);
            }
            out.push_str(&fields.join(" "));
            out.push('\n');
        }
        write(path, out.as_bytes())
    }

    /// Read back whatever the backing file holds, if it exists yet.
    /// Failures are logged and treated as an empty table; a damaged store
    /// file must not keep the agent from starting.
    pub fn reload(&self, otypes: &[OType]) -> Option<Vec<Vec<ObjectSyntax>>> {
        let path = self.path.as_ref()?;
        if !path.exists() {
            return None;
        }
        match Self::load_rows(path, otypes) {
            Ok(rows) => Some(rows),
            Err(err) => {
                warn!("Could not reload rows from {path:?}: {err}");
                None
            }
        }
    }

    /// Read rows back from `path` in the order they were written.
    pub fn load_rows(path: &PathBuf, otypes: &[OType]) -> io::Result<Vec<Vec<ObjectSyntax>>> {
        let text = read_to_string(path)?;
        let mut rows = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split(' ').collect();
            if tokens.len() != otypes.len() {
                return Err(bad_data("column count mismatch"));
            }
            let mut row = Vec::with_capacity(otypes.len());
            for (token, otype) in tokens.iter().zip(otypes) {
                row.push(decode_value(*otype, token)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

fn bad_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

pub(crate) fn encode_value(otype: OType, value: &ObjectSyntax) -> io::Result<String> {
    match value {
        ObjectSyntax::Simple(SimpleSyntax::Integer(i)) => {
            let raw = i.to_i64().ok_or_else(|| bad_data("integer out of range"))?;
            Ok(raw.to_string())
        }
        ObjectSyntax::Simple(SimpleSyntax::String(s)) => Ok(format!("x{}", hex::encode(s))),
        ObjectSyntax::Simple(SimpleSyntax::ObjectId(o)) => {
            let arcs: Vec<String> = o.iter().map(|a| a.to_string()).collect();
            Ok(arcs.join("."))
        }
        _ => Err(bad_data(&format!("type {otype:?} not storable"))),
    }
}

pub(crate) fn decode_value(otype: OType, token: &str) -> io::Result<ObjectSyntax> {
    match otype {
        OType::Integer | OType::RowStatus | OType::StorageType | OType::Unsigned => {
            let raw: i64 = token.parse().map_err(|_| bad_data("bad integer field"))?;
            Ok(ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(
                raw,
            ))))
        }
        OType::String => {
            if !token.starts_with('x') {
                return Err(bad_data("bad string field"));
            }
            let bytes = hex::decode(&token[1..]).map_err(|_| bad_data("bad hex field"))?;
            Ok(ObjectSyntax::Simple(SimpleSyntax::String(bytes.into())))
        }
        OType::ObjectId => {
            let mut arcs: Vec<u32> = Vec::new();
            for part in token.split('.') {
                arcs.push(part.parse().map_err(|_| bad_data("bad oid field"))?);
            }
            let oid = ObjectIdentifier::new(arcs).ok_or_else(|| bad_data("bad oid field"))?;
            Ok(ObjectSyntax::Simple(SimpleSyntax::ObjectId(oid)))
        }
        _ => Err(bad_data(&format!("type {otype:?} not storable"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;
    use std::fs::remove_file;

    fn simple_from_int(value: i32) -> ObjectSyntax {
        ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(value)))
    }

    fn simple_from_bytes(value: &[u8]) -> ObjectSyntax {
        ObjectSyntax::Simple(SimpleSyntax::String(value.to_vec().into()))
    }

    fn row(name: &[u8], storage: i32, status: i32) -> Vec<ObjectSyntax> {
        vec![
            simple_from_bytes(name),
            simple_from_bytes(name),
            simple_from_int(storage),
            simple_from_int(status),
        ]
    }

    const OTYPES: [OType; 4] = [
        OType::String,
        OType::String,
        OType::StorageType,
        OType::RowStatus,
    ];

    #[test]
    fn insert_keeps_rows_sorted() {
        let mut store = RowStore::new(None);
        store.insert(vec![5], row(b"b", 3, 1));
        store.insert(vec![3], row(b"a", 3, 1));
        store.insert(vec![9], row(b"c", 3, 1));
        let indices: Vec<&Vec<u32>> = store.rows().iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![&vec![3], &vec![5], &vec![9]]);
    }

    #[test]
    fn extract_hides_and_returns_row() {
        let mut store = RowStore::new(None);
        store.insert(vec![3], row(b"a", 3, 1));
        let taken = store.extract(&[3]).unwrap();
        assert_eq!(taken, row(b"a", 3, 1));
        assert!(store.find(&[3]).is_none());
        assert!(store.extract(&[3]).is_none());
    }

    #[test]
    fn persist_round_trip_skips_volatile() {
        let path = temp_dir().join("row_store_test.txt");
        let mut store = RowStore::new(Some(path.clone()));
        store.insert(vec![1], row(b"keep", 3, 1));
        store.insert(vec![2], row(b"skip", 2, 1));
        store.persist(&OTYPES, Some(3)).unwrap();
        let rows = RowStore::load_rows(&path, &OTYPES).unwrap();
        remove_file(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], row(b"keep", 3, 1));
    }

    #[test]
    fn empty_string_survives_round_trip() {
        let path = temp_dir().join("row_store_empty_test.txt");
        let mut store = RowStore::new(Some(path.clone()));
        store.insert(vec![1], row(b"", 3, 3));
        store.persist(&OTYPES, Some(3)).unwrap();
        let rows = RowStore::load_rows(&path, &OTYPES).unwrap();
        remove_file(&path).unwrap();
        assert_eq!(rows[0][0], simple_from_bytes(b""));
    }

    #[test]
    fn load_rejects_short_lines() {
        let path = temp_dir().join("row_store_bad_test.txt");
        write(&path, b"x61 3\n").unwrap();
        let res = RowStore::load_rows(&path, &OTYPES);
        remove_file(&path).unwrap();
        assert!(res.is_err());
    }
}
