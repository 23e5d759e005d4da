//! In-memory table keeper with transactional row writes.
//!
//! `TableMemOid` generalizes the phased SET protocol over any table whose
//! columns are described by [`ColumnPolicy`] entries. A column declared as
//! `OType::RowStatus` makes the table row-creatable: setting it to
//! `createAndGo` / `createAndWait` conjures a provisional row from the OID
//! index, `destroy` extracts the row reversibly, and activation guards
//! check that every required column has been given a value. All mutation
//! flows through a [`RowTxn`] context so that any failure in the batch can
//! be rolled back field by field.

use crate::index::{decode_index, encode_index};
use crate::keeper::{check_type, Access, OType, OidErr, OidKeeper};
use crate::store::RowStore;
use crate::txn::{ColumnPolicy, RowStatus, RowTxn, StorageType, UndoOp};
use log::{debug, error};
use num_traits::cast::ToPrimitive;
use rasn::types::{Integer, ObjectIdentifier};
use rasn_smi::v2::{ObjectSyntax, SimpleSyntax};
use rasn_snmp::v3::{VarBind, VarBindValue};
use std::path::PathBuf;

pub struct TableMemOid {
    store: RowStore,
    cols: usize,
    base: Vec<u32>,
    policies: Vec<ColumnPolicy>,
    defaults: Vec<ObjectSyntax>,
    index_cols: Vec<usize>,
    implied_last: bool,
    /// Column carrying the RowStatus textual convention, if any.
    status_col: Option<usize>,
    /// Column carrying the StorageType textual convention, if any.
    storage_col: Option<usize>,
    /// Columns that must be non-empty before a row may be activated.
    required_cols: Vec<usize>,
    /// Per-row transaction contexts for the SET batch in flight.
    txns: Vec<RowTxn>,
}

impl TableMemOid {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        defaults: Vec<ObjectSyntax>,
        cols: usize,
        base: &ObjectIdentifier,
        policies: Vec<ColumnPolicy>,
        index_cols: Vec<usize>,
        implied_last: bool,
        required_cols: Vec<usize>,
        storage_path: Option<PathBuf>,
    ) -> Self {
        assert_eq!(cols, policies.len());
        assert_eq!(cols, defaults.len());
        for (value, policy) in defaults.iter().zip(&policies) {
            assert!(
                check_type(policy.otype, value),
                "default value has unexpected type {:?}",
                policy.otype
            );
        }
        assert!(index_cols.len() <= cols);
        for colnum in &index_cols {
            assert!(*colnum >= 1 && *colnum <= cols);
        }
        for colnum in &required_cols {
            assert!(*colnum >= 1 && *colnum <= cols);
        }
        let status_col = Self::find_otype(&policies, OType::RowStatus);
        let storage_col = Self::find_otype(&policies, OType::StorageType);
        let mut tab = TableMemOid {
            store: RowStore::new(storage_path),
            cols,
            base: base.to_vec(),
            policies,
            defaults,
            index_cols,
            implied_last,
            status_col,
            storage_col,
            required_cols,
            txns: Vec::new(),
        };
        tab.reload();
        tab
    }

    fn find_otype(policies: &[ColumnPolicy], wanted: OType) -> Option<usize> {
        policies
            .iter()
            .position(|p| p.otype == wanted)
            .map(|pos| pos + 1)
    }

    /// Bulk-load rows, deriving each row's index from its column values.
    pub fn set_data(&mut self, data: Vec<Vec<ObjectSyntax>>) {
        for row in data {
            self.add_row(row);
        }
    }

    pub fn add_row(&mut self, mut row: Vec<ObjectSyntax>) {
        assert_eq!(row.len(), self.cols);
        self.sanitize_status(&mut row);
        let idx = encode_index(&self.index_cols, &row, self.implied_last);
        self.store.insert(idx, row);
    }

    pub fn row_count(&self) -> usize {
        self.store.len()
    }

    /// Pull previously persisted rows back in, if a backing file exists.
    fn reload(&mut self) {
        let otypes = self.otypes();
        if let Some(rows) = self.store.reload(&otypes) {
            for row in rows {
                if row.len() == self.cols {
                    self.add_row(row);
                } else {
                    error!("Dropping persisted row with wrong column count");
                }
            }
        }
    }

    /// A transient RowStatus must never rest in the table; anything that
    /// was mid-transition when persisted comes back as notReady.
    fn sanitize_status(&self, row: &mut [ObjectSyntax]) {
        if let Some(scol) = self.status_col {
            let transient = match Self::status_of(row, scol) {
                Some(RowStatus::Active) | Some(RowStatus::NotInService)
                | Some(RowStatus::NotReady) => false,
                _ => true,
            };
            if transient {
                row[scol - 1] = int_syntax(RowStatus::NotReady.as_i64());
            }
        }
    }

    fn otypes(&self) -> Vec<OType> {
        self.policies.iter().map(|p| p.otype).collect()
    }

    fn suffix(&self, oid: ObjectIdentifier) -> Vec<u32> {
        let blen = self.base.len();
        if oid.len() > blen {
            oid.to_vec()[blen..].to_vec()
        } else {
            vec![]
        }
    }

    /// Generate oid corresponding to column and index
    ///
    /// If the table has OID x.y, the table entry is always x.y.1
    /// Column n definition is x.y.1.n and never has instances
    /// Column n and index m (which could be a whole array) is x.y.1.n.m
    fn make_oid(&self, col: usize, index: &[u32]) -> ObjectIdentifier {
        let mut tmp = self.base.clone();
        tmp.push(1u32);
        let c32: u32 = col.try_into().unwrap();
        tmp.push(c32);
        for arc in index {
            tmp.push(*arc);
        }
        ObjectIdentifier::new(tmp).unwrap().to_owned()
    }

    /// Split a suffix into column number and index arcs, checking bounds.
    fn parse_suffix(&self, suffix: &[u32]) -> Result<(usize, Vec<u32>), OidErr> {
        // Complex indices (not integer and/or multicolumn) need longer than 3
        if suffix.len() < 3 {
            return Err(OidErr::NoSuchInstance);
        }
        if suffix[0] != 1u32 {
            return Err(OidErr::NoSuchName);
        }
        if suffix[1] > 16384 {
            // Some sort of denial of service attack?
            return Err(OidErr::NoSuchName);
        }
        let col: usize = suffix[1].try_into().unwrap();
        if col == 0 || col > self.cols {
            return Err(OidErr::NoSuchName);
        }
        Ok((col, suffix[2..].to_vec()))
    }

    /// Resolve a write target and reject columns that can never be set.
    fn resolve_write(&self, oid: ObjectIdentifier) -> Result<(usize, Vec<u32>), OidErr> {
        let suffix = self.suffix(oid);
        let (col, index) = self.parse_suffix(&suffix)?;
        match self.policies[col - 1].access {
            Access::NoAccess | Access::NotificationOnly | Access::ReadOnly => {
                Err(OidErr::NotWritable)
            }
            _ => Ok((col, index)),
        }
    }

    fn status_of(row: &[ObjectSyntax], scol: usize) -> Option<RowStatus> {
        if let ObjectSyntax::Simple(SimpleSyntax::Integer(i)) = &row[scol - 1] {
            RowStatus::from_i64(i.to_i64()?)
        } else {
            None
        }
    }

    fn storage_of(&self, row: &[ObjectSyntax]) -> Option<StorageType> {
        let scol = self.storage_col?;
        StorageType::from_syntax(&row[scol - 1])
    }

    /// Every required column holds a non-empty value.
    fn filled(required: &[usize], row: &[ObjectSyntax]) -> bool {
        required.iter().all(|colnum| {
            if let ObjectSyntax::Simple(SimpleSyntax::String(s)) = &row[*colnum - 1] {
                !s.is_empty()
            } else {
                true
            }
        })
    }

    fn txn_entry<'a>(txns: &'a mut Vec<RowTxn>, index: &[u32]) -> &'a mut RowTxn {
        let pos = txns.iter().position(|t| t.index == index);
        match pos {
            Some(pos) => &mut txns[pos],
            None => {
                txns.push(RowTxn::new(index.to_vec()));
                txns.last_mut().unwrap()
            }
        }
    }

    fn txn_get<'a>(txns: &'a mut [RowTxn], index: &[u32]) -> Option<&'a mut RowTxn> {
        txns.iter_mut().find(|t| t.index == index)
    }

    /// Build the provisional row for a creation: defaults, identity
    /// columns from the decoded index, lifecycle at notReady.
    fn provisional_row(&self, identity: &[ObjectSyntax]) -> Result<Vec<ObjectSyntax>, OidErr> {
        let mut row: Vec<ObjectSyntax> = Vec::new();
        row.try_reserve_exact(self.cols)
            .map_err(|_| OidErr::ResourceUnavailable)?;
        row.extend(self.defaults.iter().cloned());
        for (pos, colnum) in self.index_cols.iter().enumerate() {
            row[colnum - 1] = identity[pos].clone();
        }
        if let Some(scol) = self.status_col {
            row[scol - 1] = int_syntax(RowStatus::NotReady.as_i64());
        }
        Ok(row)
    }

    fn persist(&self) {
        let otypes = self.otypes();
        if let Err(err) = self.store.persist(&otypes, self.storage_col) {
            error!("Table persistence failed: {err}");
        }
    }

    /// RESERVE1 checks for the RowStatus column, which needs the current
    /// row state in addition to the value syntax.
    fn reserve1_status(
        &mut self,
        index: &[u32],
        value: &ObjectSyntax,
    ) -> Result<(), OidErr> {
        let status = RowStatus::from_set_value(value)?;
        let existing = self.store.find(index);
        match status {
            RowStatus::CreateAndGo | RowStatus::CreateAndWait => {
                if existing.is_some() {
                    // can't create a row that exists
                    return Err(OidErr::InconsistentValue);
                }
                let identity =
                    decode_index(index, &self.policies, &self.index_cols, self.implied_last)?;
                let txn = Self::txn_entry(&mut self.txns, index);
                txn.reserve()?;
                txn.requested_status = Some(status);
                txn.identity = Some(identity);
            }
            RowStatus::Active | RowStatus::NotInService => {
                let row = match existing {
                    // can't put a nonexistent row in service
                    None => return Err(OidErr::InconsistentValue),
                    Some(row) => row,
                };
                if !Self::filled(&self.required_cols, row) {
                    // can't activate while required columns are empty
                    return Err(OidErr::InconsistentValue);
                }
                let txn = Self::txn_entry(&mut self.txns, index);
                txn.reserve()?;
                txn.requested_status = Some(status);
            }
            RowStatus::Destroy => {
                if let Some(row) = existing {
                    match self.storage_of(row) {
                        Some(StorageType::Permanent) | Some(StorageType::ReadOnly) => {
                            return Err(OidErr::InconsistentValue);
                        }
                        _ => {}
                    }
                }
                // destroying a nonexistent row commits as a no-op
                let txn = Self::txn_entry(&mut self.txns, index);
                txn.reserve()?;
                txn.requested_status = Some(status);
            }
            // from_set_value never returns the internal sentinel
            RowStatus::NotReady => return Err(OidErr::WrongValue),
        }
        Ok(())
    }
}

fn int_syntax(value: i64) -> ObjectSyntax {
    ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(value)))
}

impl OidKeeper for TableMemOid {
    fn is_scalar(&self, _oid: ObjectIdentifier) -> bool {
        false
    }

    fn get(&self, oid: ObjectIdentifier) -> Result<VarBindValue, OidErr> {
        let suffix = self.suffix(oid);
        debug!("Suffix is {suffix:?}");
        let (col, index) = self.parse_suffix(&suffix)?;
        match self.store.find(&index) {
            Some(row) => Ok(VarBindValue::Value(row[col - 1].clone())),
            None => Err(OidErr::NoSuchName),
        }
    }

    fn get_next(&self, oid: ObjectIdentifier) -> Result<VarBind, OidErr> {
        let suffix = self.suffix(oid);
        let mut col: usize = if suffix.len() < 2 {
            1 + self
                .policies
                .iter()
                .position(|p| {
                    p.access == Access::ReadOnly
                        || p.access == Access::ReadWrite
                        || p.access == Access::ReadCreate
                })
                .unwrap()
        } else {
            suffix[1].try_into().unwrap()
        };
        if col == 0 || col > self.cols {
            return Err(OidErr::NoSuchName);
        }
        let rows = self.store.rows();
        if rows.is_empty() {
            return Err(OidErr::OutOfRange);
        }
        if suffix.len() > 2 {
            let index = &suffix[2..];
            // FIXME sequential search; switch to binary_search if tables grow
            for (i, (row_index, _)) in rows.iter().enumerate() {
                if index == row_index {
                    if i < rows.len() - 1 {
                        let (next_index, next_row) = &rows[i + 1];
                        let value = VarBindValue::Value(next_row[col - 1].clone());
                        let name = self.make_oid(col, next_index);
                        return Ok(VarBind { name, value });
                    } else if col < self.cols {
                        col += 1;
                        let (first_index, first_row) = &rows[0];
                        let value = VarBindValue::Value(first_row[col - 1].clone());
                        let name = self.make_oid(col, first_index);
                        return Ok(VarBind { name, value });
                    }
                }
            }
            debug!("Off end of table");
            Err(OidErr::OutOfRange)
        } else {
            let (first_index, first_row) = &rows[0];
            let value = VarBindValue::Value(first_row[col - 1].clone());
            let name = self.make_oid(col, first_index);
            Ok(VarBind { name, value })
        }
    }

    fn access(&self, oid: ObjectIdentifier) -> Access {
        let suffix = self.suffix(oid);
        if suffix.len() < 2 {
            return Access::NoAccess;
        }
        if suffix[0] != 1u32 {
            return Access::NoAccess;
        }
        if suffix[1] > 16384 {
            return Access::NoAccess;
        }
        let col: usize = suffix[1].try_into().unwrap();
        if col == 0 || col > self.cols {
            return Access::NoAccess;
        }
        self.policies[col - 1].access
    }

    /// Validation only; nothing is touched.
    fn reserve1(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        let (col, index) = self.resolve_write(oid)?;
        let value = match value {
            VarBindValue::Value(v) => v,
            _ => return Err(OidErr::WrongType),
        };
        let policy = self.policies[col - 1];
        policy.validate(value)?;
        if let Some(row) = self.store.find(&index) {
            // rows pinned down by their storage type take no writes at all
            if self.storage_of(row) == Some(StorageType::ReadOnly) {
                return Err(OidErr::NotWritable);
            }
        }
        if Some(col) == self.status_col {
            self.reserve1_status(&index, value)
        } else {
            let txn = Self::txn_entry(&mut self.txns, &index);
            txn.reserve()
        }
    }

    /// Memory reservation: staged value copies, and the provisional row
    /// for a pending creation.
    fn reserve2(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        let (col, index) = self.resolve_write(oid)?;
        let value = match value {
            VarBindValue::Value(v) => v,
            _ => return Err(OidErr::WrongType),
        };
        let row_known = self.store.find(&index).is_some();
        let provisional = if Some(col) == self.status_col {
            let txn = match Self::txn_get(&mut self.txns, &index) {
                Some(txn) => txn,
                None => return Err(OidErr::GenErr),
            };
            txn.reserve()?;
            txn.creation_pending() && txn.provisional.is_none()
        } else {
            let txn = match Self::txn_get(&mut self.txns, &index) {
                Some(txn) => txn,
                None => return Err(OidErr::GenErr),
            };
            txn.reserve()?;
            if !row_known && !txn.creation_pending() {
                // no row and nothing in this batch will create one; a
                // table without a RowStatus column never creates at all
                if self.status_col.is_none() {
                    return Err(OidErr::NoCreation);
                }
                return Err(OidErr::NoSuchName);
            }
            txn.stage(col, value)?;
            false
        };
        if provisional {
            let identity = match Self::txn_get(&mut self.txns, &index)
                .and_then(|txn| txn.identity.take())
            {
                Some(identity) => identity,
                None => return Err(OidErr::GenErr),
            };
            let row = self.provisional_row(&identity)?;
            if let Some(txn) = Self::txn_get(&mut self.txns, &index) {
                txn.provisional = Some(row);
            }
        }
        Ok(())
    }

    /// Apply reversibly: insert the provisional row, extract a doomed row,
    /// or overwrite one column capturing the prior value.
    fn action(&mut self, oid: ObjectIdentifier, value: &VarBindValue) -> Result<(), OidErr> {
        let (col, index) = self.resolve_write(oid)?;
        let value = match value {
            VarBindValue::Value(v) => v,
            _ => return Err(OidErr::WrongType),
        };
        let txn = match Self::txn_get(&mut self.txns, &index) {
            Some(txn) => txn,
            None => return Err(OidErr::GenErr),
        };
        txn.apply()?;
        if Some(col) == self.status_col {
            let status = RowStatus::from_set_value(value)?;
            match status {
                RowStatus::CreateAndGo | RowStatus::CreateAndWait => {
                    let row = match txn.provisional.take() {
                        Some(row) => row,
                        None => return Err(OidErr::GenErr),
                    };
                    self.store.insert(index.clone(), row);
                    txn.inserted = true;
                    txn.record(UndoOp::RemoveProvisional);
                }
                RowStatus::Destroy => {
                    if let Some(row) = self.store.extract(&index) {
                        txn.extracted = Some(row);
                        txn.record(UndoOp::ReinsertExtracted);
                    }
                }
                RowStatus::Active | RowStatus::NotInService => {
                    let row = match self.store.find_mut(&index) {
                        Some(row) => row,
                        // should never ever get here
                        None => return Err(OidErr::GenErr),
                    };
                    let prior = row[col - 1].clone();
                    row[col - 1] = int_syntax(status.as_i64());
                    txn.record(UndoOp::Restore { col, prior });
                }
                RowStatus::NotReady => return Err(OidErr::GenErr),
            }
        } else {
            let staged = txn
                .take_staged(col)
                .unwrap_or_else(|| value.clone());
            let row = match self.store.find_mut(&index) {
                Some(row) => Some(row),
                None => txn.provisional.as_mut(),
            };
            let row = match row {
                Some(row) => row,
                None => return Err(OidErr::GenErr),
            };
            let prior = row[col - 1].clone();
            row[col - 1] = staged;
            txn.record(UndoOp::Restore { col, prior });
        }
        Ok(())
    }

    /// Back out whatever this binding's ACTION did.
    fn undo(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr> {
        let (col, index) = self.resolve_write(oid)?;
        let status_col = self.status_col.unwrap_or(0);
        let txn = match Self::txn_get(&mut self.txns, &index) {
            Some(txn) => txn,
            None => return Err(OidErr::GenErr),
        };
        txn.roll_back()?;
        match txn.take_undo(col, status_col) {
            Some(UndoOp::Restore { col, prior }) => {
                let row = match self.store.find_mut(&index) {
                    Some(row) => Some(row),
                    None => txn.provisional.as_mut(),
                };
                match row {
                    Some(row) => row[col - 1] = prior,
                    None => return Err(OidErr::GenErr),
                }
            }
            Some(UndoOp::RemoveProvisional) => {
                if let Some(row) = self.store.extract(&index) {
                    txn.provisional = Some(row);
                    txn.inserted = false;
                }
            }
            Some(UndoOp::ReinsertExtracted) => {
                if let Some(row) = txn.extracted.take() {
                    self.store.insert(index.clone(), row);
                }
            }
            // this binding never reached ACTION; nothing to reverse
            None => {}
        }
        Ok(())
    }

    /// Finalize: release a destroyed row, advance a created row out of
    /// notReady, and kick the durability write.
    fn commit(&mut self, oid: ObjectIdentifier) -> Result<(), OidErr> {
        let (col, index) = self.resolve_write(oid)?;
        let status_col = self.status_col.unwrap_or(0);
        let txn = match Self::txn_get(&mut self.txns, &index) {
            Some(txn) => txn,
            None => return Err(OidErr::GenErr),
        };
        txn.finalize()?;
        if Some(col) == self.status_col {
            if let Some(row) = txn.extracted.take() {
                // destroy finalized; the row is gone for good
                drop(row);
            }
            if txn.creation_pending() && txn.inserted {
                let target = match txn.requested_status {
                    Some(RowStatus::CreateAndGo) => RowStatus::Active,
                    _ => RowStatus::NotInService,
                };
                match self.store.find_mut(&index) {
                    Some(row) => {
                        if Self::filled(&self.required_cols, row) {
                            row[col - 1] = int_syntax(target.as_i64());
                        }
                        // otherwise the row stays notReady until the
                        // required columns arrive
                    }
                    None => return Err(OidErr::GenErr),
                }
            }
        }
        txn.discard_undo(col, status_col);
        self.persist();
        Ok(())
    }

    /// Drop every transaction context, releasing any provisional row that
    /// never made it into the table.
    fn free(&mut self) {
        if !self.txns.is_empty() {
            debug!("Releasing {} row transaction context(s)", self.txns.len());
        }
        self.txns.clear();
    }
}
