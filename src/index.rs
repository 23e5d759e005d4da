//! Codec between OID suffixes and row index values.
//!
//! A table row is addressed by the arcs that follow the column number in
//! the OID. Integer index columns contribute one arc; octet-string and
//! object-identifier columns contribute a length arc followed by their
//! contents, except that an IMPLIED final column drops the length arc
//! (RFC 2578 section 7.7). Decoding is only needed when a creation request
//! has to conjure the identity columns of a new row; failures there are
//! reported as `InconsistentName`.

use crate::keeper::{OType, OidErr};
use crate::txn::ColumnPolicy;
use num_traits::cast::ToPrimitive;
use rasn::types::{Integer, ObjectIdentifier};
use rasn_smi::v2::{ObjectSyntax, SimpleSyntax};

/// Build the index arcs for a row from its column values.
///
/// Index columns must be integer, string or object-identifier valued; the
/// table constructor has already checked that, so anything else here is a
/// programming error and panics.
pub fn encode_index(index_cols: &[usize], row: &[ObjectSyntax], implied_last: bool) -> Vec<u32> {
    let mut ret: Vec<u32> = Vec::new();
    for (n, colnum) in index_cols.iter().enumerate() {
        let col = &row[*colnum - 1];
        match col {
            ObjectSyntax::Simple(SimpleSyntax::Integer(i)) => {
                ret.push(i.to_u32().expect("integer index arc out of range"));
            }
            ObjectSyntax::Simple(SimpleSyntax::String(s)) => {
                if !implied_last || n < index_cols.len() - 1 {
                    let sl: u32 = s.len().try_into().expect("index string too long");
                    ret.push(sl);
                }
                for b in s {
                    ret.push(u32::from(*b));
                }
            }
            ObjectSyntax::Simple(SimpleSyntax::ObjectId(o)) => {
                if !implied_last || n < index_cols.len() - 1 {
                    let ol: u32 = o.len().try_into().expect("index oid too long");
                    ret.push(ol);
                }
                for arc in o.iter().copied() {
                    ret.push(arc);
                }
            }
            _ => panic!("Unsupported type in index construction"),
        }
    }
    ret
}

/// Decode index arcs into identity column values for a row creation.
///
/// Returns the values in index-column order. Anything that does not parse
/// back into the declared index column types, or leaves arcs over, is an
/// `InconsistentName`.
pub fn decode_index(
    arcs: &[u32],
    policies: &[ColumnPolicy],
    index_cols: &[usize],
    implied_last: bool,
) -> Result<Vec<ObjectSyntax>, OidErr> {
    let mut pos: usize = 0;
    let mut out: Vec<ObjectSyntax> = Vec::new();
    for (n, colnum) in index_cols.iter().enumerate() {
        let policy = &policies[colnum - 1];
        let last = n == index_cols.len() - 1;
        match policy.otype {
            OType::Integer | OType::RowStatus | OType::StorageType | OType::Unsigned => {
                if pos >= arcs.len() {
                    return Err(OidErr::InconsistentName);
                }
                out.push(ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(
                    i64::from(arcs[pos]),
                ))));
                pos += 1;
            }
            OType::String => {
                let take = if implied_last && last {
                    arcs.len() - pos
                } else {
                    if pos >= arcs.len() {
                        return Err(OidErr::InconsistentName);
                    }
                    let len = arcs[pos] as usize;
                    pos += 1;
                    len
                };
                if pos + take > arcs.len() {
                    return Err(OidErr::InconsistentName);
                }
                if take > policy.max_len {
                    return Err(OidErr::InconsistentName);
                }
                let mut buf: Vec<u8> = Vec::with_capacity(take);
                for arc in &arcs[pos..pos + take] {
                    let b: u8 = (*arc)
                        .try_into()
                        .map_err(|_| OidErr::InconsistentName)?;
                    buf.push(b);
                }
                pos += take;
                out.push(ObjectSyntax::Simple(SimpleSyntax::String(buf.into())));
            }
            OType::ObjectId => {
                let take = if implied_last && last {
                    arcs.len() - pos
                } else {
                    if pos >= arcs.len() {
                        return Err(OidErr::InconsistentName);
                    }
                    let len = arcs[pos] as usize;
                    pos += 1;
                    len
                };
                if pos + take > arcs.len() {
                    return Err(OidErr::InconsistentName);
                }
                let sub: Vec<u32> = arcs[pos..pos + take].to_vec();
                pos += take;
                let oid = ObjectIdentifier::new(sub).ok_or(OidErr::InconsistentName)?;
                out.push(ObjectSyntax::Simple(SimpleSyntax::ObjectId(oid)));
            }
            _ => return Err(OidErr::InconsistentName),
        }
    }
    if pos != arcs.len() {
        return Err(OidErr::InconsistentName);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::Access;

    fn string_policy(max_len: usize) -> ColumnPolicy {
        ColumnPolicy::string(Access::NoAccess, 1, max_len)
    }

    #[test]
    fn implied_string_round_trip() {
        let policies = [string_policy(32), ColumnPolicy::row_status(Access::ReadCreate)];
        let arcs = [b'w' as u32, b'a' as u32, b'n' as u32];
        let vals = decode_index(&arcs, &policies, &[1], true).unwrap();
        assert_eq!(
            vals,
            vec![ObjectSyntax::Simple(SimpleSyntax::String(
                b"wan".to_vec().into()
            ))]
        );
        let row = vec![
            vals[0].clone(),
            ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(1))),
        ];
        assert_eq!(encode_index(&[1], &row, true), arcs.to_vec());
    }

    #[test]
    fn plain_string_carries_length_arc() {
        let policies = [string_policy(32)];
        let arcs = [2, b'o' as u32, b'k' as u32];
        let vals = decode_index(&arcs, &policies, &[1], false).unwrap();
        let row = vec![vals[0].clone()];
        assert_eq!(encode_index(&[1], &row, false), arcs.to_vec());
    }

    #[test]
    fn integer_index_single_arc() {
        let policies = [ColumnPolicy::integer(Access::NoAccess)];
        let vals = decode_index(&[7], &policies, &[1], false).unwrap();
        assert_eq!(
            vals,
            vec![ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(
                7i64
            )))]
        );
    }

    #[test]
    fn oversized_byte_arc_rejected() {
        let policies = [string_policy(32)];
        let res = decode_index(&[1, 256], &policies, &[1], false);
        assert_eq!(res, Err(OidErr::InconsistentName));
    }

    #[test]
    fn leftover_arcs_rejected() {
        let policies = [ColumnPolicy::integer(Access::NoAccess)];
        let res = decode_index(&[7, 9], &policies, &[1], false);
        assert_eq!(res, Err(OidErr::InconsistentName));
    }

    #[test]
    fn truncated_string_rejected() {
        let policies = [string_policy(32)];
        let res = decode_index(&[5, b'a' as u32], &policies, &[1], false);
        assert_eq!(res, Err(OidErr::InconsistentName));
    }

    #[test]
    fn over_long_index_string_rejected() {
        let policies = [string_policy(2)];
        let res = decode_index(
            &[3, b'a' as u32, b'b' as u32, b'c' as u32],
            &policies,
            &[1],
            false,
        );
        assert_eq!(res, Err(OidErr::InconsistentName));
    }
}
