// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The v4 ("legacy") object record: intrusive parent/child/sibling and
//! location/contents/next chains instead of reified list values.

use super::{
    Propdef, Propval, Verbdef, read_propdefs, read_propvals, read_verbdefs, write_propdefs,
    write_propvals, write_verbdefs,
};
use crate::dbio::{DbioError, DbioReader, DbioWriter};
use crate::objid::Objid;
use std::io::{BufRead, Write};

#[derive(Clone, Debug, PartialEq)]
pub struct LegacyObject {
    pub id: Objid,
    pub name: String,
    pub flags: u8,
    pub owner: Objid,
    pub location: Objid,
    pub contents: Objid,
    pub next: Objid,
    pub parent: Objid,
    pub child: Objid,
    pub sibling: Objid,
    pub verbdefs: Vec<Verbdef>,
    pub propdefs: Vec<Propdef>,
    pub propvals: Vec<Propval>,
}

/// Reads the body of a live v4 object record -- the header (`#<id>` line)
/// has already been consumed by the caller, which is responsible for
/// enforcing the `id == last_used_id + 1` sequencing rule (see
/// `textdump::read_objects`).
pub fn read_legacy_object_body<R: BufRead>(
    r: &mut DbioReader<R>,
    id: Objid,
) -> Result<LegacyObject, DbioError> {
    let name = r.read_interned_string(&mut crate::dbio::NullInterner)?;
    // Historical "handles" slot: an empty string kept around for
    // bit-compatibility with archival tools. We consume and discard it.
    let _handles = r.read_ephemeral_string()?;
    let flags = r.read_num()? as u8;
    let owner = r.read_objid()?;
    let location = r.read_objid()?;
    let contents = r.read_objid()?;
    let next = r.read_objid()?;
    let parent = r.read_objid()?;
    let child = r.read_objid()?;
    let sibling = r.read_objid()?;
    let verbdefs = read_verbdefs(r)?;
    let propdefs = read_propdefs(r)?;
    let propvals = read_propvals(r)?;
    Ok(LegacyObject {
        id,
        name,
        flags,
        owner,
        location,
        contents,
        next,
        parent,
        child,
        sibling,
        verbdefs,
        propdefs,
        propvals,
    })
}

pub fn write_legacy_object<W: Write>(
    w: &mut DbioWriter<W>,
    obj: &LegacyObject,
) -> Result<(), DbioError> {
    super::write_object_header(w, obj.id, false)?;
    w.write_interned_string(&obj.name)?;
    // Placeholder empty "handles" string, for bit-compatibility with
    // archival tools that still expect the slot to be present.
    w.write_ephemeral_string("")?;
    w.write_num(obj.flags as i64)?;
    w.write_objid(obj.owner)?;
    w.write_objid(obj.location)?;
    w.write_objid(obj.contents)?;
    w.write_objid(obj.next)?;
    w.write_objid(obj.parent)?;
    w.write_objid(obj.child)?;
    w.write_objid(obj.sibling)?;
    write_verbdefs(w, &obj.verbdefs)?;
    write_propdefs(w, &obj.propdefs)?;
    write_propvals(w, &obj.propvals)
}

pub fn write_recycled<W: Write>(w: &mut DbioWriter<W>, id: Objid) -> Result<(), DbioError> {
    super::write_object_header(w, id, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objid::NOTHING;
    use std::io::BufReader;

    fn sample() -> LegacyObject {
        LegacyObject {
            id: Objid(0),
            name: "root".into(),
            flags: 0,
            owner: Objid(3),
            location: NOTHING,
            contents: NOTHING,
            next: NOTHING,
            parent: NOTHING,
            child: NOTHING,
            sibling: NOTHING,
            verbdefs: vec![],
            propdefs: vec![],
            propvals: vec![],
        }
    }

    #[test]
    fn round_trips_minimal_object() {
        let obj = sample();
        let mut buf = Vec::new();
        {
            let mut w = DbioWriter::new(&mut buf);
            write_legacy_object(&mut w, &obj).unwrap();
        }
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let header = super::super::read_object_header(&mut r).unwrap();
        assert_eq!(header.id, obj.id);
        assert!(!header.recycled);
        let got = read_legacy_object_body(&mut r, header.id).unwrap();
        assert_eq!(got, obj);
    }

    #[test]
    fn recycled_slot_round_trips() {
        let mut buf = Vec::new();
        {
            let mut w = DbioWriter::new(&mut buf);
            write_recycled(&mut w, Objid(5)).unwrap();
        }
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let header = super::super::read_object_header(&mut r).unwrap();
        assert_eq!(header.id, Objid(5));
        assert!(header.recycled);
    }
}
