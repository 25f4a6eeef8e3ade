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

//! The next-generation ("current") object record: relations are reified
//! `Var` lists instead of intrusive chains.

use super::{
    Propdef, Propval, Verbdef, read_propdefs, read_propvals, read_verbdefs, write_propdefs,
    write_propvals, write_verbdefs,
};
use crate::dbio::{DbioError, DbioReader, DbioWriter};
use crate::objid::Objid;
use crate::var::Var;
use std::io::{BufRead, Write};

#[derive(Clone, Debug, PartialEq)]
pub struct CurrentObject {
    pub id: Objid,
    pub name: String,
    pub flags: u8,
    pub owner: Objid,
    /// A bare object reference (`Var::Obj`).
    pub location: Var,
    /// A list of object references (`Var::List`).
    pub contents: Var,
    /// Either a bare object reference or a list of object references --
    /// see the upgrader's note on preserving this polymorphism.
    pub parents: Var,
    /// A list of object references (`Var::List`).
    pub children: Var,
    pub verbdefs: Vec<Verbdef>,
    pub propdefs: Vec<Propdef>,
    pub propvals: Vec<Propval>,
}

pub fn read_current_object_body<R: BufRead>(
    r: &mut DbioReader<R>,
    id: Objid,
) -> Result<CurrentObject, DbioError> {
    let name = r.read_interned_string(&mut crate::dbio::NullInterner)?;
    let flags = r.read_num()? as u8;
    let owner = r.read_objid()?;
    let location = r.read_var()?;
    let contents = r.read_var()?;
    let parents = r.read_var()?;
    let children = r.read_var()?;
    let verbdefs = read_verbdefs(r)?;
    let propdefs = read_propdefs(r)?;
    let propvals = read_propvals(r)?;
    Ok(CurrentObject {
        id,
        name,
        flags,
        owner,
        location,
        contents,
        parents,
        children,
        verbdefs,
        propdefs,
        propvals,
    })
}

pub fn write_current_object<W: Write>(
    w: &mut DbioWriter<W>,
    obj: &CurrentObject,
) -> Result<(), DbioError> {
    super::write_object_header(w, obj.id, false)?;
    w.write_interned_string(&obj.name)?;
    w.write_num(obj.flags as i64)?;
    w.write_objid(obj.owner)?;
    w.write_var(&obj.location)?;
    w.write_var(&obj.contents)?;
    w.write_var(&obj.parents)?;
    w.write_var(&obj.children)?;
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
    use crate::var::{v_list, v_obj};
    use std::io::BufReader;

    fn sample() -> CurrentObject {
        CurrentObject {
            id: Objid(0),
            name: "root".into(),
            flags: 0,
            owner: Objid(3),
            location: v_obj(NOTHING),
            contents: v_list(vec![]),
            parents: v_obj(NOTHING),
            children: v_list(vec![]),
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
            write_current_object(&mut w, &obj).unwrap();
        }
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let header = super::super::read_object_header(&mut r).unwrap();
        let got = read_current_object_body(&mut r, header.id).unwrap();
        assert_eq!(got, obj);
    }

    #[test]
    fn parents_accepts_scalar_or_list() {
        let mut obj = sample();
        obj.parents = v_list(vec![v_obj(Objid(1)), v_obj(Objid(2))]);
        let mut buf = Vec::new();
        {
            let mut w = DbioWriter::new(&mut buf);
            write_current_object(&mut w, &obj).unwrap();
        }
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let header = super::super::read_object_header(&mut r).unwrap();
        let got = read_current_object_body(&mut r, header.id).unwrap();
        assert_eq!(
            got.parents.as_obj_or_list().unwrap(),
            vec![Objid(1), Objid(2)]
        );
    }
}
