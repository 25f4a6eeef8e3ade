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

//! Record shapes shared by both on-disk object layouts: verbdefs, propdefs,
//! and propvals. The two layouts (`legacy`, `current`) differ only in how
//! they encode the location/contents/parent/child relations; everything
//! after that trailer is identical, which is why it lives here instead of
//! being duplicated in both submodules.

pub mod current;
pub mod legacy;

use crate::dbio::{DbioError, DbioReader, DbioWriter};
use crate::objid::Objid;
use crate::var::{TYPE_CLEAR, Var, v_int};
use std::io::{BufRead, Write};

/// A named, ordered entry attaching an (externally compiled) program to an
/// object. The intrusive "next-in-chain" pointer the in-memory runtime uses
/// collapses to plain vector order once reified here -- see the upgrader's
/// treatment of `child`/`sibling` chains for the general pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct Verbdef {
    pub name: String,
    pub owner: Objid,
    pub flags: u16,
    pub prep: i16,
}

/// Property schema entry. Propdefs are ordered; a child's local propdefs
/// are conceptually appended after its parent's (ancestor-first), but that
/// walk is the loader's job, not the codec's -- the codec only knows about
/// one object's local propdef list.
pub type Propdef = String;

/// A single object's property value slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Propval {
    pub value: Var,
    pub owner: Objid,
    pub flags: u8,
    /// True if this slot is "clear" (inherits its value from the defining
    /// ancestor rather than holding its own). The `TYPE_CLEAR` wire tag
    /// exists solely to represent this; there is no `Var::Clear` variant.
    pub is_clear: bool,
}

pub(crate) fn read_verbdef<R: BufRead>(r: &mut DbioReader<R>) -> Result<Verbdef, DbioError> {
    let name = r.read_ephemeral_string()?;
    let owner = r.read_objid()?;
    let flags = r.read_num()? as u16;
    let prep = r.read_num()? as i16;
    Ok(Verbdef {
        name,
        owner,
        flags,
        prep,
    })
}

pub(crate) fn write_verbdef<W: Write>(
    w: &mut DbioWriter<W>,
    v: &Verbdef,
) -> Result<(), DbioError> {
    w.write_ephemeral_string(&v.name)?;
    w.write_objid(v.owner)?;
    w.write_num(v.flags as i64)?;
    w.write_num(v.prep as i64)
}

pub(crate) fn read_propval<R: BufRead>(r: &mut DbioReader<R>) -> Result<Propval, DbioError> {
    let tag = r.read_num()?;
    let is_clear = tag == TYPE_CLEAR;
    let value = if is_clear {
        v_int(0)
    } else {
        r.read_var_value(tag)?
    };
    let owner = r.read_objid()?;
    let flags = r.read_num()? as u8;
    Ok(Propval {
        value,
        owner,
        flags,
        is_clear,
    })
}

pub(crate) fn write_propval<W: Write>(
    w: &mut DbioWriter<W>,
    p: &Propval,
) -> Result<(), DbioError> {
    if p.is_clear {
        w.write_num(TYPE_CLEAR)?;
    } else {
        w.write_var(&p.value)?;
    }
    w.write_objid(p.owner)?;
    w.write_num(p.flags as i64)
}

pub(crate) fn read_verbdefs<R: BufRead>(
    r: &mut DbioReader<R>,
) -> Result<Vec<Verbdef>, DbioError> {
    let n = r.read_num()?;
    (0..n).map(|_| read_verbdef(r)).collect()
}

pub(crate) fn write_verbdefs<W: Write>(
    w: &mut DbioWriter<W>,
    verbs: &[Verbdef],
) -> Result<(), DbioError> {
    w.write_num(verbs.len() as i64)?;
    verbs.iter().try_for_each(|v| write_verbdef(w, v))
}

pub(crate) fn read_propdefs<R: BufRead>(
    r: &mut DbioReader<R>,
) -> Result<Vec<Propdef>, DbioError> {
    let n = r.read_num()?;
    (0..n).map(|_| r.read_interned_string(&mut crate::dbio::NullInterner)).collect()
}

pub(crate) fn write_propdefs<W: Write>(
    w: &mut DbioWriter<W>,
    propdefs: &[Propdef],
) -> Result<(), DbioError> {
    w.write_num(propdefs.len() as i64)?;
    propdefs
        .iter()
        .try_for_each(|p| w.write_interned_string(p))
}

pub(crate) fn read_propvals<R: BufRead>(
    r: &mut DbioReader<R>,
) -> Result<Vec<Propval>, DbioError> {
    let n = r.read_num()?;
    (0..n).map(|_| read_propval(r)).collect()
}

pub(crate) fn write_propvals<W: Write>(
    w: &mut DbioWriter<W>,
    propvals: &[Propval],
) -> Result<(), DbioError> {
    w.write_num(propvals.len() as i64)?;
    propvals.iter().try_for_each(|p| write_propval(w, p))
}

/// The shared `#<id>\n` / `#<id> recycled\n` framing that opens every
/// object record, in both layouts.
pub struct ObjectHeader {
    pub id: Objid,
    pub recycled: bool,
}

pub(crate) fn read_object_header<R: BufRead>(
    r: &mut DbioReader<R>,
) -> Result<ObjectHeader, DbioError> {
    let line = r.read_ephemeral_string()?;
    let line = line.trim();
    let (spec, recycled) = match line.split_once(' ') {
        Some((spec, "recycled")) => (spec, true),
        Some((spec, trailer)) => {
            return Err(DbioError::Parse(
                format!("unexpected object record trailer {trailer:?} after {spec:?}"),
                r.line_num,
            ));
        }
        None => (line, false),
    };
    let Some(id_str) = spec.strip_prefix('#') else {
        return Err(DbioError::Parse(
            format!("invalid object spec: {spec}"),
            r.line_num,
        ));
    };
    let id: i32 = id_str
        .parse()
        .map_err(|_| DbioError::Parse(format!("invalid objid: {id_str}"), r.line_num))?;
    Ok(ObjectHeader {
        id: Objid(id),
        recycled,
    })
}

pub(crate) fn write_object_header<W: Write>(
    w: &mut DbioWriter<W>,
    id: Objid,
    recycled: bool,
) -> Result<(), DbioError> {
    if recycled {
        w.write_ephemeral_string(&format!("#{} recycled", id.0))
    } else {
        w.write_ephemeral_string(&format!("#{}", id.0))
    }
}

/// A single compiled verb program, keyed by `(object, verb index)`, stored
/// in the dump's program section rather than inline in the object record.
/// The source/bytecode text itself is an opaque blob handed off to the
/// external bytecode collaborator; this crate never parses it.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramRecord {
    pub objid: Objid,
    pub verb_index: usize,
    pub source: Option<String>,
}
