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

//! The top-level load/dump orchestrator: header parsing, layout-version
//! dispatch, section sequencing, and collaborator hand-offs. Everything
//! this module reads or writes ends up as one in-memory [`LoadedDb`],
//! always in current (list-valued) layout -- a legacy load silently runs
//! the upgrader before returning, matching the pipeline described for the
//! whole crate.

use crate::dbio::{DbioError, DbioReader, DbioWriter};
use crate::object::current::{CurrentObject, read_current_object_body, write_current_object};
use crate::object::legacy::{LegacyObject, read_legacy_object_body, write_legacy_object};
use crate::object::{ProgramRecord, read_object_header, write_object_header};
use crate::objid::{NOTHING, Objid};
use crate::upgrade;
use crate::validator::{ObjectTable, Slot, ValidationError, ValidationReport, current, legacy};
use std::io::{BufRead, Write};
use strum::{Display, FromRepr};
use tracing::info;

pub const DBV_NEXT_GEN: u16 = 5;

/// Sub-versions of the legacy (v4) format, in the original's historical
/// order. Anything at or above [`DBV_NEXT_GEN`] is a next-generation
/// version and doesn't need this level of granularity here.
#[repr(u16)]
#[derive(Debug, Eq, PartialEq, Display, Ord, PartialOrd, Copy, Clone, FromRepr)]
pub enum LegacyDbVersion {
    DbvPrehistory = 0,
    DbvExceptions = 1,
    DbvBreakCont = 2,
    DbvFloat = 3,
    DbvBfbugFixed = 4,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum DbVersion {
    Legacy(LegacyDbVersion),
    NextGen(u16),
}

impl DbVersion {
    pub fn parse_header_line(line: &str) -> Option<Self> {
        let v = line
            .strip_prefix("** LambdaMOO Database, Format Version ")?
            .strip_suffix(" **")?;
        let v: u16 = v.parse().ok()?;
        if v < DBV_NEXT_GEN {
            Some(DbVersion::Legacy(LegacyDbVersion::from_repr(v)?))
        } else {
            Some(DbVersion::NextGen(v))
        }
    }

    pub fn to_header_line(self) -> String {
        let v = match self {
            DbVersion::Legacy(v) => v as u16,
            DbVersion::NextGen(v) => v,
        };
        format!("** LambdaMOO Database, Format Version {v} **")
    }

    pub fn is_legacy(self) -> bool {
        matches!(self, DbVersion::Legacy(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextdumpError {
    #[error("malformed or unrecognized header line: {0:?}")]
    Header(String),
    #[error("object record id {got} out of sequence, expected {expected}")]
    OutOfSequence { expected: Objid, got: Objid },
    #[error("malformed program record header: {0:?}")]
    ProgramHeader(String),
    #[error(transparent)]
    Dbio(#[from] DbioError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The task-queue and active-connections sections are opaque payloads
/// owned by collaborators outside this crate; we preserve them verbatim
/// as a count-prefixed block of raw lines, per `DbioReader::read_counted_line`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassthroughSection {
    pub lines: Vec<String>,
}

fn read_passthrough_section<R: BufRead>(
    r: &mut DbioReader<R>,
    suffix: &str,
) -> Result<PassthroughSection, DbioError> {
    let n = r.read_counted_line(suffix)?;
    let lines = (0..n).map(|_| r.read_ephemeral_string()).collect::<Result<_, _>>()?;
    Ok(PassthroughSection { lines })
}

fn write_passthrough_section<W: Write>(
    w: &mut DbioWriter<W>,
    suffix: &str,
    section: &PassthroughSection,
) -> Result<(), DbioError> {
    w.write_counted_line(section.lines.len(), suffix)?;
    section.lines.iter().try_for_each(|l| w.write_ephemeral_string(l))
}

/// A fully loaded, validated, and (if necessary) upgraded database, always
/// in current-layout form in memory.
#[derive(Debug)]
pub struct LoadedDb {
    pub version: DbVersion,
    pub was_upgraded: bool,
    pub users: Vec<Objid>,
    pub objects: ObjectTable<CurrentObject>,
    pub programs: Vec<ProgramRecord>,
    pub tasks: PassthroughSection,
    pub connections: PassthroughSection,
    pub validation: ValidationReport,
}

fn read_counts<R: BufRead>(r: &mut DbioReader<R>) -> Result<(usize, usize, usize), DbioError> {
    let nobjs = r.read_num()?;
    let nprogs = r.read_num()?;
    let _reserved = r.read_num()?; // historical slot, always 0 on write
    let nusers = r.read_num()?;
    Ok((nobjs as usize, nprogs as usize, nusers as usize))
}

fn read_users<R: BufRead>(r: &mut DbioReader<R>, nusers: usize) -> Result<Vec<Objid>, DbioError> {
    (0..nusers).map(|_| r.read_objid()).collect()
}

fn read_programs<R: BufRead>(
    r: &mut DbioReader<R>,
    nprogs: usize,
) -> Result<Vec<ProgramRecord>, TextdumpError> {
    (0..nprogs)
        .map(|_| {
            let header = r.read_ephemeral_string()?;
            let (oid_str, verb_str) = header
                .strip_prefix('#')
                .and_then(|s| s.split_once(':'))
                .ok_or_else(|| TextdumpError::ProgramHeader(header.clone()))?;
            let oid: i32 = oid_str
                .parse()
                .map_err(|_| TextdumpError::ProgramHeader(header.clone()))?;
            let verb_index: usize = verb_str
                .parse()
                .map_err(|_| TextdumpError::ProgramHeader(header.clone()))?;
            let source = r.read_program_blob()?;
            Ok(ProgramRecord {
                objid: Objid(oid),
                verb_index,
                source,
            })
        })
        .collect()
}

fn write_programs<W: Write>(
    w: &mut DbioWriter<W>,
    programs: &[ProgramRecord],
) -> Result<(), DbioError> {
    for p in programs {
        w.write_ephemeral_string(&format!("#{}:{}", p.objid.0, p.verb_index))?;
        w.write_program_blob(p.source.as_deref())?;
    }
    Ok(())
}

fn read_legacy_objects<R: BufRead>(
    r: &mut DbioReader<R>,
    nobjs: usize,
) -> Result<ObjectTable<LegacyObject>, TextdumpError> {
    let mut table = ObjectTable::new();
    let mut last_used_id = NOTHING;
    for _ in 0..nobjs {
        let header = read_object_header(r)?;
        let expected = Objid(last_used_id.0 + 1);
        if header.id != expected {
            return Err(TextdumpError::OutOfSequence {
                expected,
                got: header.id,
            });
        }
        last_used_id = header.id;
        if header.recycled {
            table.insert(header.id, Slot::Recycled);
        } else {
            let obj = read_legacy_object_body(r, header.id)?;
            table.insert(header.id, Slot::Live(obj));
        }
    }
    Ok(table)
}

fn read_current_objects<R: BufRead>(
    r: &mut DbioReader<R>,
    nobjs: usize,
) -> Result<ObjectTable<CurrentObject>, TextdumpError> {
    let mut table = ObjectTable::new();
    let mut last_used_id = NOTHING;
    for _ in 0..nobjs {
        let header = read_object_header(r)?;
        let expected = Objid(last_used_id.0 + 1);
        if header.id != expected {
            return Err(TextdumpError::OutOfSequence {
                expected,
                got: header.id,
            });
        }
        last_used_id = header.id;
        if header.recycled {
            table.insert(header.id, Slot::Recycled);
        } else {
            let obj = read_current_object_body(r, header.id)?;
            table.insert(header.id, Slot::Live(obj));
        }
    }
    Ok(table)
}

fn write_objects<W: Write>(
    w: &mut DbioWriter<W>,
    table: &ObjectTable<CurrentObject>,
) -> Result<(), DbioError> {
    for (id, slot) in table {
        match slot {
            Slot::Recycled => write_object_header(w, *id, true)?,
            Slot::Live(obj) => write_current_object(w, obj)?,
        }
    }
    Ok(())
}

/// Reads a full textdump: header, counts, users, objects, programs, task
/// queue, and connection sections, in that fixed order. Runs the matching
/// hierarchy validator immediately after the object section, and the
/// v4-\>next-gen upgrader if the on-disk layout was legacy.
pub fn load_textdump<R: BufRead>(r: &mut DbioReader<R>) -> Result<LoadedDb, TextdumpError> {
    let header_line = r.read_ephemeral_string()?;
    let version = DbVersion::parse_header_line(&header_line)
        .ok_or_else(|| TextdumpError::Header(header_line.clone()))?;
    info!(?version, "loading textdump");

    let (nobjs, nprogs, nusers) = read_counts(r)?;
    let users = read_users(r, nusers)?;

    let (objects, validation, was_upgraded) = if version.is_legacy() {
        let mut legacy_table = read_legacy_objects(r, nobjs)?;
        let report = legacy::validate(&mut legacy_table)?;
        info!("upgrading legacy object table to current layout");
        let current_table = upgrade::upgrade(legacy_table);
        (current_table, report, true)
    } else {
        let mut current_table = read_current_objects(r, nobjs)?;
        let report = current::validate(&mut current_table)?;
        (current_table, report, false)
    };

    let programs = read_programs(r, nprogs)?;
    let tasks = read_passthrough_section(r, " clocks")?;
    let connections = read_passthrough_section(r, " active connections")?;

    Ok(LoadedDb {
        version,
        was_upgraded,
        users,
        objects,
        programs,
        tasks,
        connections,
        validation,
    })
}

/// Writes a full textdump in the fixed section order (header, counts,
/// users, objects, programs, tasks, connections), always emitting the
/// current-layout object record shape regardless of the database's
/// original on-disk version -- a dump is always written in today's format.
pub fn dump_textdump<W: Write>(w: &mut DbioWriter<W>, db: &LoadedDb) -> Result<(), DbioError> {
    let dump_version = if db.version.is_legacy() {
        DbVersion::NextGen(DBV_NEXT_GEN)
    } else {
        db.version
    };
    w.write_ephemeral_string(&dump_version.to_header_line())?;
    w.write_num(db.objects.len() as i64)?;
    w.write_num(db.programs.len() as i64)?;
    w.write_num(0)?;
    w.write_num(db.users.len() as i64)?;
    for u in &db.users {
        w.write_objid(*u)?;
    }
    write_objects(w, &db.objects)?;
    write_programs(w, &db.programs)?;
    write_passthrough_section(w, " clocks", &db.tasks)?;
    write_passthrough_section(w, " active connections", &db.connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::legacy::write_legacy_object;
    use std::io::BufReader;

    fn minimal_legacy_object(id: i32) -> LegacyObject {
        LegacyObject {
            id: Objid(id),
            name: format!("obj{id}"),
            flags: 0,
            owner: Objid(0),
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

    fn build_legacy_textdump() -> Vec<u8> {
        let mut buf = Vec::new();
        let mut w = DbioWriter::new(&mut buf);
        w.write_ephemeral_string("** LambdaMOO Database, Format Version 4 **")
            .unwrap();
        w.write_num(1).unwrap(); // nobjs
        w.write_num(0).unwrap(); // nprogs
        w.write_num(0).unwrap(); // reserved
        w.write_num(1).unwrap(); // nusers
        w.write_objid(Objid(0)).unwrap();
        write_legacy_object(&mut w, &minimal_legacy_object(0)).unwrap();
        w.write_counted_line(0, " clocks").unwrap();
        w.write_counted_line(0, " active connections").unwrap();
        buf
    }

    #[test]
    fn loads_minimal_legacy_textdump_and_upgrades() {
        let buf = build_legacy_textdump();
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let db = load_textdump(&mut r).unwrap();
        assert!(db.was_upgraded);
        assert_eq!(db.users, vec![Objid(0)]);
        assert_eq!(db.objects.len(), 1);
        assert!(matches!(db.objects.get(&Objid(0)), Some(Slot::Live(_))));
    }

    #[test]
    fn round_trips_through_dump_and_reload() {
        let buf = build_legacy_textdump();
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let db = load_textdump(&mut r).unwrap();

        let mut out = Vec::new();
        let mut w = DbioWriter::new(&mut out);
        dump_textdump(&mut w, &db).unwrap();

        let mut r2 = DbioReader::new(BufReader::new(out.as_slice()));
        let reloaded = load_textdump(&mut r2).unwrap();
        assert!(!reloaded.was_upgraded);
        assert_eq!(reloaded.objects.len(), db.objects.len());
        assert_eq!(reloaded.users, db.users);
    }

    #[test]
    fn program_records_round_trip() {
        let mut buf = Vec::new();
        let mut w = DbioWriter::new(&mut buf);
        w.write_ephemeral_string("** LambdaMOO Database, Format Version 5 **")
            .unwrap();
        w.write_num(1).unwrap(); // nobjs
        w.write_num(1).unwrap(); // nprogs
        w.write_num(0).unwrap();
        w.write_num(0).unwrap(); // nusers
        let obj = crate::object::current::CurrentObject {
            id: Objid(0),
            name: "root".into(),
            flags: 0,
            owner: Objid(0),
            location: crate::var::v_obj(NOTHING),
            contents: crate::var::v_list(vec![]),
            parents: crate::var::v_obj(NOTHING),
            children: crate::var::v_list(vec![]),
            verbdefs: vec![],
            propdefs: vec![],
            propvals: vec![],
        };
        write_current_object(&mut w, &obj).unwrap();
        w.write_ephemeral_string("#0:0").unwrap();
        w.write_program_blob(Some("return 1;")).unwrap();
        w.write_counted_line(0, " clocks").unwrap();
        w.write_counted_line(0, " active connections").unwrap();
        drop(w);

        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let db = load_textdump(&mut r).unwrap();
        assert_eq!(db.programs.len(), 1);
        assert_eq!(db.programs[0].objid, Objid(0));
        assert_eq!(db.programs[0].verb_index, 0);
        assert_eq!(db.programs[0].source.as_deref(), Some("return 1;"));
    }

    #[test]
    fn rejects_out_of_sequence_object_id() {
        let mut buf = Vec::new();
        let mut w = DbioWriter::new(&mut buf);
        w.write_ephemeral_string("** LambdaMOO Database, Format Version 4 **")
            .unwrap();
        w.write_num(1).unwrap();
        w.write_num(0).unwrap();
        w.write_num(0).unwrap();
        w.write_num(0).unwrap();
        write_legacy_object(&mut w, &minimal_legacy_object(5)).unwrap(); // should be #0
        drop(w);

        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let err = load_textdump(&mut r).unwrap_err();
        assert!(matches!(err, TextdumpError::OutOfSequence { .. }));
    }

    #[test]
    fn rejects_unrecognized_header() {
        let mut buf = Vec::new();
        let mut w = DbioWriter::new(&mut buf);
        w.write_ephemeral_string("not a header").unwrap();
        drop(w);
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let err = load_textdump(&mut r).unwrap_err();
        assert!(matches!(err, TextdumpError::Header(_)));
    }
}
