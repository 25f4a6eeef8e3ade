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

#[cfg(test)]
mod test {
    use moor_persist::dbio::{DbioReader, DbioWriter};
    use moor_persist::object::legacy::LegacyObject;
    use moor_persist::object::legacy::write_legacy_object;
    use moor_persist::objid::{NOTHING, Objid};
    use moor_persist::textdump::{TextdumpError, load_textdump};
    use moor_persist::validator::{Slot, ValidationError};
    use std::io::BufReader;

    fn minimal_object(id: i32) -> LegacyObject {
        LegacyObject {
            id: Objid(id),
            name: "root".into(),
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

    fn header(buf: &mut Vec<u8>, nobjs: i64, nusers: i64) -> DbioWriter<&mut Vec<u8>> {
        let mut w = DbioWriter::new(buf);
        w.write_ephemeral_string("** LambdaMOO Database, Format Version 4 **")
            .unwrap();
        w.write_num(nobjs).unwrap();
        w.write_num(0).unwrap();
        w.write_num(0).unwrap();
        w.write_num(nusers).unwrap();
        w
    }

    /// Scenario 1: minimal legacy DB with a single unconnected root object.
    #[test]
    fn minimal_legacy_db_loads_and_upgrades_cleanly() {
        let mut buf = Vec::new();
        {
            let mut w = header(&mut buf, 1, 1);
            w.write_objid(Objid(0)).unwrap();
            write_legacy_object(&mut w, &minimal_object(0)).unwrap();
            w.write_counted_line(0, " clocks").unwrap();
            w.write_counted_line(0, " active connections").unwrap();
        }

        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let db = load_textdump(&mut r).expect("load should succeed");
        assert!(db.was_upgraded);
        assert_eq!(db.validation.dangling_refs_repaired, 0);
        let Some(Slot::Live(obj)) = db.objects.get(&Objid(0)) else {
            panic!("expected a live object at #0");
        };
        assert_eq!(obj.parents.as_obj_or_list().unwrap(), vec![NOTHING]);
        assert_eq!(obj.location.as_object(), Some(NOTHING));
        assert_eq!(obj.children.as_list().unwrap(), &[]);
        assert_eq!(obj.contents.as_list().unwrap(), &[]);
    }

    /// Scenario 2: a dangling parent reference is repaired, not rejected.
    #[test]
    fn dangling_parent_is_repaired_not_rejected() {
        let mut buf = Vec::new();
        {
            let mut w = header(&mut buf, 1, 1);
            w.write_objid(Objid(0)).unwrap();
            let mut obj = minimal_object(0);
            obj.parent = Objid(5);
            write_legacy_object(&mut w, &obj).unwrap();
            w.write_counted_line(0, " clocks").unwrap();
            w.write_counted_line(0, " active connections").unwrap();
        }

        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let db = load_textdump(&mut r).expect("load should succeed despite the dangling parent");
        assert_eq!(db.validation.dangling_refs_repaired, 1);
        let Some(Slot::Live(obj)) = db.objects.get(&Objid(0)) else {
            panic!("expected a live object at #0");
        };
        assert_eq!(obj.parents.as_obj_or_list().unwrap(), vec![NOTHING]);
    }

    /// Scenario 3: a direct parent cycle aborts the load.
    #[test]
    fn parent_cycle_aborts_load() {
        let mut buf = Vec::new();
        {
            let mut w = header(&mut buf, 2, 0);
            let mut o0 = minimal_object(0);
            o0.parent = Objid(1);
            let mut o1 = minimal_object(1);
            o1.parent = Objid(0);
            write_legacy_object(&mut w, &o0).unwrap();
            write_legacy_object(&mut w, &o1).unwrap();
            w.write_counted_line(0, " clocks").unwrap();
            w.write_counted_line(0, " active connections").unwrap();
        }

        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let err = load_textdump(&mut r).expect_err("a parent cycle must abort the load");
        assert!(matches!(
            err,
            TextdumpError::Validation(ValidationError::Cycle { chain: "parent", .. })
        ));
    }
}
