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
    use moor_persist::object::current::CurrentObject;
    use moor_persist::objid::{NOTHING, Objid};
    use moor_persist::validator::{ObjectTable, Slot, current};
    use moor_persist::var::{v_list, v_obj};

    fn obj(id: i32) -> CurrentObject {
        CurrentObject {
            id: Objid(id),
            name: format!("obj{id}"),
            flags: 0,
            owner: Objid(0),
            location: v_obj(NOTHING),
            contents: v_list(vec![]),
            parents: v_obj(NOTHING),
            children: v_list(vec![]),
            verbdefs: vec![],
            propdefs: vec![],
            propvals: vec![],
        }
    }

    /// Builds a small room/container/item tree: #0 is the root and the
    /// location of #1, which contains #2. #1 also has #0 as a parent.
    fn small_world() -> ObjectTable<CurrentObject> {
        let mut table = ObjectTable::new();

        let mut root = obj(0);
        root.children = v_list(vec![v_obj(Objid(1))]);
        root.contents = v_list(vec![v_obj(Objid(1))]);

        let mut room = obj(1);
        room.parents = v_obj(Objid(0));
        room.location = v_obj(Objid(0));
        room.contents = v_list(vec![v_obj(Objid(2))]);

        let mut item = obj(2);
        item.location = v_obj(Objid(1));

        table.insert(Objid(0), Slot::Live(root));
        table.insert(Objid(1), Slot::Live(room));
        table.insert(Objid(2), Slot::Live(item));
        table.insert(Objid(3), Slot::Recycled);
        table
    }

    #[test]
    fn consistent_world_validates_with_no_repairs() {
        let mut table = small_world();
        let report = current::validate(&mut table).expect("well-formed world should validate");
        assert_eq!(report.dangling_refs_repaired, 0);
    }

    /// "For every recycled slot ID, no live object references ID" -- a
    /// reference to a recycled slot is repaired exactly like a reference to
    /// a nonexistent id, since both fail `is_live`.
    #[test]
    fn reference_to_recycled_slot_is_treated_as_dangling() {
        let mut table = ObjectTable::new();
        let mut o = obj(0);
        o.location = v_obj(Objid(1));
        table.insert(Objid(0), Slot::Live(o));
        table.insert(Objid(1), Slot::Recycled);

        let report = current::validate(&mut table).unwrap();
        assert_eq!(report.dangling_refs_repaired, 1);
        let Some(Slot::Live(o)) = table.get(&Objid(0)) else {
            panic!()
        };
        assert_eq!(o.location.as_object(), Some(NOTHING));
    }

    /// C ∈ children(P) ⇔ P ∈ parents(C), checked in both directions by
    /// breaking only one side of the relation.
    #[test]
    fn one_sided_parent_child_link_is_fatal() {
        let mut table = small_world();
        let mut room = obj(1);
        room.parents = v_obj(NOTHING); // #0 no longer claims #1 as a parent...
        table.insert(Objid(1), Slot::Live(room));
        // ...but #0.children still lists #1.
        let err = current::validate(&mut table).unwrap_err();
        assert!(matches!(
            err,
            moor_persist::validator::ValidationError::BidirectionalMismatch { .. }
        ));
    }

    /// O ∉ ancestors(O): a multi-hop ancestor cycle is still caught, not
    /// just the direct self-reference case.
    #[test]
    fn indirect_ancestor_cycle_is_caught() {
        let mut table = ObjectTable::new();
        let mut o0 = obj(0);
        o0.parents = v_obj(Objid(2));
        let mut o1 = obj(1);
        o1.parents = v_obj(Objid(0));
        let mut o2 = obj(2);
        o2.parents = v_obj(Objid(1));
        table.insert(Objid(0), Slot::Live(o0));
        table.insert(Objid(1), Slot::Live(o1));
        table.insert(Objid(2), Slot::Live(o2));

        let err = current::validate(&mut table).unwrap_err();
        assert!(matches!(
            err,
            moor_persist::validator::ValidationError::Cycle { chain: "parents", .. }
        ));
    }
}
