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

//! The v4 -> next-generation upgrader: materializes the legacy intrusive
//! chains into reified list `Var`s and swings verb/prop ownership into a
//! fresh current-layout table.

use crate::object::current::CurrentObject;
use crate::object::legacy::LegacyObject;
use crate::objid::{NOTHING, Objid};
use crate::validator::{ObjectTable, Slot};
use crate::var::{Var, v_list, v_obj};
use tracing::info;

/// Walks `child`, `child.sibling`, `child.sibling.sibling`, ... until
/// `NOTHING`, appending each id in order.
fn walk_children(table: &ObjectTable<LegacyObject>, head: Objid) -> Vec<Objid> {
    let mut out = Vec::new();
    let mut cur = head;
    while cur != NOTHING {
        out.push(cur);
        cur = match table.get(&cur) {
            Some(Slot::Live(o)) => o.sibling,
            _ => NOTHING,
        };
    }
    out
}

/// Walks `contents`, `contents.next`, `contents.next.next`, ... until
/// `NOTHING`, appending each id in order.
fn walk_contents(table: &ObjectTable<LegacyObject>, head: Objid) -> Vec<Objid> {
    let mut out = Vec::new();
    let mut cur = head;
    while cur != NOTHING {
        out.push(cur);
        cur = match table.get(&cur) {
            Some(Slot::Live(o)) => o.next,
            _ => NOTHING,
        };
    }
    out
}

/// Consumes the legacy (v4) object table, in validated condition, and
/// produces the equivalent next-generation table. The legacy table is
/// dropped at the end of this call (Rust's ownership model gives us "after
/// the full pass, deallocate the legacy object table" for free).
pub fn upgrade(table: ObjectTable<LegacyObject>) -> ObjectTable<CurrentObject> {
    let mut out = ObjectTable::new();
    // Build child/contents lists before consuming the table by value, since
    // walking needs shared access to sibling objects.
    let mut child_lists = Vec::new();
    let mut contents_lists = Vec::new();
    for (id, slot) in &table {
        if let Slot::Live(obj) = slot {
            child_lists.push((*id, walk_children(&table, obj.child)));
            contents_lists.push((*id, walk_contents(&table, obj.contents)));
        }
    }
    let mut child_lists: std::collections::BTreeMap<_, _> = child_lists.into_iter().collect();
    let mut contents_lists: std::collections::BTreeMap<_, _> = contents_lists.into_iter().collect();

    let total = table.len();
    for (i, (id, slot)) in table.into_iter().enumerate() {
        if i > 0 && i % crate::validator::PROGRESS_INTERVAL == 0 {
            info!("upgrader: {i}/{total} objects upgraded");
        }
        match slot {
            Slot::Recycled => {
                out.insert(id, Slot::Recycled);
            }
            Slot::Live(legacy) => {
                let children = child_lists.remove(&id).unwrap_or_default();
                let contents = contents_lists.remove(&id).unwrap_or_default();
                let current = CurrentObject {
                    id,
                    name: legacy.name,
                    flags: legacy.flags,
                    owner: legacy.owner,
                    // Preserved as a scalar object Var, matching the
                    // original's `var_dup(new_obj(parent))` construction --
                    // not a single-element list. Both validators and
                    // downstream readers accept either shape on `parents`.
                    parents: v_obj(legacy.parent),
                    location: v_obj(legacy.location),
                    children: v_list(children.into_iter().map(Var::Obj).collect()),
                    contents: v_list(contents.into_iter().map(Var::Obj).collect()),
                    verbdefs: legacy.verbdefs,
                    propdefs: legacy.propdefs,
                    propvals: legacy.propvals,
                };
                out.insert(id, Slot::Live(current));
            }
        }
    }
    out
}
