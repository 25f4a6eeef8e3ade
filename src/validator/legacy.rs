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

use super::{ObjectTable, PROGRESS_INTERVAL, Slot, ValidationError, ValidationReport, is_live};
use crate::object::legacy::LegacyObject;
use crate::objid::{NOTHING, Objid};
use tracing::{info, warn};

/// Runs all three validation phases over a v4 object table, mutating it in
/// place to repair phase-1 issues. Returns the repair counts on success, or
/// the first structural problem phases 2/3 find (which aborts the load).
pub fn validate(table: &mut ObjectTable<LegacyObject>) -> Result<ValidationReport, ValidationError> {
    let report = phase1_reference_check(table);
    phase2_cycle_check(table)?;
    phase3_bidirectional_check(table)?;
    Ok(report)
}

fn progress(i: usize, total: usize, label: &str) {
    if i > 0 && i % PROGRESS_INTERVAL == 0 {
        info!("{label}: {i}/{total} objects scanned");
    }
}

fn phase1_reference_check(table: &mut ObjectTable<LegacyObject>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let ids: Vec<Objid> = table.keys().copied().collect();
    let total = ids.len();
    for (i, id) in ids.iter().enumerate() {
        progress(i, total, "validator phase 1 (legacy)");
        let Some(Slot::Live(obj)) = table.get(id) else {
            continue;
        };
        let refs = [
            ("location", obj.location),
            ("contents", obj.contents),
            ("next", obj.next),
            ("parent", obj.parent),
            ("child", obj.child),
            ("sibling", obj.sibling),
        ];
        let mut fixups: Vec<(&'static str, Objid)> = Vec::new();
        for (field, target) in refs {
            if target != NOTHING && !is_live(table, target) {
                warn!(
                    object = ?id,
                    field,
                    target = ?target,
                    "dangling reference rewritten to NOTHING"
                );
                fixups.push((field, NOTHING));
                report.dangling_refs_repaired += 1;
            }
        }
        let Some(Slot::Live(obj)) = table.get_mut(id) else {
            unreachable!()
        };
        for (field, _) in &fixups {
            match *field {
                "location" => obj.location = NOTHING,
                "contents" => obj.contents = NOTHING,
                "next" => obj.next = NOTHING,
                "parent" => obj.parent = NOTHING,
                "child" => obj.child = NOTHING,
                "sibling" => obj.sibling = NOTHING,
                _ => unreachable!(),
            }
        }
        if obj.location == NOTHING && obj.next != NOTHING {
            warn!(object = ?id, "location is NOTHING but next isn't; rewriting next to NOTHING");
            let Some(Slot::Live(obj)) = table.get_mut(id) else {
                unreachable!()
            };
            obj.next = NOTHING;
            report.null_next_repairs += 1;
        }
    }
    report
}

/// Walks a chain starting at `start`, stepping via `step`, stopping at
/// `NOTHING`. If the walk takes more steps than there are objects in the
/// table, the chain must be cyclic (a simple, finite chain can visit each
/// object at most once).
fn walk_is_cyclic<F>(table: &ObjectTable<LegacyObject>, start: Objid, step: F) -> bool
where
    F: Fn(&LegacyObject) -> Objid,
{
    let limit = table.len() + 1;
    let mut cur = start;
    let mut steps = 0;
    while cur != NOTHING {
        steps += 1;
        if steps > limit {
            return true;
        }
        let Some(Slot::Live(obj)) = table.get(&cur) else {
            // Dangling references were already repaired in phase 1; a
            // recycled/missing target here just ends the walk.
            break;
        };
        cur = step(obj);
    }
    false
}

fn phase2_cycle_check(table: &ObjectTable<LegacyObject>) -> Result<(), ValidationError> {
    let ids: Vec<Objid> = table.keys().copied().collect();
    let total = ids.len();
    for (i, id) in ids.iter().enumerate() {
        progress(i, total, "validator phase 2 (legacy)");
        let Some(Slot::Live(obj)) = table.get(id) else {
            continue;
        };
        if walk_is_cyclic(table, obj.parent, |o| o.parent) {
            return Err(ValidationError::Cycle {
                chain: "parent",
                start: *id,
            });
        }
        if walk_is_cyclic(table, obj.child, |o| o.sibling) {
            return Err(ValidationError::Cycle {
                chain: "child/sibling",
                start: *id,
            });
        }
        if walk_is_cyclic(table, obj.location, |o| o.location) {
            return Err(ValidationError::Cycle {
                chain: "location",
                start: *id,
            });
        }
        if walk_is_cyclic(table, obj.contents, |o| o.next) {
            return Err(ValidationError::Cycle {
                chain: "contents/next",
                start: *id,
            });
        }
    }
    Ok(())
}

fn child_chain_contains(table: &ObjectTable<LegacyObject>, parent: Objid, needle: Objid) -> bool {
    let Some(Slot::Live(p)) = table.get(&parent) else {
        return false;
    };
    let mut cur = p.child;
    while cur != NOTHING {
        if cur == needle {
            return true;
        }
        let Some(Slot::Live(o)) = table.get(&cur) else {
            break;
        };
        cur = o.sibling;
    }
    false
}

fn contents_chain_contains(table: &ObjectTable<LegacyObject>, loc: Objid, needle: Objid) -> bool {
    let Some(Slot::Live(l)) = table.get(&loc) else {
        return false;
    };
    let mut cur = l.contents;
    while cur != NOTHING {
        if cur == needle {
            return true;
        }
        let Some(Slot::Live(o)) = table.get(&cur) else {
            break;
        };
        cur = o.next;
    }
    false
}

fn phase3_bidirectional_check(table: &ObjectTable<LegacyObject>) -> Result<(), ValidationError> {
    let ids: Vec<Objid> = table.keys().copied().collect();
    let total = ids.len();
    for (i, id) in ids.iter().enumerate() {
        progress(i, total, "validator phase 3 (legacy)");
        let Some(Slot::Live(obj)) = table.get(id) else {
            continue;
        };
        if obj.parent != NOTHING && !child_chain_contains(table, obj.parent, *id) {
            return Err(ValidationError::BidirectionalMismatch {
                a: *id,
                b: obj.parent,
                relation: "parent/child",
            });
        }
        if obj.location != NOTHING && !contents_chain_contains(table, obj.location, *id) {
            return Err(ValidationError::BidirectionalMismatch {
                a: *id,
                b: obj.location,
                relation: "location/contents",
            });
        }
        // Dual direction: walk this object's own child/contents chains and
        // confirm each member points back.
        let mut cur = obj.child;
        while cur != NOTHING {
            let Some(Slot::Live(c)) = table.get(&cur) else {
                break;
            };
            if c.parent != *id {
                return Err(ValidationError::BidirectionalMismatch {
                    a: cur,
                    b: *id,
                    relation: "parent/child",
                });
            }
            cur = c.sibling;
        }
        let mut cur = obj.contents;
        while cur != NOTHING {
            let Some(Slot::Live(c)) = table.get(&cur) else {
                break;
            };
            if c.location != *id {
                return Err(ValidationError::BidirectionalMismatch {
                    a: cur,
                    b: *id,
                    relation: "location/contents",
                });
            }
            cur = c.next;
        }
    }
    Ok(())
}
