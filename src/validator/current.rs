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
use crate::object::current::CurrentObject;
use crate::objid::{NOTHING, Objid};
use crate::var::Var;
use std::collections::HashSet;
use tracing::{info, warn};

pub fn validate(
    table: &mut ObjectTable<CurrentObject>,
) -> Result<ValidationReport, ValidationError> {
    let report = phase1_type_and_reference_check(table)?;
    phase2_cycle_check(table)?;
    phase3_bidirectional_check(table)?;
    Ok(report)
}

fn progress(i: usize, total: usize, label: &str) {
    if i > 0 && i % PROGRESS_INTERVAL == 0 {
        info!("{label}: {i}/{total} objects scanned");
    }
}

fn phase1_type_and_reference_check(
    table: &mut ObjectTable<CurrentObject>,
) -> Result<ValidationReport, ValidationError> {
    let mut report = ValidationReport::default();
    let ids: Vec<Objid> = table.keys().copied().collect();
    let total = ids.len();
    for (i, id) in ids.iter().enumerate() {
        progress(i, total, "validator phase 1 (current)");

        // Type sanity, fatal if violated.
        {
            let Some(Slot::Live(obj)) = table.get(id) else {
                continue;
            };
            if !matches!(obj.location, Var::Obj(_)) {
                return Err(ValidationError::TypeMismatch {
                    obj: *id,
                    field: "location",
                });
            }
            let Some(contents) = obj.contents.as_list() else {
                return Err(ValidationError::TypeMismatch {
                    obj: *id,
                    field: "contents",
                });
            };
            if !contents.iter().all(|v| matches!(v, Var::Obj(_))) {
                return Err(ValidationError::TypeMismatch {
                    obj: *id,
                    field: "contents",
                });
            }
            if obj.parents.as_obj_or_list().is_none() {
                return Err(ValidationError::TypeMismatch {
                    obj: *id,
                    field: "parents",
                });
            }
            let Some(children) = obj.children.as_list() else {
                return Err(ValidationError::TypeMismatch {
                    obj: *id,
                    field: "children",
                });
            };
            if !children.iter().all(|v| matches!(v, Var::Obj(_))) {
                return Err(ValidationError::TypeMismatch {
                    obj: *id,
                    field: "children",
                });
            }
        }

        // Dangling-reference removal: lists drop invalid elements, scalars
        // rewrite to NOTHING.
        let Some(Slot::Live(obj)) = table.get(id) else {
            unreachable!()
        };
        let location = obj.location.as_object().unwrap();
        let new_location = if location != NOTHING && !is_live(table, location) {
            warn!(object = ?id, field = "location", target = ?location, "dangling reference rewritten to NOTHING");
            report.dangling_refs_repaired += 1;
            Some(NOTHING)
        } else {
            None
        };

        let contents = obj.contents.as_list().unwrap().to_vec();
        let (new_contents, removed) = filter_dangling_list(table, &contents);
        report.dangling_refs_repaired += removed;

        let children = obj.children.as_list().unwrap().to_vec();
        let (new_children, removed) = filter_dangling_list(table, &children);
        report.dangling_refs_repaired += removed;

        let new_parents = match &obj.parents {
            Var::Obj(p) if *p != NOTHING && !is_live(table, *p) => {
                warn!(object = ?id, field = "parents", target = ?p, "dangling reference rewritten to NOTHING");
                report.dangling_refs_repaired += 1;
                Some(Var::Obj(NOTHING))
            }
            Var::List(items) => {
                let (filtered, removed) = filter_dangling_list(table, items);
                report.dangling_refs_repaired += removed;
                if removed > 0 {
                    Some(filtered)
                } else {
                    None
                }
            }
            _ => None,
        };

        let Some(Slot::Live(obj)) = table.get_mut(id) else {
            unreachable!()
        };
        if let Some(loc) = new_location {
            obj.location = Var::Obj(loc);
        }
        obj.contents = new_contents;
        obj.children = new_children;
        if let Some(p) = new_parents {
            obj.parents = p;
        }
    }
    Ok(report)
}

fn filter_dangling_list(table: &ObjectTable<CurrentObject>, items: &[Var]) -> (Var, usize) {
    let mut removed = 0;
    let kept: Vec<Var> = items
        .iter()
        .filter(|v| {
            let keep = v.as_object().map(|o| is_live(table, o)).unwrap_or(false);
            if !keep {
                removed += 1;
            }
            keep
        })
        .cloned()
        .collect();
    (Var::List(kept), removed)
}

fn transitive_closure_contains_self<F>(
    table: &ObjectTable<CurrentObject>,
    start: Objid,
    next: F,
) -> bool
where
    F: Fn(&CurrentObject) -> Vec<Objid>,
{
    let mut visited: HashSet<Objid> = HashSet::new();
    let mut frontier = vec![start];
    while let Some(cur) = frontier.pop() {
        let Some(Slot::Live(obj)) = table.get(&cur) else {
            continue;
        };
        for n in next(obj) {
            if n == NOTHING {
                continue;
            }
            if n == start {
                return true;
            }
            if visited.insert(n) {
                frontier.push(n);
            }
        }
    }
    false
}

/// `db_ancestors(o)` / `db_all_locations(o)`: the transitive closure of the
/// parents / location relation. If `o` is a member of its own closure,
/// the hierarchy is cyclic.
fn phase2_cycle_check(table: &ObjectTable<CurrentObject>) -> Result<(), ValidationError> {
    let ids: Vec<Objid> = table.keys().copied().collect();
    let total = ids.len();
    for (i, id) in ids.iter().enumerate() {
        progress(i, total, "validator phase 2 (current)");
        if transitive_closure_contains_self(table, *id, |o| {
            o.parents.as_obj_or_list().unwrap_or_default()
        }) {
            return Err(ValidationError::Cycle {
                chain: "parents",
                start: *id,
            });
        }
        if transitive_closure_contains_self(table, *id, |o| {
            o.location.as_object().into_iter().collect()
        }) {
            return Err(ValidationError::Cycle {
                chain: "location",
                start: *id,
            });
        }
    }
    Ok(())
}

fn phase3_bidirectional_check(table: &ObjectTable<CurrentObject>) -> Result<(), ValidationError> {
    let ids: Vec<Objid> = table.keys().copied().collect();
    let total = ids.len();
    for (i, id) in ids.iter().enumerate() {
        progress(i, total, "validator phase 3 (current)");
        let Some(Slot::Live(obj)) = table.get(id) else {
            continue;
        };
        for parent in obj.parents.as_obj_or_list().unwrap_or_default() {
            if parent == NOTHING {
                continue;
            }
            let Some(Slot::Live(p)) = table.get(&parent) else {
                continue;
            };
            let children = p.children.as_list().unwrap_or(&[]);
            if !children.iter().any(|v| v.as_object() == Some(*id)) {
                return Err(ValidationError::BidirectionalMismatch {
                    a: *id,
                    b: parent,
                    relation: "parents/children",
                });
            }
        }
        for child in obj.children.as_list().unwrap_or(&[]) {
            let Some(child) = child.as_object() else {
                continue;
            };
            let Some(Slot::Live(c)) = table.get(&child) else {
                continue;
            };
            let parents = c.parents.as_obj_or_list().unwrap_or_default();
            if !parents.contains(id) {
                return Err(ValidationError::BidirectionalMismatch {
                    a: child,
                    b: *id,
                    relation: "parents/children",
                });
            }
        }
        let location = obj.location.as_object().unwrap_or(NOTHING);
        if location != NOTHING {
            let Some(Slot::Live(l)) = table.get(&location) else {
                continue;
            };
            let contents = l.contents.as_list().unwrap_or(&[]);
            if !contents.iter().any(|v| v.as_object() == Some(*id)) {
                return Err(ValidationError::BidirectionalMismatch {
                    a: *id,
                    b: location,
                    relation: "location/contents",
                });
            }
        }
        for occupant in obj.contents.as_list().unwrap_or(&[]) {
            let Some(occupant) = occupant.as_object() else {
                continue;
            };
            let Some(Slot::Live(o)) = table.get(&occupant) else {
                continue;
            };
            if o.location.as_object() != Some(*id) {
                return Err(ValidationError::BidirectionalMismatch {
                    a: occupant,
                    b: *id,
                    relation: "location/contents",
                });
            }
        }
    }
    Ok(())
}
