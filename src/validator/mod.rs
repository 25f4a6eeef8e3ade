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

//! The hierarchy validator: two algorithms selected by on-disk layout, both
//! producing a three-phase pass over the object table.
//!
//! Phase 1 (reference/type sanity) repairs in place and never fails the
//! load. Phases 2 (cycle detection) and 3 (bidirectional consistency) only
//! report; any structural problem they find is fatal, matching the
//! original's "is-repairable" boolean collapsing to "abort the load".

pub mod current;
pub mod legacy;

use crate::objid::Objid;
use std::collections::BTreeMap;

/// A dense object table slot: either a recycled placeholder (the id stays
/// reserved for identifier stability) or a live object.
#[derive(Clone, Debug)]
pub enum Slot<T> {
    Recycled,
    Live(T),
}

impl<T> Slot<T> {
    pub fn as_live(&self) -> Option<&T> {
        match self {
            Slot::Live(t) => Some(t),
            Slot::Recycled => None,
        }
    }
}

pub type ObjectTable<T> = BTreeMap<Objid, Slot<T>>;

pub fn is_live<T>(table: &ObjectTable<T>, id: Objid) -> bool {
    matches!(table.get(&id), Some(Slot::Live(_)))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cycle detected in {chain} chain starting at {start}")]
    Cycle { chain: &'static str, start: Objid },
    #[error("type mismatch on {field} of {obj}")]
    TypeMismatch { obj: Objid, field: &'static str },
    #[error(
        "bidirectional inconsistency between {a} and {b} on the {relation} relation"
    )]
    BidirectionalMismatch {
        a: Objid,
        b: Objid,
        relation: &'static str,
    },
}

/// Outcome of the repairable phase 1 pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    pub dangling_refs_repaired: usize,
    pub null_next_repairs: usize,
}

impl ValidationReport {
    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.dangling_refs_repaired += other.dangling_refs_repaired;
        self.null_next_repairs += other.null_next_repairs;
        self
    }
}

pub(crate) const PROGRESS_INTERVAL: usize = 10_000;
