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

use std::fmt;

/// An object reference: a signed integer naming an object slot.
///
/// `NOTHING` (-1) means "no object". Identifiers are dense: the set of live
/// identifiers is `{0, ..., max}` with holes marked as recycled.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Objid(pub i32);

pub const NOTHING: Objid = Objid(-1);

impl Objid {
    pub const fn mk(id: i32) -> Self {
        Objid(id)
    }

    pub fn is_nothing(&self) -> bool {
        *self == NOTHING
    }

    /// True if this id falls within `0..=last_used_id`, i.e. it's a
    /// plausible (not necessarily live) slot.
    pub fn in_range(&self, last_used_id: i32) -> bool {
        self.0 >= 0 && self.0 <= last_used_id
    }
}

impl fmt::Display for Objid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i32> for Objid {
    fn from(v: i32) -> Self {
        Objid(v)
    }
}
