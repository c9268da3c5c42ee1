/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Object memory: the accounting allocator, the intrusive all-objects list,
//! the mark-sweep collector, and host-visible handles.

pub mod buffer;
pub mod handle;
pub mod heap;
pub mod ptr;

/// The maximum number of temporary objects that can be made visible to the
/// collector at one time.
pub const MAX_TEMP_ROOTS: usize = 8;
