//! Runtime-installable key comparators for backing sub-collections.
//!
//! LMDB compares keys (and, in `DUP_SORT` mode, duplicate values) with a
//! plain `extern "C"` function pointer fixed when the sub-collection is
//! created; `heed` exposes that as a `Comparator` trait implemented by a
//! *type*, not a closure. Our index and tree configs, however, accept an
//! ordinary runtime function pointer (`CompareFn`) supplied by the host
//! program. This module bridges the two: a fixed bank of marker types
//! each forward to a slot in [`SLOTS`], and [`install`] claims a slot for
//! a given `CompareFn` the first time it is used on a sub-collection.

use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::error::Error;

/// A key comparator: two borrowed byte strings in, their ordering out.
///
/// Comparators must be pure functions of their inputs (no captured
/// state), matching LMDB's requirement that the comparison be stable for
/// the lifetime of the sub-collection.
pub type CompareFn = fn(&[u8], &[u8]) -> Ordering;

const MAX_SLOTS: usize = 16;

static SLOTS: [OnceLock<CompareFn>; MAX_SLOTS] = [const { OnceLock::new() }; MAX_SLOTS];

/// A claimed slot identifying one comparator for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparatorSlot(pub(crate) usize);

/// Finds the existing slot for `cmp`, or claims a fresh one.
///
/// Comparators are compared by function pointer identity: registering
/// the same `fn` twice (e.g. reopening a tree) reuses the same slot
/// rather than exhausting the bank.
pub fn install(cmp: CompareFn) -> Result<ComparatorSlot, Error> {
    for (idx, slot) in SLOTS.iter().enumerate() {
        if let Some(existing) = slot.get() {
            if std::ptr::eq(*existing as *const (), cmp as *const ()) {
                return Ok(ComparatorSlot(idx));
            }
        }
    }
    for (idx, slot) in SLOTS.iter().enumerate() {
        if slot.set(cmp).is_ok() {
            return Ok(ComparatorSlot(idx));
        }
    }
    Err(Error::generic(
        "comparator",
        format!("exhausted the {MAX_SLOTS}-slot comparator bank"),
    ))
}

fn invoke(slot: usize, a: &[u8], b: &[u8]) -> Ordering {
    let cmp = SLOTS[slot]
        .get()
        .expect("comparator slot invoked before being installed");
    cmp(a, b)
}

/// Generates one monomorphized marker type per slot implementing
/// `heed::Comparator`, so `backend::create_database` can select the
/// right type parameter for a given [`ComparatorSlot`] at database-open
/// time via the slot-dispatch match in `backend.rs`.
macro_rules! comparator_slots {
    ($($idx:literal => $name:ident),* $(,)?) => {
        $(
            /// Trampoline into comparator slot `$idx`.
            #[derive(Debug)]
            pub enum $name {}

            impl heed::Comparator for $name {
                fn compare(a: &[u8], b: &[u8]) -> Ordering {
                    invoke($idx, a, b)
                }
            }
        )*
    };
}

comparator_slots! {
    0 => Slot0, 1 => Slot1, 2 => Slot2, 3 => Slot3,
    4 => Slot4, 5 => Slot5, 6 => Slot6, 7 => Slot7,
    8 => Slot8, 9 => Slot9, 10 => Slot10, 11 => Slot11,
    12 => Slot12, 13 => Slot13, 14 => Slot14, 15 => Slot15,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reverse_lexicographic(a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }

    fn numeric(a: &[u8], b: &[u8]) -> Ordering {
        let a = u64::from_be_bytes(a.try_into().unwrap());
        let b = u64::from_be_bytes(b.try_into().unwrap());
        a.cmp(&b)
    }

    #[test]
    fn installing_the_same_fn_pointer_reuses_its_slot() {
        let s1 = install(reverse_lexicographic).unwrap();
        let s2 = install(reverse_lexicographic).unwrap();
        assert_eq!(s1, s2);

        let s3 = install(numeric).unwrap();
        assert_ne!(s1, s3);
    }

    #[test]
    fn invoke_dispatches_to_the_installed_fn() {
        let slot = install(reverse_lexicographic).unwrap();
        assert_eq!(invoke(slot.0, b"a", b"b"), Ordering::Greater);
    }
}
