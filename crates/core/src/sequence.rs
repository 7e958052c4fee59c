//! Gap-filling sequence number allocation.
//!
//! Numbers are derived purely from the filenames currently stored on a
//! draft. The first integer from 1 upward that no stored filename uses is
//! the next number, so numbers freed by deletion are reused.

use std::collections::BTreeSet;

use crate::naming::parse_sequence_number;

/// First sequence number handed out for a draft.
pub const FIRST_SEQUENCE: u32 = 1;

/// Sequence numbers embedded in `filenames`.
///
/// Names that do not follow the canonical pattern contribute nothing.
pub fn used_sequence_numbers<'a, I>(filenames: I) -> BTreeSet<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    filenames
        .into_iter()
        .filter_map(parse_sequence_number)
        .collect()
}

/// Smallest number `>= FIRST_SEQUENCE` not present in `used`.
pub fn first_free(used: &BTreeSet<u32>) -> u32 {
    let mut candidate = FIRST_SEQUENCE;
    for n in used.range(FIRST_SEQUENCE..) {
        if *n != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

/// Next sequence number for a draft whose images carry `filenames`.
pub fn next_sequence_number<'a, I>(filenames: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    first_free(&used_sequence_numbers(filenames))
}
