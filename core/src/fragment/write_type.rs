//! Write-type inference: scanning a `UserCode` fragment's text to learn, per output slot, which
//! write-token family it used (spec §4.5/§4.6).
//!
//! The token families are, in descending specificity (the order [`scan`] must check them in to
//! avoid one token's name being a prefix of another's):
//!
//! - `@outElementNonlocal<i>` — per-element, non-local write → [`WriteType::ElementNonlocal`]
//! - `@outNonlocal<i>`        — whole-tensor, non-local write → [`WriteType::Nonlocal`]
//! - `@outElement<i>`         — per-element, local write      → [`WriteType::Local`]
//! - `@out<i>`                — whole-tensor, local write     → [`WriteType::Local`]
//!
//! plus the newer GPU-operator spellings, which use a `_` sigil rather than `@` and so never
//! collide with the families above:
//!
//! - `_writeTensorElementNonlocal<i>` → [`WriteType::ElementNonlocal`]
//! - `_writeTensorNonlocal<i>`        → [`WriteType::Nonlocal`]
//! - `_writeTensorElementLocal<i>`    → [`WriteType::Local`]
//! - `_writeTensorLocal<i>`           → [`WriteType::Local`]

use crate::errors::FragmentError;

/// How a `UserCode` fragment writes one of its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    /// Not yet scanned.
    Unknown,
    /// The output slot is never written by this fragment.
    Null,
    /// Written via `@out<i>` or `@outElement<i>`: a local (in-place, forward-mergeable) write.
    Local,
    /// Written via `@outNonlocal<i>`: a whole-tensor non-local write. Disqualifies the output as
    /// a forward-merge source (spec §4.7).
    Nonlocal,
    /// Written via `@outElementNonlocal<i>`: a per-element non-local write, valid only in
    /// `TensorElement` addressing.
    ElementNonlocal,
}

const TOKEN_FAMILIES: &[(&str, WriteType)] = &[
    ("@outElementNonlocal", WriteType::ElementNonlocal),
    ("@outNonlocal", WriteType::Nonlocal),
    ("@outElement", WriteType::Local),
    ("@out", WriteType::Local),
    ("_writeTensorElementNonlocal", WriteType::ElementNonlocal),
    ("_writeTensorNonlocal", WriteType::Nonlocal),
    ("_writeTensorElementLocal", WriteType::Local),
    ("_writeTensorLocal", WriteType::Local),
];

/// Scans `code` for every write token (`@out...<i>` or the newer `_writeTensor...<i>` spelling)
/// and returns the [`WriteType`] of each of `output_count` output slots ([`WriteType::Null`] for
/// a slot the code never writes).
///
/// Returns [`FragmentError::MultipleWriteTypes`] if two tokens of different families target the
/// same output slot — per spec, all write statements for one output must be of the same type.
pub fn scan(code: &str, output_count: usize) -> Result<Vec<WriteType>, FragmentError> {
    let mut found = vec![None; output_count];
    let bytes = code.as_bytes();
    let mut pos = 0;

    while let Some(rel) = code[pos..].find(|c| c == '@' || c == '_') {
        let start = pos + rel;
        let Some((write_type, token_len)) = TOKEN_FAMILIES
            .iter()
            .find(|(token, _)| code[start..].starts_with(token))
            .map(|(token, wt)| (*wt, token.len()))
        else {
            pos = start + 1;
            continue;
        };

        let digits_start = start + token_len;
        let digits_end = bytes[digits_start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
            + digits_start;

        if digits_end > digits_start {
            if let Ok(index) = code[digits_start..digits_end].parse::<usize>() {
                if let Some(slot) = found.get_mut(index) {
                    match *slot {
                        None => *slot = Some(write_type),
                        Some(existing) if existing == write_type => {}
                        Some(existing) => {
                            return Err(FragmentError::MultipleWriteTypes {
                                output_index: index,
                                first: existing,
                                second: write_type,
                            });
                        }
                    }
                }
            }
        }

        pos = digits_end.max(start + 1);
    }

    Ok(found.into_iter().map(|wt| wt.unwrap_or(WriteType::Null)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_write_is_classified() {
        let types = scan("@out0 = a + b;", 1).unwrap();
        assert_eq!(types, vec![WriteType::Local]);
    }

    #[test]
    fn nonlocal_is_not_confused_with_local_prefix() {
        let types = scan("@outNonlocal0 = a;", 1).unwrap();
        assert_eq!(types, vec![WriteType::Nonlocal]);
    }

    #[test]
    fn element_nonlocal_is_its_own_family() {
        let types = scan("@outElementNonlocal2 = a;", 3).unwrap();
        assert_eq!(types[2], WriteType::ElementNonlocal);
    }

    #[test]
    fn unwritten_slot_is_null() {
        let types = scan("@out0 = a;", 2).unwrap();
        assert_eq!(types[1], WriteType::Null);
    }

    #[test]
    fn conflicting_families_on_same_slot_is_an_error() {
        let err = scan("@out0 = a; @outNonlocal0 = b;", 1).unwrap_err();
        assert!(matches!(err, FragmentError::MultipleWriteTypes { output_index: 0, .. }));
    }

    #[test]
    fn repeated_same_family_write_is_fine() {
        let types = scan("@out0 = a; @out0 += b;", 1).unwrap();
        assert_eq!(types, vec![WriteType::Local]);
    }

    #[test]
    fn newer_underscore_spelling_is_recognized() {
        let types = scan("_writeTensorElementNonlocal0(ptr, value);", 1).unwrap();
        assert_eq!(types, vec![WriteType::ElementNonlocal]);
    }

    #[test]
    fn newer_local_spelling_does_not_collide_with_element_variant() {
        let types = scan("_writeTensorLocal0(value);", 1).unwrap();
        assert_eq!(types, vec![WriteType::Local]);
    }
}
