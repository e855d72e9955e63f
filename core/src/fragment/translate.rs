//! Textual template expansion: turning the `@in<i>`/`@out<i>` token families a fragment's source
//! uses into OpenCL pointer-arithmetic text (spec §4.5).
//!
//! Like [`super::write_type::scan`], replacement must check the longest, most specific token
//! spelling first so that e.g. `@inNonlocal0` is never partially matched as `@in` followed by
//! literal text `Nonlocal0`.

use crate::cltype::CLType;
use crate::errors::FragmentError;
use crate::io;
use crate::layout::FieldType;

/// One `@in<i>` binding: which field (and in which addressing mode's `CLType`) fills token index
/// `i` when reading.
#[derive(Debug, Clone)]
pub struct ReadBinding {
    pub index: usize,
    pub field_type: FieldType,
    pub field_name: String,
    pub cl_type: CLType,
}

/// One `@out<i>` binding: which field (and `CLType`) token index `i` addresses when writing.
#[derive(Debug, Clone)]
pub struct WriteBinding {
    pub index: usize,
    pub field_type: FieldType,
    pub field_name: String,
    pub cl_type: CLType,
}

const READ_FAMILIES: &[&str] =
    &["@inElementNonlocal", "@inNonlocal", "@inElement", "@in"];
const WRITE_FAMILIES: &[&str] =
    &["@outElementNonlocal", "@outNonlocal", "@outElement", "@out"];

/// Scans `code` for every `@in...<i>` token and reports, per input index, whether *any*
/// occurrence addressing it used one of the two non-local families (`@inNonlocal`/
/// `@inElementNonlocal`) rather than a local one (spec §4.5: a non-local read lowers through the
/// mutable, non-prefixed `row`/`column`/`layer`/`tensorElement` coordinates a fragment may have
/// advanced, not the prolog's immutable per-thread `_row`/`_column`/`_layer`/`_tensorElement`).
pub fn scan_nonlocal_reads(code: &str, input_count: usize) -> Vec<bool> {
    let mut nonlocal = vec![false; input_count];
    let mut pos = 0;

    while let Some(rel) = code[pos..].find('@') {
        let start = pos + rel;
        let Some(family) = READ_FAMILIES.iter().find(|f| code[start..].starts_with(**f)) else {
            pos = start + 1;
            continue;
        };

        let digits_start = start + family.len();
        let digits_end = code[digits_start..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count()
            + digits_start;

        if digits_end > digits_start {
            if let Ok(index) = code[digits_start..digits_end].parse::<usize>() {
                if let Some(slot) = nonlocal.get_mut(index) {
                    if matches!(*family, "@inNonlocal" | "@inElementNonlocal") {
                        *slot = true;
                    }
                }
            }
            pos = digits_end;
        } else {
            pos = digits_start;
        }
    }
    nonlocal
}

/// Replaces every `@in...<i>` token in `code` with the read expression for the matching
/// [`ReadBinding`]. Leaves any token whose index has no binding untouched (the caller may still
/// reject that as malformed user code; this function only performs substitution).
pub fn translate_reads(code: &str, bindings: &[ReadBinding]) -> String {
    replace_tokens(code, READ_FAMILIES, |family, index| {
        let binding = bindings.iter().find(|b| b.index == index)?;
        Some(match family {
            "@inElementNonlocal" => io::read_element(&binding.field_type, &binding.field_name, false, false),
            "@inNonlocal" => io::read_tensor(&binding.field_type, &binding.field_name, binding.cl_type, false),
            "@inElement" => io::read_element(&binding.field_type, &binding.field_name, true, true),
            "@in" => io::read_tensor(&binding.field_type, &binding.field_name, binding.cl_type, true),
            _ => unreachable!(),
        })
    })
}

/// Replaces every `@out...<i>` token in `code` with an *lvalue* expression addressing the
/// matching [`WriteBinding`]'s field, so that user code of the form `@out0 = expr;` lowers to an
/// ordinary OpenCL assignment. Scalar (lane-count 1, non-pixel) targets lower to a plain buffer
/// subscript; wider/packed types lower to a pointer-cast dereference, which OpenCL C also accepts
/// as an assignable lvalue.
pub fn translate_writes(code: &str, bindings: &[WriteBinding]) -> Result<String, FragmentError> {
    let mut first_error = None;
    let result = replace_tokens(code, WRITE_FAMILIES, |family, index| {
        let binding = bindings.iter().find(|b| b.index == index)?;
        let local = matches!(family, "@outElement" | "@out");
        let per_element = matches!(family, "@outElementNonlocal" | "@outElement");
        match write_target(binding, local, per_element) {
            Ok(text) => Some(text),
            Err(err) => {
                first_error.get_or_insert(err);
                Some(std::string::String::new())
            }
        }
    });
    match first_error {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

/// Builds the lvalue a fragment writes directly to when performing an in-place non-local write
/// (spec §4.5 step 3): the same lowering [`translate_writes`] uses for the `@outNonlocal`/
/// `@outElementNonlocal` token families (mutable `row`/`column`/`layer`/`tensorElement`
/// coordinates, since an in-place non-local write is exactly the case where a fragment may have
/// advanced them), exposed directly so [`crate::hyperkernel`] can route a `UserCode` output's
/// write straight to a field address without a token round-trip through `@out<i>`.
pub fn in_place_write_target(binding: &WriteBinding, per_element: bool) -> Result<String, FragmentError> {
    write_target(binding, false, per_element)
}

fn write_target(binding: &WriteBinding, local: bool, per_element: bool) -> Result<String, FragmentError> {
    if binding.cl_type.is_pixel() {
        return Err(FragmentError::UnsupportedFieldType {
            operation: "translate_writes",
            detail: format!("field {:?} is image-backed; @out tokens require a buffer lvalue", binding.field_name),
        });
    }
    if binding.cl_type.lane_count() == 1 {
        let offset = io::field_offset(&binding.field_type, &binding.field_name, local);
        if per_element {
            let tensor_off = io::tensor_offset(&binding.field_name, local);
            return Ok(format!("{}[{}{}]", binding.field_name, offset, tensor_off));
        }
        return Ok(format!("{}[{}]", binding.field_name, offset));
    }
    let offset = io::field_offset(&binding.field_type, &binding.field_name, local);
    Ok(format!(
        "(*(__global {cl}*)&{field}[{offset}])",
        cl = binding.cl_type.name(),
        field = binding.field_name,
    ))
}

/// Replaces every `@in...<i>` token in `code` with `exprs[i]` verbatim, regardless of which
/// token family matched. Used once a parent fragment's value has already been resolved to a
/// fully-formed expression (a temporary variable from a sibling `UserCode` fragment, or a
/// pre-built field read) so no further field-aware lowering is needed.
pub fn substitute_reads(code: &str, exprs: &[String]) -> String {
    replace_tokens(code, READ_FAMILIES, |_family, index| exprs.get(index).cloned())
}

/// Replaces every `@out...<i>` token in `code` with `idents[i]` verbatim: the bare identifier of
/// a temporary variable a `UserCode` fragment's output has been allocated, rather than a field
/// lvalue (compare [`translate_writes`], which lowers straight to a field address).
pub fn substitute_writes(code: &str, idents: &[String]) -> String {
    replace_tokens(code, WRITE_FAMILIES, |_family, index| idents.get(index).cloned())
}

/// Scans `code` once, matching the longest token spelling from `families` at each `@` and
/// invoking `resolve(family, index)` for the replacement text. Families must be pre-sorted
/// longest-first by the caller.
fn replace_tokens(
    code: &str,
    families: &[&str],
    mut resolve: impl FnMut(&str, usize) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(code.len());
    let mut pos = 0;

    while let Some(rel) = code[pos..].find('@') {
        let start = pos + rel;
        out.push_str(&code[pos..start]);

        let matched = families.iter().find(|f| code[start..].starts_with(*f));
        let Some(family) = matched else {
            out.push('@');
            pos = start + 1;
            continue;
        };

        let digits_start = start + family.len();
        let digits_end = code[digits_start..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count()
            + digits_start;

        if digits_end == digits_start {
            out.push_str(family);
            pos = digits_start;
            continue;
        }

        let index: usize = code[digits_start..digits_end].parse().unwrap();
        match resolve(family, index) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&code[start..digits_end]),
        }
        pos = digits_end;
    }
    out.push_str(&code[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ElementType, Shape};

    fn scalar_field(name: &str) -> (FieldType, String) {
        (FieldType::new(Shape::d2(4, 5), Shape::scalar(), ElementType::Float32), name.to_string())
    }

    #[test]
    fn read_token_lowers_to_subscript() {
        let (ft, name) = scalar_field("_in_field_0");
        let bindings = vec![ReadBinding { index: 0, field_type: ft, field_name: name, cl_type: CLType::Float }];
        let out = translate_reads("@in0 + 0.5f", &bindings);
        assert_eq!(out, "_in_field_0[_row * _in_field_0_rowStride + _column] + 0.5f");
    }

    #[test]
    fn write_token_lowers_to_assignable_subscript() {
        let (ft, name) = scalar_field("_out_field_0");
        let bindings = vec![WriteBinding { index: 0, field_type: ft, field_name: name, cl_type: CLType::Float }];
        let out = translate_writes("@out0 = @in0 + 0.5f;", &bindings).unwrap();
        assert!(out.starts_with("_out_field_0[_row * _out_field_0_rowStride + _column] ="));
    }

    #[test]
    fn nonlocal_token_is_not_confused_with_local_prefix() {
        let (ft, name) = scalar_field("f");
        let bindings = vec![WriteBinding { index: 0, field_type: ft, field_name: name, cl_type: CLType::Float }];
        let out = translate_writes("@outNonlocal0 = 1.0f;", &bindings).unwrap();
        assert!(out.starts_with("f[row"));
    }

    #[test]
    fn unbound_index_is_left_untouched() {
        let out = translate_reads("@in3", &[]);
        assert_eq!(out, "@in3");
    }

    #[test]
    fn scan_nonlocal_reads_flags_only_the_nonlocal_families() {
        let flags = scan_nonlocal_reads("@out0 = @in0 + @inNonlocal1;", 2);
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn scan_nonlocal_reads_is_not_confused_by_the_local_prefix() {
        let flags = scan_nonlocal_reads("@in0 + @inElementNonlocal0;", 1);
        assert_eq!(flags, vec![true]);
    }
}
