// ── Structural merge ──
//
// Partial updates from the controller are applied in place through the
// `Patch` trait. Every typed record, collection and scalar knows how to
// absorb a JSON fragment without replacing subtrees the fragment does not
// mention. Merging the same fragment twice is a no-op the second time.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::trace;

/// Why part of a patch was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Strict merge met a key the target does not declare.
    UnknownKey,
    /// The patch value has a different JSON type than the target.
    TypeMismatch { expected: &'static str },
}

/// A skipped part of a patch, with the path it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeDiagnostic {
    pub path: String,
    pub kind: DiagnosticKind,
}

impl fmt::Display for MergeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnknownKey => write!(f, "{}: unknown key", self.path),
            DiagnosticKind::TypeMismatch { expected } => {
                write!(f, "{}: expected {expected}", self.path)
            }
        }
    }
}

/// State threaded through one merge.
#[derive(Debug, Default)]
pub struct MergeContext {
    strict: bool,
    path: Vec<String>,
    diagnostics: Vec<MergeDiagnostic>,
}

impl MergeContext {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            ..Self::default()
        }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn push(&mut self, key: &str) {
        self.path.push(key.to_owned());
    }

    pub fn push_index(&mut self, index: usize) {
        self.path.push(format!("[{index}]"));
    }

    pub fn pop(&mut self) {
        self.path.pop();
    }

    pub fn diagnostics(&self) -> &[MergeDiagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<MergeDiagnostic> {
        self.diagnostics
    }

    fn current_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }

    fn record(&mut self, kind: DiagnosticKind) {
        let diagnostic = MergeDiagnostic {
            path: self.current_path(),
            kind,
        };
        trace!(%diagnostic, "merge skipped");
        self.diagnostics.push(diagnostic);
    }

    pub fn type_mismatch(&mut self, expected: &'static str) {
        self.record(DiagnosticKind::TypeMismatch { expected });
    }

    /// Handle a key the record does not declare.
    ///
    /// Strict merges skip it with a diagnostic; lenient merges keep it in
    /// the record's `extra` map.
    pub fn unknown_key(
        &mut self,
        extra: &mut BTreeMap<String, Value>,
        key: &str,
        value: &Value,
    ) -> bool {
        if self.strict {
            self.record(DiagnosticKind::UnknownKey);
            return false;
        }
        match extra.get_mut(key) {
            Some(existing) => merge_into(existing, value, self),
            None => {
                extra.insert(key.to_owned(), value.clone());
                true
            }
        }
    }
}

/// A value that can absorb a partial JSON update in place.
pub trait Patch {
    /// Apply `value` to `self`. Returns whether anything changed.
    fn patch(&mut self, value: &Value, ctx: &mut MergeContext) -> bool;
}

/// Reset a field to its default, as done for an explicit `null`.
pub(crate) fn reset<T: Default + PartialEq>(target: &mut T) -> bool {
    let default = T::default();
    if *target == default {
        false
    } else {
        *target = default;
        true
    }
}

// ── Scalars ──────────────────────────────────────────────────────────

macro_rules! patch_scalar {
    ($($ty:ty => $expected:literal),* $(,)?) => {
        $(
            impl $crate::model::patch::Patch for $ty {
                fn patch(
                    &mut self,
                    value: &serde_json::Value,
                    ctx: &mut $crate::model::patch::MergeContext,
                ) -> bool {
                    if value.is_null() {
                        return $crate::model::patch::reset(self);
                    }
                    match <$ty as serde::Deserialize>::deserialize(value) {
                        Ok(v) if v == *self => false,
                        Ok(v) => {
                            *self = v;
                            true
                        }
                        Err(_) => {
                            ctx.type_mismatch($expected);
                            false
                        }
                    }
                }
            }
        )*
    };
}

pub(crate) use patch_scalar;

patch_scalar! {
    bool => "boolean",
    String => "string",
    f64 => "number",
    i32 => "integer",
    i64 => "integer",
    u32 => "unsigned integer",
    u64 => "unsigned integer",
}

// ── Collections ──────────────────────────────────────────────────────

impl<T: Patch + Default> Patch for Option<T> {
    fn patch(&mut self, value: &Value, ctx: &mut MergeContext) -> bool {
        if value.is_null() {
            return self.take().is_some();
        }
        match self {
            Some(inner) => inner.patch(value, ctx),
            None => {
                let mut fresh = T::default();
                fresh.patch(value, ctx);
                *self = Some(fresh);
                true
            }
        }
    }
}

/// Arrays are merged by index: the target is truncated to the patch
/// length, existing elements are patched, and extra elements appended.
impl<T: Patch + Default> Patch for Vec<T> {
    fn patch(&mut self, value: &Value, ctx: &mut MergeContext) -> bool {
        if value.is_null() {
            let changed = !self.is_empty();
            self.clear();
            return changed;
        }
        let Some(items) = value.as_array() else {
            ctx.type_mismatch("array");
            return false;
        };

        let mut changed = false;
        if self.len() > items.len() {
            self.truncate(items.len());
            changed = true;
        }
        for (index, item) in items.iter().enumerate() {
            ctx.push_index(index);
            if let Some(existing) = self.get_mut(index) {
                changed |= existing.patch(item, ctx);
            } else {
                let mut fresh = T::default();
                fresh.patch(item, ctx);
                self.push(fresh);
                changed = true;
            }
            ctx.pop();
        }
        changed
    }
}

/// Free-form subtrees (user variables, limits) accept any keys.
impl Patch for Value {
    fn patch(&mut self, value: &Value, ctx: &mut MergeContext) -> bool {
        let strict = ctx.strict;
        ctx.strict = false;
        let changed = merge_into(self, value, ctx);
        ctx.strict = strict;
        changed
    }
}

// ── Untyped merge ────────────────────────────────────────────────────

/// Outcome of an untyped merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub changed: bool,
    pub diagnostics: Vec<MergeDiagnostic>,
}

/// Merge `patch` into an untyped JSON `target`.
///
/// Arrays are truncated to the patch length and merged by index. Objects
/// are merged key by key: under `strict`, keys missing from the target are
/// skipped with a diagnostic. `null` replaces the target value. Type
/// mismatches are skipped with a diagnostic.
pub fn merge_value(target: &mut Value, patch: &Value, strict: bool) -> MergeOutcome {
    let mut ctx = MergeContext::new(strict);
    let changed = merge_into(target, patch, &mut ctx);
    MergeOutcome {
        changed,
        diagnostics: ctx.into_diagnostics(),
    }
}

fn merge_into(target: &mut Value, patch: &Value, ctx: &mut MergeContext) -> bool {
    if patch.is_null() {
        if target.is_null() {
            return false;
        }
        *target = Value::Null;
        return true;
    }
    // A null slot takes whatever the controller sends.
    if target.is_null() {
        *target = patch.clone();
        return true;
    }

    match (target, patch) {
        (Value::Object(existing), Value::Object(fields)) => {
            let mut changed = false;
            for (key, item) in fields {
                ctx.push(key);
                match existing.get_mut(key) {
                    Some(slot) => changed |= merge_into(slot, item, ctx),
                    None if ctx.strict => ctx.record(DiagnosticKind::UnknownKey),
                    None => {
                        existing.insert(key.clone(), item.clone());
                        changed = true;
                    }
                }
                ctx.pop();
            }
            changed
        }
        (Value::Array(existing), Value::Array(items)) => {
            let mut changed = false;
            if existing.len() > items.len() {
                existing.truncate(items.len());
                changed = true;
            }
            for (index, item) in items.iter().enumerate() {
                ctx.push_index(index);
                if let Some(slot) = existing.get_mut(index) {
                    changed |= merge_into(slot, item, ctx);
                } else {
                    existing.push(item.clone());
                    changed = true;
                }
                ctx.pop();
            }
            changed
        }
        (target, value) => {
            if same_kind(target, value) {
                if *target == *value {
                    return false;
                }
                *target = value.clone();
                true
            } else {
                ctx.type_mismatch(kind_name(target));
                false
            }
        }
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
    )
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn arrays_truncate_to_patch_length() {
        let mut target = json!([{ "a": 1 }, { "a": 2 }, { "a": 3 }]);
        let outcome = merge_value(&mut target, &json!([{ "a": 9 }]), true);
        assert!(outcome.changed);
        assert_eq!(target, json!([{ "a": 9 }]));
    }

    #[test]
    fn arrays_grow_verbatim() {
        let mut target = json!([1]);
        merge_value(&mut target, &json!([1, 2, 3]), true);
        assert_eq!(target, json!([1, 2, 3]));
    }

    #[test]
    fn strict_merge_skips_unknown_keys() {
        let mut target = json!({ "known": 1 });
        let outcome = merge_value(&mut target, &json!({ "known": 2, "invented": true }), true);
        assert_eq!(target, json!({ "known": 2 }));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].path, "invented");
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::UnknownKey);
    }

    #[test]
    fn lenient_merge_adds_keys() {
        let mut target = json!({ "known": 1 });
        merge_value(&mut target, &json!({ "added": "x" }), false);
        assert_eq!(target, json!({ "known": 1, "added": "x" }));
    }

    #[test]
    fn null_clears_and_mismatch_is_skipped() {
        let mut target = json!({ "a": { "b": 1 }, "c": "text" });
        let outcome = merge_value(&mut target, &json!({ "a": null, "c": 5 }), true);
        assert_eq!(target, json!({ "a": null, "c": "text" }));
        assert_eq!(
            outcome.diagnostics[0].kind,
            DiagnosticKind::TypeMismatch { expected: "string" }
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let patch = json!({ "a": [1, { "b": 2 }], "c": null, "d": "x" });
        let mut once = json!({ "a": [0, { "b": 0 }, 7], "c": 1, "d": "y" });
        merge_value(&mut once, &patch, false);
        let mut twice = once.clone();
        let outcome = merge_value(&mut twice, &patch, false);
        assert!(!outcome.changed);
        assert_eq!(once, twice);
    }

    #[test]
    fn typed_vec_merges_by_index() {
        let mut target: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), None];
        let mut ctx = MergeContext::new(true);
        assert!(target.patch(&json!([null, 4.5]), &mut ctx));
        assert_eq!(target, vec![None, Some(4.5)]);
        assert!(!target.patch(&json!([null, 4.5]), &mut ctx));
    }

    #[test]
    fn scalar_type_mismatch_keeps_value() {
        let mut target = 3_u32;
        let mut ctx = MergeContext::new(true);
        ctx.push("count");
        assert!(!target.patch(&json!("three"), &mut ctx));
        assert_eq!(target, 3);
        assert_eq!(ctx.diagnostics()[0].path, "count");
    }

    #[test]
    fn null_resets_non_optional_scalar() {
        let mut target = String::from("busy");
        let mut ctx = MergeContext::new(true);
        assert!(target.patch(&Value::Null, &mut ctx));
        assert_eq!(target, "");
    }
}
