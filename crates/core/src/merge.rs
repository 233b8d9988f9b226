//! Deep key-fill and structural merge over JSON values
//!
//! Two recursive merge rules share the same plain-object-only recursion:
//! - [`fill_defaults`]: copy keys that are *missing*, never overwrite.
//!   Used to apply default values on load so schemas can grow new fields
//!   without a migration pass (filled in memory only, never rewritten to
//!   storage as a side effect of reading).
//! - [`merge_into`]: overwrite keys. Used by container partial saves to
//!   keep the in-memory snapshot in step with the persisted patch.
//!
//! Arrays and scalars are never merged element-wise: they are copied
//! wholesale (when absent for fill, always for merge).

use serde_json::Value;

/// Recursively copy keys from `defaults` that are missing from `target`.
///
/// Keys present in both where both values are plain objects are recursed
/// into; any other present key is left untouched. Non-object targets are
/// returned unchanged.
pub fn fill_defaults(target: &mut Value, defaults: &Value) {
    let (Value::Object(target), Value::Object(defaults)) = (target, defaults) else {
        return;
    };
    for (key, default_value) in defaults {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), default_value.clone());
            }
            Some(existing) if existing.is_object() && default_value.is_object() => {
                fill_defaults(existing, default_value);
            }
            Some(_) => {}
        }
    }
}

/// Recursively overwrite `target` with `patch`.
///
/// Plain objects merge key-by-key; everything else (arrays, scalars, or a
/// shape mismatch) replaces the target wholesale.
pub fn merge_into(target: &mut Value, patch: &Value) {
    match (&mut *target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        merge_into(existing, patch_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        _ => *target = patch.clone(),
    }
}
