//! Local version metadata and version comparison.

use super::error::UpdateError;
use boxkeeper_util::fs::atomic_write;
use std::cmp::Ordering;
use std::path::Path;

/// Reported when the version metadata file is missing or unreadable.
pub const FALLBACK_VERSION: &str = "1.0.0";

/// Read the installed version from the `version` field of a JSON metadata file.
///
/// Never fails: any read or parse problem yields [`FALLBACK_VERSION`].
#[must_use]
pub fn read_current_version(version_file: &Path) -> String {
    std::fs::read_to_string(version_file)
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|json| json.get("version")?.as_str().map(str::to_string))
        .unwrap_or_else(|| FALLBACK_VERSION.to_string())
}

/// Persist `version` into the metadata file, keeping every other field.
///
/// A missing file is created with just the version field.
///
/// # Errors
/// Returns `VERSION_WRITE_FAILED` if the file holds invalid JSON or cannot be written.
pub fn write_version(version_file: &Path, version: &str) -> Result<(), UpdateError> {
    let mut json = match std::fs::read_to_string(version_file) {
        Ok(raw) => serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| {
            UpdateError::version_write_failed(format!(
                "Invalid JSON in {}: {e}",
                version_file.display()
            ))
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => {
            return Err(UpdateError::version_write_failed(format!(
                "Failed to read {}: {e}",
                version_file.display()
            )))
        }
    };

    let Some(obj) = json.as_object_mut() else {
        return Err(UpdateError::version_write_failed(format!(
            "{} is not a JSON object",
            version_file.display()
        )));
    };
    obj.insert(
        "version".to_string(),
        serde_json::Value::String(version.to_string()),
    );

    let mut out = serde_json::to_vec_pretty(&json)
        .map_err(|e| UpdateError::version_write_failed(e.to_string()))?;
    out.push(b'\n');
    atomic_write(version_file, &out).map_err(|e| {
        UpdateError::version_write_failed(format!(
            "Failed to write {}: {e}",
            version_file.display()
        ))
    })
}

/// Strip a single leading `v`/`V` from a release tag.
#[must_use]
pub fn normalize_tag(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Numeric value of one dotted component: its leading digits, or 0 when
/// there are none. `"3-beta"` reads as 3 and `"rc1"` as 0.
fn component(part: &str) -> u64 {
    let end = part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len());
    part[..end].parse().unwrap_or(0)
}

/// Compare two dotted version strings component by component.
///
/// A leading `v` is ignored and missing components count as 0, so `1.2`
/// equals `1.2.0`. Suffixes are not ordered: `1.0.0-beta` equals `1.0.0`.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<u64> = normalize_tag(a).split('.').map(component).collect();
    let right: Vec<u64> = normalize_tag(b).split('.').map(component).collect();

    for i in 0..left.len().max(right.len()) {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// [`compare_versions`] as -1/0/1.
#[must_use]
pub fn compare_versions_signum(a: &str, b: &str) -> i32 {
    match compare_versions(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}
