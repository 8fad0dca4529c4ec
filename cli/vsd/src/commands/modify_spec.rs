//! `vsd modify-spec`: apply modification files to a specification in place.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use vsd_spec::{compose, Catalog, SpecModification};

/// Compose and write back; the original is saved next to it with an `.orig`
/// extension.
pub fn run(spec: &Path, spec_mods: &[PathBuf]) -> Result<()> {
    let base = Catalog::load(spec).with_context(|| format!("failed to load {}", spec.display()))?;
    let mods = spec_mods
        .iter()
        .map(|p| SpecModification::load(p).with_context(|| format!("failed to load {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    // Compose before touching anything so a bad modification leaves no trace.
    let effective = compose(&base, &mods)?;

    let backup = spec.with_extension("orig");
    fs::copy(spec, &backup).with_context(|| format!("failed to save {}", backup.display()))?;
    println!("Saved original specification in {}", backup.display());

    fs::write(spec, effective.composed().to_json_pretty())
        .with_context(|| format!("failed to write {}", spec.display()))?;
    println!(
        "Applied {} modification(s) to {} ({} node types)",
        mods.len(),
        spec.display(),
        effective.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{"nodes": [{"name": "LED", "category": "IO/LED"}]}"#;

    #[test]
    fn modifies_in_place_and_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("components-specification.json");
        fs::write(&spec, SPEC).unwrap();
        let m = dir.path().join("mod.json");
        fs::write(
            &m,
            r#"{"add_nodes": [{"name": "Button", "category": "IO/Button"}]}"#,
        )
        .unwrap();

        run(&spec, &[m]).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("components-specification.orig")).unwrap(), SPEC);
        let updated = Catalog::load(&spec).unwrap();
        assert!(updated.contains("Button"));
        assert!(updated.contains("LED"));
    }

    #[test]
    fn failed_composition_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("spec.json");
        fs::write(&spec, SPEC).unwrap();
        let m = dir.path().join("mod.json");
        fs::write(
            &m,
            r#"{"mods": [{"names": ["Missing"], "add_properties": [{"name": "x", "type": "text"}]}]}"#,
        )
        .unwrap();

        assert!(run(&spec, &[m]).is_err());
        assert_eq!(fs::read_to_string(&spec).unwrap(), SPEC);
        assert!(!dir.path().join("spec.orig").exists());
    }
}
