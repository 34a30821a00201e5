//! Artifact Packager (C7): writes `config.json`/`results.json` into the run
//! directory and zips the directory alongside it (spec §4.7, §6).
//!
//! The teacher packages compiled workflow archives with `tar`+`flate2`
//! (`cloacina/src/packaging/`); this crate zips a results directory instead,
//! so the `zip` crate is substituted for the tarball stack — see
//! `DESIGN.md`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::dag::DagConfig;
use crate::error::PackagingError;
use crate::results::ResultMap;

/// The two artifacts a successful run produces (spec §4.7, §4.8).
pub struct PackagedRun {
    pub dag_path: PathBuf,
    pub zip_path: PathBuf,
}

/// Writes `config.json` and `results.json` into `run_dir`, then compresses
/// `run_dir` into `<run_dir>.zip`. Idempotent: calling this twice on the
/// same inputs overwrites both JSON files with byte-identical content and
/// rebuilds the archive from scratch (spec §8 round-trip property).
pub fn package_run(
    run_dir: &Path,
    config: &DagConfig,
    results: &HashMap<String, ResultMap>,
) -> Result<PackagedRun, PackagingError> {
    write_json(&run_dir.join("config.json"), config)?;
    write_json(&run_dir.join("results.json"), results)?;

    let zip_path = zip_sibling_path(run_dir);
    zip_directory(run_dir, &zip_path)?;

    Ok(PackagedRun {
        dag_path: run_dir.to_path_buf(),
        zip_path,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PackagingError> {
    let serialized =
        serde_json::to_vec_pretty(value).map_err(|e| PackagingError::Serialize {
            what: path.display().to_string(),
            source: e,
        })?;

    // Write-then-rename for crash-safety, per spec §5's guidance on the
    // results.json rewrite.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &serialized).map_err(|e| PackagingError::Write {
        path: tmp_path.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| PackagingError::Write {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

fn zip_sibling_path(run_dir: &Path) -> PathBuf {
    let dag_id = run_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "run".to_string());
    run_dir
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{dag_id}.zip"))
}

fn zip_directory(run_dir: &Path, zip_path: &Path) -> Result<(), PackagingError> {
    let file = File::create(zip_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut entries: Vec<PathBuf> = std::fs::read_dir(run_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    for entry in entries {
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        writer.start_file(name, options)?;

        let mut contents = Vec::new();
        File::open(&entry)?.read_to_end(&mut contents)?;
        writer.write_all(&contents)?;
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskDescriptor;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_config() -> DagConfig {
        DagConfig {
            dag_name: "d".into(),
            max_retries: 3,
            retry_delay: 3,
            tasks: vec![TaskDescriptor {
                id: "A".into(),
                operation: "identity".into(),
                dependencies: vec![],
                independent_params: HashMap::new(),
                dependent_params: HashMap::new(),
            }],
            dag_id: Some("run1".into()),
        }
    }

    #[test]
    fn packages_config_results_and_zip() {
        let root = tempdir().unwrap();
        let run_dir = root.path().join("run1");
        std::fs::create_dir(&run_dir).unwrap();
        std::fs::write(run_dir.join("abc.json"), b"hello").unwrap();

        let config = sample_config();
        let results =
            HashMap::from([("A".to_string(), HashMap::from([("x".to_string(), json!(1))]))]);

        let packaged = package_run(&run_dir, &config, &results).unwrap();
        assert!(packaged.dag_path.join("config.json").exists());
        assert!(packaged.dag_path.join("results.json").exists());
        assert!(packaged.zip_path.exists());
        assert_eq!(packaged.zip_path, root.path().join("run1.zip"));
    }

    #[test]
    fn packaging_twice_is_idempotent() {
        let root = tempdir().unwrap();
        let run_dir = root.path().join("run1");
        std::fs::create_dir(&run_dir).unwrap();

        let config = sample_config();
        let results = HashMap::new();

        package_run(&run_dir, &config, &results).unwrap();
        let first = std::fs::read(run_dir.join("results.json")).unwrap();
        package_run(&run_dir, &config, &results).unwrap();
        let second = std::fs::read(run_dir.join("results.json")).unwrap();

        assert_eq!(first, second);
    }
}
