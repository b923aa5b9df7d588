//! Archive assembler (C7): packs everything a run retrieved, plus both log files,
//! into one `tar.gz`, matching the original's `tarfile.open(archive_name, "w:gz")`.
//!
//! Per-file add failures are logged and skipped rather than aborting the whole
//! archive (spec §4.7), since a single unreadable artifact shouldn't cost the
//! operator every other node's report.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use thiserror::Error;

use crate::prelude::*;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no reports were retrieved, nothing to archive")]
    NothingRetrieved,

    #[error("failed to build archive: {0}")]
    Io(#[from] std::io::Error),
}

/// `sos-collector[-LABEL][-CASE]-YYYY-MM-DD-RRRRR`, matching the original's
/// `_create_cluster_archive`'s name assembly (`create_name`).
pub fn archive_root_name(label: Option<&str>, case_id: Option<&str>, today: &str, random_suffix: &str) -> String {
    let mut name = String::from("sos-collector");
    if let Some(label) = label.filter(|s| !s.is_empty()) {
        name.push('-');
        name.push_str(label);
    }
    if let Some(case_id) = case_id.filter(|s| !s.is_empty()) {
        name.push('-');
        name.push_str(case_id);
    }
    name.push('-');
    name.push_str(today);
    name.push('-');
    name.push_str(random_suffix);
    name
}

/// Five lowercase alphanumeric characters, mirroring the original's
/// `''.join(random.choice(string.ascii_lowercase + string.digits) for _ in range(5))`.
pub fn random_suffix(mut next_char: impl FnMut() -> char) -> String {
    (0..5).map(|_| next_char()).collect()
}

pub struct ArchiveInputs<'a> {
    pub root_name: &'a str,
    pub retrieved_files: &'a [(String, Vec<PathBuf>)],
    pub driver_log_path: &'a Path,
    pub ui_log_path: &'a Path,
    pub dest_dir: &'a Path,
}

/// Builds the archive and returns its path. Each retrieved file is routed by its
/// basename: anything containing `.md5` is an md5sum sidecar the agent already
/// produced and goes to `root/md5/<basename>`, everything else goes under the
/// node's own subtree at `root/<node>/<basename>` (spec §4.7, matching the
/// original's `if '.md5' in fname: ... arcname = "md5/" + fname`). `root/logs/`
/// holds both orchestrator logs.
pub fn build(inputs: ArchiveInputs) -> Result<PathBuf, Error> {
    let has_any_files = inputs.retrieved_files.iter().any(|(_, files)| !files.is_empty());
    if !has_any_files {
        return Err(Error::NothingRetrieved);
    }

    let archive_path = inputs.dest_dir.join(format!("{}.tar.gz", inputs.root_name));
    let file = File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, GzCompression::default());
    let mut builder = tar::Builder::new(encoder);

    for (node, files) in inputs.retrieved_files {
        for path in files {
            let basename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            let archive_path_in_tar = if basename.contains(".md5") {
                format!("{}/md5/{basename}", inputs.root_name)
            } else {
                format!("{}/{node}/{basename}", inputs.root_name)
            };

            if let Err(e) = builder.append_path_with_name(path, &archive_path_in_tar) {
                warn!("failed to add {} ({node}) to archive: {e}", path.display());
            }
        }
    }

    append_log(&mut builder, inputs.root_name, "sos-collector.log", inputs.driver_log_path)?;
    append_log(&mut builder, inputs.root_name, "ui.log", inputs.ui_log_path)?;

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(archive_path)
}

fn append_log<W: Write>(builder: &mut tar::Builder<W>, root_name: &str, name: &str, path: &Path) -> Result<(), Error> {
    let archive_path = format!("{root_name}/logs/{name}");
    if let Err(e) = builder.append_path_with_name(path, &archive_path) {
        warn!("failed to add {name} to archive: {e}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_root_name_includes_label_and_case_when_present() {
        let name = archive_root_name(Some("demo"), Some("01234567"), "2026-07-29", "ab3k9");
        assert_eq!(name, "sos-collector-demo-01234567-2026-07-29-ab3k9");
    }

    #[test]
    fn archive_root_name_omits_empty_label_and_case() {
        let name = archive_root_name(None, None, "2026-07-29", "ab3k9");
        assert_eq!(name, "sos-collector-2026-07-29-ab3k9");
    }

    #[test]
    fn retrieved_md5_sidecar_routes_to_md5_directory_without_node_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let driver_log = dir.path().join("driver.log");
        let ui_log = dir.path().join("ui.log");
        fs::write(&driver_log, b"").unwrap();
        fs::write(&ui_log, b"").unwrap();

        let report = dir.path().join("sosreport-node1.tar.xz");
        let checksum = dir.path().join("sosreport-node1.tar.xz.md5");
        fs::write(&report, b"report").unwrap();
        fs::write(&checksum, b"deadbeef").unwrap();

        let retrieved = vec![("node1".to_string(), vec![report.clone(), checksum.clone()])];
        let archive_path = build(ArchiveInputs {
            root_name: "sos-collector-test",
            retrieved_files: &retrieved,
            driver_log_path: &driver_log,
            ui_log_path: &ui_log,
            dest_dir: dir.path(),
        })
        .unwrap();

        let file = File::open(&archive_path).unwrap();
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();

        assert!(names.iter().any(|n| n == "sos-collector-test/node1/sosreport-node1.tar.xz"));
        assert!(names.iter().any(|n| n == "sos-collector-test/md5/sosreport-node1.tar.xz.md5"));
    }

    #[test]
    fn build_fails_when_nothing_was_retrieved() {
        let dir = tempfile::tempdir().unwrap();
        let driver_log = dir.path().join("driver.log");
        let ui_log = dir.path().join("ui.log");
        fs::write(&driver_log, b"").unwrap();
        fs::write(&ui_log, b"").unwrap();

        let result = build(ArchiveInputs {
            root_name: "sos-collector-test",
            retrieved_files: &[],
            driver_log_path: &driver_log,
            ui_log_path: &ui_log,
            dest_dir: dir.path(),
        });
        assert!(matches!(result, Err(Error::NothingRetrieved)));
    }
}
