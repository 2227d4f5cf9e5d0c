//! Reporting of the solved cell-type proportions.
//!
//! Output is one `<label>\t<percentage>` line per cell type: first the
//! known cell types in reference-matrix column order, then the appended
//! unknowns as `unknown_cell_type_N`. Writing to a path never clobbers an
//! existing file; a numbered suffix is appended instead.

use crate::error::FileWriteError;
use crate::records::CellTypeLabel;
use crate::types::to_percent;
use ndarray::Array1;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Pads the user-supplied label list up to the proportion-vector length:
/// generic `cell_type_N` names for unnamed known columns, then
/// `unknown_cell_type_N` for the appended unknown columns. Surplus labels
/// are dropped with a warning.
pub fn build_label_list(
    labels: Vec<CellTypeLabel>,
    num_known: usize,
    num_unknown: usize,
) -> Vec<String> {
    let mut names: Vec<String> = labels.into_iter().map(|label| label.name).collect();
    if names.len() > num_known {
        log::warn!(
            "{} cell-type label(s) supplied for {} known cell type(s); ignoring the extras",
            names.len(),
            num_known
        );
        names.truncate(num_known);
    }
    for i in names.len() + 1..=num_known {
        names.push(format!("cell_type_{i}"));
    }
    for i in 1..=num_unknown {
        names.push(format!("unknown_cell_type_{i}"));
    }
    names
}

/// Renders the tab-separated report.
pub fn render_report(labels: &[String], proportions: &Array1<f64>) -> String {
    assert_eq!(
        labels.len(),
        proportions.len(),
        "label list and proportion vector must match in length"
    );
    let mut report = String::new();
    for (label, &proportion) in labels.iter().zip(proportions.iter()) {
        report.push_str(label);
        report.push('\t');
        report.push_str(&format!("{}\n", to_percent(proportion, 2)));
    }
    report
}

/// Picks a path that does not collide with an existing file by appending
/// `_1`, `_2`, ... to the stem.
fn collision_free_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Writes the report to `path`, creating parent directories and refusing
/// directory targets. An existing file is preserved: the report goes to a
/// numbered sibling instead, with a warning.
pub fn write_report(report: &str, path: &Path) -> Result<PathBuf, FileWriteError> {
    if path.is_dir() {
        return Err(FileWriteError::Rejected {
            path: path.to_path_buf(),
            reason: "path is an existing directory".to_string(),
        });
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| FileWriteError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    let final_path = collision_free_path(path);
    if final_path != path {
        log::warn!(
            "'{}' already exists; writing to '{}' instead",
            path.display(),
            final_path.display()
        );
    }

    let mut file = fs::File::create(&final_path).map_err(|source| FileWriteError::Io {
        path: final_path.clone(),
        source,
    })?;
    file.write_all(report.as_bytes())
        .map_err(|source| FileWriteError::Io {
            path: final_path.clone(),
            source,
        })?;
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn label(name: &str) -> CellTypeLabel {
        CellTypeLabel {
            name: name.to_string(),
        }
    }

    #[test]
    fn labels_are_padded_with_generic_and_unknown_names() {
        let labels = build_label_list(vec![label("neuron")], 3, 2);
        assert_eq!(
            labels,
            vec![
                "neuron",
                "cell_type_2",
                "cell_type_3",
                "unknown_cell_type_1",
                "unknown_cell_type_2"
            ]
        );
    }

    #[test]
    fn surplus_labels_are_dropped() {
        let labels = build_label_list(vec![label("a"), label("b"), label("c")], 2, 0);
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn report_is_tab_separated_percentages() {
        let labels = vec!["a".to_string(), "b".to_string()];
        let report = render_report(&labels, &array![0.305, 0.695]);
        assert_eq!(report, "a\t30.5\nb\t69.5\n");
    }

    #[test]
    fn tiny_negative_proportions_render_as_zero() {
        let labels = vec!["a".to_string()];
        let report = render_report(&labels, &array![-1e-14]);
        assert_eq!(report, "a\t0\n");
    }

    #[test]
    fn existing_files_are_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proportions.txt");
        let first = write_report("first\n", &path).unwrap();
        assert_eq!(first, path);
        let second = write_report("second\n", &path).unwrap();
        assert_eq!(second, dir.path().join("proportions_1.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "second\n");
    }

    #[test]
    fn directory_targets_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_report("x\n", dir.path());
        assert!(matches!(result, Err(FileWriteError::Rejected { .. })));
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/proportions.txt");
        let written = write_report("x\n", &path).unwrap();
        assert_eq!(written, path);
    }
}
