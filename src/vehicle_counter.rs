// src/vehicle_counter.rs

use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const LABEL_EXTENSION: &str = "txt";

/// Vehicle count for one label file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameCount {
    pub file_name: String,
    /// Frame number parsed from the trailing digits of the file stem.
    pub frame_index: Option<u64>,
    pub vehicles: u32,
}

/// Outcome of scanning the detector's label directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelScan {
    /// The directory does not exist; the detector produced nothing.
    NoDetectionOutput,
    /// One entry per label file, in frame order.
    Counted(Vec<FrameCount>),
}

impl LabelScan {
    /// Per-frame counts, empty when there was no detection output.
    pub fn counts(&self) -> Vec<u32> {
        match self {
            LabelScan::NoDetectionOutput => Vec::new(),
            LabelScan::Counted(frames) => frames.iter().map(|f| f.vehicles).collect(),
        }
    }
}

/// Count vehicles in the label files under `labels_dir`.
///
/// With `source_stem` set, only labels written for that video are read:
/// `<stem>.txt` and `<stem>_<frame>.txt`. The labels directory is shared
/// between runs, so other videos' files are usually sitting next to them.
///
/// Files are ordered by the frame number embedded in their name
/// (`input_12.txt` → 12) rather than lexically, so `input_10` follows
/// `input_9`. Names without a numeric suffix go last, lexically.
pub fn count_vehicles(
    labels_dir: &Path,
    source_stem: Option<&str>,
    vehicle_classes: &[i64],
) -> LabelScan {
    if !labels_dir.is_dir() {
        warn!("No detection output at {}", labels_dir.display());
        return LabelScan::NoDetectionOutput;
    }

    let paths = label_files(labels_dir, source_stem);
    let mut frames = count_label_files(&paths, vehicle_classes);

    frames.sort_by(|a, b| {
        let by_frame = match (a.frame_index, b.frame_index) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_frame.then_with(|| a.file_name.cmp(&b.file_name))
    });

    info!(
        "Counted vehicles in {} label files from {}",
        frames.len(),
        labels_dir.display()
    );
    LabelScan::Counted(frames)
}

fn label_files(labels_dir: &Path, source_stem: Option<&str>) -> Vec<PathBuf> {
    WalkDir::new(labels_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| {
            let path = entry.path();
            entry.file_type().is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(LABEL_EXTENSION)
        })
        .filter(|entry| match source_stem {
            Some(source) => entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| belongs_to_source(stem, source)),
            None => true,
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Count each file; files that vanish or cannot be read are skipped.
fn count_label_files(paths: &[PathBuf], vehicle_classes: &[i64]) -> Vec<FrameCount> {
    let mut frames = Vec::with_capacity(paths.len());

    for path in paths {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable label file {}: {}", path.display(), e);
                continue;
            }
        };
        let contents = String::from_utf8_lossy(&bytes);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let frame_index = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(parse_frame_index);

        frames.push(FrameCount {
            file_name,
            frame_index,
            vehicles: count_in_label_text(&contents, vehicle_classes),
        });
    }

    frames
}

/// `stem` is `source` itself or `source_<digits>`.
fn belongs_to_source(stem: &str, source: &str) -> bool {
    if stem == source {
        return true;
    }
    stem.strip_prefix(source)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|frame| !frame.is_empty() && frame.bytes().all(|b| b.is_ascii_digit()))
}

/// Number of lines whose leading class id is a vehicle class.
///
/// Lines that are empty or start with a non-integer token are skipped.
pub fn count_in_label_text(contents: &str, vehicle_classes: &[i64]) -> u32 {
    let mut count = 0;
    for line in contents.lines() {
        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        match token.parse::<i64>() {
            Ok(class_id) if vehicle_classes.contains(&class_id) => count += 1,
            Ok(_) => {}
            Err(_) => debug!("Skipping unparsable label line: {:?}", line),
        }
    }
    count
}

/// Trailing decimal digits of a file stem, e.g. `input_0042` → 42.
fn parse_frame_index(stem: &str) -> Option<u64> {
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    stem[digits_start..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    const VEHICLES: [i64; 4] = [2, 3, 5, 7];

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("labels-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_trailing_fields_do_not_affect_count() {
        assert_eq!(count_in_label_text("2 0.1 0.2 0.3 0.4\n", &VEHICLES), 1);
        assert_eq!(count_in_label_text("2 0.1 0.2 0.3 0.4 0.99\n", &VEHICLES), 1);
    }

    #[test]
    fn test_non_vehicle_classes_count_zero() {
        let text = "0 0.5 0.5 0.1 0.1\n1 0.5 0.5 0.1 0.1\n4 0.5 0.5 0.1 0.1\n";
        assert_eq!(count_in_label_text(text, &VEHICLES), 0);
    }

    #[test]
    fn test_unparsable_lines_are_skipped() {
        let text = "2 0.1 0.1 0.1 0.1\n\n   \ncar 0.1 0.1 0.1 0.1\n7.5 0.1\n7 0.2 0.2 0.2 0.2\n";
        assert_eq!(count_in_label_text(text, &VEHICLES), 2);
    }

    #[test]
    fn test_custom_class_set() {
        let text = "0 0.1 0.1 0.1 0.1\n2 0.1 0.1 0.1 0.1\n";
        assert_eq!(count_in_label_text(text, &[0]), 1);
    }

    #[test]
    fn test_parse_frame_index() {
        assert_eq!(parse_frame_index("input_12"), Some(12));
        assert_eq!(parse_frame_index("0007"), Some(7));
        assert_eq!(parse_frame_index("input"), None);
        assert_eq!(parse_frame_index(""), None);
    }

    #[test]
    fn test_missing_directory_is_no_detection_output() {
        let dir = std::env::temp_dir().join(format!("absent-{}", uuid::Uuid::new_v4()));
        let scan = count_vehicles(&dir, None, &VEHICLES);

        assert_eq!(scan, LabelScan::NoDetectionOutput);
        assert!(scan.counts().is_empty());
    }

    #[test]
    fn test_one_count_per_file_in_frame_order() {
        let dir = scratch_dir();
        // Lexical order would put 10 before 9.
        fs::write(dir.join("input_10.txt"), "2 0 0 0 0\n2 0 0 0 0\n2 0 0 0 0\n").unwrap();
        fs::write(dir.join("input_9.txt"), "5 0 0 0 0\n").unwrap();
        fs::write(dir.join("input_1.txt"), "0 0 0 0 0\n1 0 0 0 0\n").unwrap();
        fs::write(dir.join("notes.md"), "2 0 0 0 0\n").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();

        let scan = count_vehicles(&dir, None, &VEHICLES);
        fs::remove_dir_all(&dir).unwrap();

        let LabelScan::Counted(frames) = &scan else {
            panic!("expected counted labels");
        };
        let names: Vec<&str> = frames.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["input_1.txt", "input_9.txt", "input_10.txt"]);
        assert_eq!(scan.counts(), vec![0, 1, 3]);
    }

    #[test]
    fn test_files_without_frame_number_go_last() {
        let dir = scratch_dir();
        fs::write(dir.join("b.txt"), "2\n").unwrap();
        fs::write(dir.join("a.txt"), "").unwrap();
        fs::write(dir.join("clip_2.txt"), "3\n3\n").unwrap();

        let scan = count_vehicles(&dir, None, &VEHICLES);
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(scan.counts(), vec![2, 0, 1]);
    }

    #[test]
    fn test_empty_directory_yields_empty_sequence() {
        let dir = scratch_dir();
        let scan = count_vehicles(&dir, None, &VEHICLES);
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(scan, LabelScan::Counted(Vec::new()));
    }

    #[test]
    fn test_only_labels_of_the_current_video_are_counted() {
        let dir = scratch_dir();
        // Previous upload left its labels behind.
        for frame in 1..=3 {
            fs::write(dir.join(format!("aaaa_{}.txt", frame)), "2 0 0 0 0\n".repeat(20)).unwrap();
            fs::write(dir.join(format!("bbbb_{}.txt", frame)), "2 0 0 0 0\n").unwrap();
        }
        fs::write(dir.join("bbbb_extra_1.txt"), "2 0 0 0 0\n").unwrap();

        let scan = count_vehicles(&dir, Some("bbbb"), &VEHICLES);
        let unfiltered = count_vehicles(&dir, None, &VEHICLES);
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(scan.counts(), vec![1, 1, 1]);
        assert_eq!(unfiltered.counts().len(), 7);
    }

    #[test]
    fn test_belongs_to_source() {
        assert!(belongs_to_source("input", "input"));
        assert!(belongs_to_source("input_12", "input"));
        assert!(!belongs_to_source("input_", "input"));
        assert!(!belongs_to_source("input_2_5", "input"));
        assert!(!belongs_to_source("inputx_1", "input"));
        assert!(!belongs_to_source("other_1", "input"));
    }

    #[test]
    fn test_file_removed_mid_scan_is_skipped() {
        let dir = scratch_dir();
        fs::write(dir.join("input_1.txt"), "2 0 0 0 0\n").unwrap();
        fs::write(dir.join("input_3.txt"), "3 0 0 0 0\n7 0 0 0 0\n").unwrap();
        let paths = vec![
            dir.join("input_1.txt"),
            dir.join("input_2.txt"),
            dir.join("input_3.txt"),
        ];

        let frames = count_label_files(&paths, &VEHICLES);
        fs::remove_dir_all(&dir).unwrap();

        let counts: Vec<u32> = frames.iter().map(|f| f.vehicles).collect();
        assert_eq!(counts, vec![1, 2]);
        assert_eq!(frames[1].frame_index, Some(3));
    }
}
