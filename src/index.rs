//! Per-camera clip indexes

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::models::{CameraIndex, Clip};

/// Group clips by camera label
///
/// Labels come out in ascending order. Inside each group clips are ordered by
/// start time descending, then by path ascending. A path seen twice keeps its
/// first clip.
pub fn build_camera_indexes(clips: Vec<Clip>) -> Vec<CameraIndex> {
    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(clips.len());
    let mut groups: BTreeMap<String, Vec<Clip>> = BTreeMap::new();

    for clip in clips {
        if !seen.insert(clip.path().to_path_buf()) {
            log::warn!("Dropping duplicate clip entry for {}", clip.path().display());
            continue;
        }
        groups
            .entry(clip.camera_label().to_string())
            .or_default()
            .push(clip);
    }

    groups
        .into_iter()
        .map(|(label, mut clips)| {
            clips.sort_by(|a, b| {
                b.start()
                    .cmp(&a.start())
                    .then_with(|| a.path().cmp(b.path()))
            });
            CameraIndex::new(label, clips)
        })
        .collect()
}

/// Pairs of clips in `index` whose intervals overlap, as `(later, earlier)`
///
/// Touching intervals (one ends exactly when the next starts) count, since
/// both contain the shared instant. Sweeps clips by ascending start, keeping
/// only those still open, so disjoint recordings cost linear time.
pub fn overlapping_pairs(index: &CameraIndex) -> Vec<(&Clip, &Clip)> {
    let mut open: Vec<&Clip> = Vec::new();
    let mut pairs = Vec::new();
    for later in index.clips().iter().rev() {
        open.retain(|earlier| earlier.end() >= later.start());
        pairs.extend(open.iter().map(|earlier| (later, *earlier)));
        open.push(later);
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, TimeZone};
    use proptest::prelude::*;
    use std::path::Path;

    fn at(minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 3, minute, 0)
            .unwrap()
    }

    fn clip(path: &str, camera: &str, minute: u32, seconds: f64) -> Clip {
        Clip::new(PathBuf::from(path), camera, at(minute), seconds)
    }

    #[test]
    fn test_groups_and_orders() {
        let indexes = build_camera_indexes(vec![
            clip("/rec/b1.mp4", "CamB", 10, 60.0),
            clip("/rec/a1.mp4", "CamA", 0, 60.0),
            clip("/rec/a3.mp4", "CamA", 20, 60.0),
            clip("/rec/a2.mp4", "CamA", 10, 60.0),
        ]);

        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].camera_label(), "CamA");
        assert_eq!(indexes[1].camera_label(), "CamB");

        let paths: Vec<&Path> = indexes[0].clips().iter().map(|c| c.path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("/rec/a3.mp4"),
                Path::new("/rec/a2.mp4"),
                Path::new("/rec/a1.mp4")
            ]
        );
        assert!(indexes[0].clips().iter().all(|c| c.camera_label() == "CamA"));
    }

    #[test]
    fn test_labels_compare_exactly() {
        let indexes = build_camera_indexes(vec![
            clip("/rec/1.mp4", "cam", 0, 1.0),
            clip("/rec/2.mp4", "Cam", 0, 1.0),
            clip("/rec/3.mp4", "Cam ", 0, 1.0),
        ]);
        let labels: Vec<&str> = indexes.iter().map(|i| i.camera_label()).collect();
        assert_eq!(labels, vec!["Cam", "Cam ", "cam"]);
    }

    #[test]
    fn test_equal_start_breaks_ties_by_path() {
        let indexes = build_camera_indexes(vec![
            clip("/rec/z.mp4", "CamA", 5, 1.0),
            clip("/rec/a.mp4", "CamA", 5, 1.0),
        ]);
        assert_eq!(indexes[0].clips()[0].path(), Path::new("/rec/a.mp4"));
        assert_eq!(indexes[0].clips()[1].path(), Path::new("/rec/z.mp4"));
    }

    #[test]
    fn test_duplicate_paths_dropped() {
        let indexes = build_camera_indexes(vec![
            clip("/rec/a.mp4", "CamA", 5, 1.0),
            clip("/rec/a.mp4", "CamA", 9, 1.0),
        ]);
        assert_eq!(indexes[0].len(), 1);
        assert_eq!(indexes[0].clips()[0].start(), at(5));
    }

    #[test]
    fn test_empty_input() {
        assert!(build_camera_indexes(Vec::new()).is_empty());
    }

    #[test]
    fn test_overlapping_pairs() {
        let indexes = build_camera_indexes(vec![
            clip("/rec/1.mp4", "CamA", 0, 600.0),
            clip("/rec/2.mp4", "CamA", 5, 60.0),
            clip("/rec/3.mp4", "CamA", 30, 60.0),
        ]);
        let pairs = overlapping_pairs(&indexes[0]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.path(), Path::new("/rec/2.mp4"));
        assert_eq!(pairs[0].1.path(), Path::new("/rec/1.mp4"));

        // the most recent covering clip answers the lookup
        let hit = indexes[0].clip_for_time(&at(5)).unwrap();
        assert_eq!(hit.path(), Path::new("/rec/2.mp4"));
    }

    #[test]
    fn test_touching_intervals_overlap() {
        let indexes = build_camera_indexes(vec![
            clip("/rec/1.mp4", "CamA", 0, 60.0),
            clip("/rec/2.mp4", "CamA", 1, 60.0),
        ]);
        assert_eq!(overlapping_pairs(&indexes[0]).len(), 1);
    }

    #[test]
    fn test_disjoint_intervals() {
        let indexes = build_camera_indexes(vec![
            clip("/rec/1.mp4", "CamA", 0, 30.0),
            clip("/rec/2.mp4", "CamA", 1, 30.0),
        ]);
        assert!(overlapping_pairs(&indexes[0]).is_empty());
        assert!(indexes[0].clip_for_time(&at(0)).is_some());
        assert!(indexes[0]
            .clip_for_time(&(at(0) + chrono::TimeDelta::seconds(45)))
            .is_none());
    }

    proptest! {
        #[test]
        fn prop_overlaps_match_pairwise_check(
            entries in prop::collection::vec((0u32..60, 0.0f64..900.0), 0..30)
        ) {
            let clips: Vec<Clip> = entries
                .iter()
                .enumerate()
                .map(|(i, (minute, seconds))| clip(&format!("/rec/{i}.mp4"), "CamA", *minute, *seconds))
                .collect();
            let indexes = build_camera_indexes(clips);
            let Some(index) = indexes.first() else {
                return Ok(());
            };

            let clips = index.clips();
            let mut expected = 0;
            for (i, a) in clips.iter().enumerate() {
                for b in &clips[i + 1..] {
                    if a.start() <= b.end() && b.start() <= a.end() {
                        expected += 1;
                    }
                }
            }
            let pairs = overlapping_pairs(index);
            prop_assert_eq!(pairs.len(), expected);
            for (later, earlier) in pairs {
                prop_assert!(later.start() >= earlier.start());
                prop_assert!(earlier.end() >= later.start());
            }
        }

        #[test]
        fn prop_clips_sorted_descending(
            entries in prop::collection::vec((0u32..3, 0u32..60, 0.0f64..600.0), 0..40)
        ) {
            let clips: Vec<Clip> = entries
                .iter()
                .enumerate()
                .map(|(i, (cam, minute, seconds))| {
                    clip(&format!("/rec/{i}.mp4"), &format!("Cam{cam}"), *minute, *seconds)
                })
                .collect();
            let total = clips.len();
            let indexes = build_camera_indexes(clips);

            prop_assert_eq!(indexes.iter().map(|i| i.len()).sum::<usize>(), total);
            for pair in indexes.windows(2) {
                prop_assert!(pair[0].camera_label() < pair[1].camera_label());
            }
            for index in &indexes {
                for pair in index.clips().windows(2) {
                    prop_assert!(pair[0].start() >= pair[1].start());
                }
                for c in index.clips() {
                    prop_assert_eq!(c.camera_label(), index.camera_label());
                    prop_assert!(c.end() >= c.start());
                }
            }
        }
    }
}
