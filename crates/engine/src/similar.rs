//! crates/engine/src/similar.rs
//!
//! Baseline selection for new files.
//!
//! A new file is diffed against the old file of the same name. When the old
//! partition has no such file, the old file whose name is closest by edit
//! distance serves as the baseline, so renamed or re-versioned files
//! (`libfoo-1.0.so` becoming `libfoo-1.1.so`) still get a diff.

use rustc_hash::FxHashMap;

use crate::partition::PartitionFile;

/// How a baseline was found.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BaselineMatch<'a> {
    /// Same name.
    Exact(&'a PartitionFile),
    /// Closest name and its edit distance.
    Similar(&'a PartitionFile, usize),
}

impl<'a> BaselineMatch<'a> {
    /// The baseline file.
    #[must_use]
    pub const fn file(self) -> &'a PartitionFile {
        match self {
            Self::Exact(file) | Self::Similar(file, _) => file,
        }
    }
}

/// Finds baselines among the files of an old partition.
#[derive(Debug)]
pub struct SimilarFileMatcher<'a> {
    files: &'a [PartitionFile],
    by_name: FxHashMap<&'a str, usize>,
}

impl<'a> SimilarFileMatcher<'a> {
    /// Indexes `files`. When a name repeats, the first file wins.
    #[must_use]
    pub fn new(files: &'a [PartitionFile]) -> Self {
        let mut by_name = FxHashMap::default();
        for (index, file) in files.iter().enumerate() {
            by_name.entry(file.name.as_str()).or_insert(index);
        }
        Self { files, by_name }
    }

    /// Baseline for a new file named `name`, if the old partition has files.
    ///
    /// Ties on edit distance go to the file enumerated first.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<BaselineMatch<'a>> {
        if let Some(&index) = self.by_name.get(name) {
            return Some(BaselineMatch::Exact(&self.files[index]));
        }

        let mut best: Option<(usize, &'a PartitionFile)> = None;
        for file in self.files {
            let distance = edit_distance(name, &file.name);
            match best {
                Some((best_distance, _)) if best_distance <= distance => {}
                _ => best = Some((distance, file)),
            }
        }
        best.map(|(distance, file)| BaselineMatch::Similar(file, distance))
    }
}

/// Levenshtein distance over characters: insertions, deletions and
/// substitutions each cost one.
#[must_use]
pub fn edit_distance(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];

    for (i, lc) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, &rc) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != rc);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use extents::Extent;

    fn files(names: &[&str]) -> Vec<PartitionFile> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| PartitionFile::new(*name, vec![Extent::new(i as u64, 1)]))
            .collect()
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("libfoo-1.1.so", "libfoo-1.0.so"), 1);
        assert_eq!(edit_distance("día", "dia"), 1);
    }

    #[test]
    fn exact_name_wins() {
        let old = files(&["lib/libc.so", "lib/libm.so"]);
        let matcher = SimilarFileMatcher::new(&old);
        assert_eq!(matcher.find("lib/libm.so"), Some(BaselineMatch::Exact(&old[1])));
    }

    #[test]
    fn closest_name_is_used_otherwise() {
        let old = files(&["libfoo-1.0.so", "libbar.so"]);
        let matcher = SimilarFileMatcher::new(&old);
        let found = matcher.find("libfoo-1.1.so").expect("baseline");
        assert_eq!(found.file().name, "libfoo-1.0.so");
        assert_eq!(found, BaselineMatch::Similar(&old[0], 1));
    }

    #[test]
    fn ties_go_to_enumeration_order() {
        let old = files(&["b.txt", "a.txt", "c.txt"]);
        let matcher = SimilarFileMatcher::new(&old);
        assert_eq!(matcher.find("d.txt").map(|m| m.file().name.as_str()), Some("b.txt"));
    }

    #[test]
    fn duplicate_names_resolve_to_first() {
        let old = files(&["x", "x"]);
        let matcher = SimilarFileMatcher::new(&old);
        assert_eq!(matcher.find("x"), Some(BaselineMatch::Exact(&old[0])));
    }

    #[test]
    fn empty_old_partition_yields_no_baseline() {
        let matcher = SimilarFileMatcher::new(&[]);
        assert_eq!(matcher.find("anything"), None);
    }
}
