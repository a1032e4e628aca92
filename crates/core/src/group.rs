//! Grouping units by (family, identifier) and writing one artifact per group.
//!
//! Batch collects every member and writes each group once at the end. Eager
//! writes a single-page artifact for the first member and grows it by
//! read-merge-rewrite for every later one.

use scansort_rules::{sanitize_identifier, ClassificationResult, Family};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::artifact::ArtifactWriter;
use crate::error::{PipelineError, Result};
use crate::unit::ImageUnit;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Batch,
    Eager,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "eager" => Ok(Self::Eager),
            other => Err(format!("unknown merge strategy: {}", other)),
        }
    }
}

/// Export sub-folder per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FamilyFolders {
    pub family_a: String,
    pub family_b: String,
    pub unclassified: String,
}

impl Default for FamilyFolders {
    fn default() -> Self {
        Self {
            family_a: Family::FamilyA.default_folder().to_string(),
            family_b: Family::FamilyB.default_folder().to_string(),
            unclassified: Family::Unclassified.default_folder().to_string(),
        }
    }
}

impl FamilyFolders {
    pub fn folder(&self, family: Family) -> String {
        let name = match family {
            Family::FamilyA => &self.family_a,
            Family::FamilyB => &self.family_b,
            Family::Unclassified => &self.unclassified,
        };
        let safe = sanitize_identifier(name);
        if safe == scansort_rules::UNNAMED_IDENTIFIER {
            family.default_folder().to_string()
        } else {
            safe
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub family: Family,
    pub identifier: String,
}

impl From<&ClassificationResult> for GroupKey {
    fn from(result: &ClassificationResult) -> Self {
        Self {
            family: result.family,
            identifier: result.identifier.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub key: GroupKey,
    /// Persisted page images, in production order.
    pub members: Vec<PathBuf>,
    pub artifact: PathBuf,
    /// Pages currently in the artifact on disk.
    pub pages_written: usize,
    /// Set when the group could not be written.
    pub error: Option<String>,
}

/// A page left out of its group's artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPage {
    pub path: PathBuf,
    pub reason: String,
}

pub struct Grouper {
    strategy: MergeStrategy,
    export_root: PathBuf,
    folders: FamilyFolders,
    groups: Vec<Group>,
    index: HashMap<GroupKey, usize>,
    skipped_pages: Vec<SkippedPage>,
}

impl Grouper {
    pub fn new(strategy: MergeStrategy, export_root: &Path, folders: FamilyFolders) -> Self {
        Self {
            strategy,
            export_root: export_root.to_path_buf(),
            folders,
            groups: Vec::new(),
            index: HashMap::new(),
            skipped_pages: Vec::new(),
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn skipped_pages(&self) -> &[SkippedPage] {
        &self.skipped_pages
    }

    /// `<export_root>/<family folder>/<identifier>.pdf`
    pub fn artifact_path(&self, key: &GroupKey) -> PathBuf {
        self.export_root
            .join(self.folders.folder(key.family))
            .join(format!("{}.pdf", sanitize_identifier(&key.identifier)))
    }

    /// Add `unit` to its group. In eager mode the artifact is written or
    /// grown immediately; a failure there skips only this page.
    pub fn assign(
        &mut self,
        unit: &ImageUnit,
        result: &ClassificationResult,
        writer: &dyn ArtifactWriter,
        workspace: &mut Workspace,
    ) -> Result<()> {
        let key = GroupKey::from(result);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let artifact = self.artifact_path(&key);
                self.groups.push(Group {
                    key: key.clone(),
                    members: Vec::new(),
                    artifact,
                    pages_written: 0,
                    error: None,
                });
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[idx].members.push(unit.path.clone());

        if self.strategy == MergeStrategy::Eager {
            if let Err(e) = self.append_eagerly(idx, unit, writer, workspace) {
                if matches!(e, PipelineError::Workspace(_)) {
                    return Err(e);
                }
                log::warn!("[Group] {}: page left out: {}", unit.label(), e);
                self.skipped_pages.push(SkippedPage {
                    path: unit.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    fn append_eagerly(
        &mut self,
        idx: usize,
        unit: &ImageUnit,
        writer: &dyn ArtifactWriter,
        workspace: &mut Workspace,
    ) -> Result<()> {
        let group = &mut self.groups[idx];
        let page = [unit.path.clone()];

        if group.pages_written == 0 {
            let report = writer.write_pages(&page, &group.artifact)?;
            group.pages_written = report.pages_written;
            group.error = None;
            return Ok(());
        }

        let scratch = workspace.scratch_path("pdf");
        writer.write_pages(&page, &scratch)?;
        let merged = writer.merge_artifacts(&[group.artifact.clone(), scratch.clone()], &group.artifact);
        if let Err(e) = std::fs::remove_file(&scratch) {
            log::debug!("[Group] scratch {} not removed: {}", scratch.display(), e);
        }
        let report = merged?;

        // The artifact never appears here: an unreadable artifact fails the merge.
        if let Some((_, reason)) = report.skipped.into_iter().next() {
            log::warn!("[Group] {}: page left out: {}", unit.label(), reason);
            self.skipped_pages.push(SkippedPage {
                path: unit.path.clone(),
                reason,
            });
        }
        self.groups[idx].pages_written = report.pages_written;
        Ok(())
    }

    /// Write group `idx` (batch mode). Eager groups are already on disk and
    /// only report their state. Returns `Merge` if the group was skipped.
    pub fn finalize(&mut self, idx: usize, writer: &dyn ArtifactWriter) -> Result<&Group> {
        let strategy = self.strategy;
        let group = self
            .groups
            .get_mut(idx)
            .ok_or_else(|| PipelineError::Merge(format!("no group at index {}", idx)))?;

        if strategy == MergeStrategy::Eager {
            if group.pages_written == 0 {
                let reason = "no page could be written".to_string();
                group.error = Some(reason.clone());
                return Err(PipelineError::Merge(reason));
            }
            return Ok(&*group);
        }

        match writer.write_pages(&group.members, &group.artifact) {
            Ok(report) => {
                for (path, reason) in report.skipped {
                    log::warn!("[Group] {}: page left out: {}", group.key.identifier, reason);
                    self.skipped_pages.push(SkippedPage { path, reason });
                }
                group.pages_written = report.pages_written;
                Ok(&*group)
            }
            Err(e) => {
                group.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Number of groups per family.
    pub fn family_counts(&self) -> BTreeMap<Family, usize> {
        let mut counts = BTreeMap::new();
        for group in &self.groups {
            *counts.entry(group.key.family).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::PdfWriter;
    use crate::testing::{page_widths, save_png, solid, GREY};

    fn unit(dir: &Path, name: &str, width: u32) -> ImageUnit {
        ImageUnit {
            source_index: 0,
            source_stem: name.into(),
            page_index: 0,
            path: save_png(dir, &format!("{}.png", name), &solid(width, 60, GREY)),
            rotation: 0,
            orientation_corrected: false,
        }
    }

    fn classified(family: Family, id: &str) -> ClassificationResult {
        ClassificationResult {
            family,
            identifier: id.into(),
        }
    }

    #[test]
    fn test_batch_groups_and_merges_once() {
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(None).unwrap();
        let mut grouper = Grouper::new(MergeStrategy::Batch, out.path(), FamilyFolders::default());

        let a = classified(Family::FamilyB, "CD12-987654321");
        let b = classified(Family::Unclassified, "doc2");
        grouper.assign(&unit(pages.path(), "u1", 11), &a, &PdfWriter, &mut ws).unwrap();
        grouper.assign(&unit(pages.path(), "u2", 12), &b, &PdfWriter, &mut ws).unwrap();
        grouper.assign(&unit(pages.path(), "u3", 13), &a, &PdfWriter, &mut ws).unwrap();

        assert_eq!(grouper.len(), 2);
        // Nothing on disk until finalize.
        assert!(!out.path().join("FamilyB").exists());

        for idx in 0..grouper.len() {
            grouper.finalize(idx, &PdfWriter).unwrap();
        }
        let b_pdf = out.path().join("FamilyB").join("CD12-987654321.pdf");
        assert_eq!(page_widths(&b_pdf), vec![11, 13]);
        assert_eq!(page_widths(&out.path().join("Other").join("doc2.pdf")), vec![12]);
        assert!(!out.path().join("FamilyA").exists());
    }

    #[test]
    fn test_eager_grows_artifact_in_order() {
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(None).unwrap();
        let mut grouper = Grouper::new(MergeStrategy::Eager, out.path(), FamilyFolders::default());
        let key = classified(Family::FamilyA, "AB123-456789");
        let dest = out.path().join("FamilyA").join("AB123-456789.pdf");

        grouper.assign(&unit(pages.path(), "u1", 21), &key, &PdfWriter, &mut ws).unwrap();
        assert_eq!(page_widths(&dest), vec![21]);
        grouper.assign(&unit(pages.path(), "u2", 22), &key, &PdfWriter, &mut ws).unwrap();
        grouper.assign(&unit(pages.path(), "u3", 23), &key, &PdfWriter, &mut ws).unwrap();
        assert_eq!(page_widths(&dest), vec![21, 22, 23]);
        assert_eq!(grouper.finalize(0, &PdfWriter).unwrap().pages_written, 3);
    }

    #[test]
    fn test_corrupt_page_skipped_not_fatal() {
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(None).unwrap();
        let bad = pages.path().join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();
        let mut bad_unit = unit(pages.path(), "u0", 5);
        bad_unit.path = bad;

        for strategy in [MergeStrategy::Batch, MergeStrategy::Eager] {
            let mut grouper = Grouper::new(strategy, out.path(), FamilyFolders::default());
            let key = classified(Family::Unclassified, &format!("mixed-{:?}", strategy));
            grouper.assign(&bad_unit, &key, &PdfWriter, &mut ws).unwrap();
            grouper.assign(&unit(pages.path(), "ok", 31), &key, &PdfWriter, &mut ws).unwrap();
            let group = grouper.finalize(0, &PdfWriter).unwrap();
            assert_eq!(group.pages_written, 1, "{:?}", strategy);
            assert_eq!(grouper.skipped_pages().len(), 1, "{:?}", strategy);
        }
    }

    #[test]
    fn test_eager_keeps_earlier_pages_when_artifact_unreadable() {
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(None).unwrap();
        let mut grouper = Grouper::new(MergeStrategy::Eager, out.path(), FamilyFolders::default());
        let key = classified(Family::FamilyA, "AB123-456789");
        let dest = out.path().join("FamilyA").join("AB123-456789.pdf");

        grouper.assign(&unit(pages.path(), "u1", 21), &key, &PdfWriter, &mut ws).unwrap();
        grouper.assign(&unit(pages.path(), "u2", 22), &key, &PdfWriter, &mut ws).unwrap();
        std::fs::write(&dest, b"%PDF-1.5 truncated").unwrap();

        let third = unit(pages.path(), "u3", 23);
        grouper.assign(&third, &key, &PdfWriter, &mut ws).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.5 truncated");
        assert_eq!(grouper.groups()[0].pages_written, 2);
        assert_eq!(grouper.skipped_pages().len(), 1);
        assert_eq!(grouper.skipped_pages()[0].path, third.path);
    }

    #[test]
    fn test_unwritable_group_leaves_no_folder() {
        let pages = tempfile::tempdir().unwrap();
        let bad = pages.path().join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();
        let mut bad_unit = unit(pages.path(), "u0", 5);
        bad_unit.path = bad;
        let mut ws = Workspace::acquire(None).unwrap();

        for strategy in [MergeStrategy::Batch, MergeStrategy::Eager] {
            let out = tempfile::tempdir().unwrap();
            let mut grouper = Grouper::new(strategy, out.path(), FamilyFolders::default());
            let key = classified(Family::FamilyB, "CD12-987654321");
            grouper.assign(&bad_unit, &key, &PdfWriter, &mut ws).unwrap();

            assert!(grouper.finalize(0, &PdfWriter).is_err(), "{:?}", strategy);
            assert!(grouper.groups()[0].error.is_some(), "{:?}", strategy);
            assert!(!out.path().join("FamilyB").exists(), "{:?}", strategy);
        }
    }

    #[test]
    fn test_custom_folders_and_safe_names() {
        let folders = FamilyFolders {
            family_a: "Limis".into(),
            family_b: "".into(),
            unclassified: "Misc".into(),
        };
        let grouper = Grouper::new(MergeStrategy::Batch, Path::new("/out"), folders);
        let key = GroupKey {
            family: Family::FamilyA,
            identifier: "AB123-456789".into(),
        };
        assert_eq!(grouper.artifact_path(&key), PathBuf::from("/out/Limis/AB123-456789.pdf"));
        let key = GroupKey {
            family: Family::FamilyB,
            identifier: "a/b".into(),
        };
        assert_eq!(grouper.artifact_path(&key), PathBuf::from("/out/FamilyB/a_b.pdf"));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Eager".parse::<MergeStrategy>().unwrap(), MergeStrategy::Eager);
        assert!("later".parse::<MergeStrategy>().is_err());
    }
}
