use scansort_rules::Family;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub family: Family,
    pub identifier: String,
    pub path: PathBuf,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// What a run produced and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub files_total: usize,
    pub units_total: usize,
    pub rotated_units: usize,
    /// Units whose recognition produced no text.
    pub empty_units: usize,
    /// Units whose recognition failed outright.
    pub failed_units: usize,
    pub artifacts: Vec<ArtifactRecord>,
    pub skipped_files: Vec<SkipRecord>,
    pub skipped_groups: Vec<SkipRecord>,
    pub skipped_pages: Vec<SkipRecord>,
}

impl RunSummary {
    /// Artifacts written per family.
    pub fn family_counts(&self) -> BTreeMap<Family, usize> {
        let mut counts = BTreeMap::new();
        for artifact in &self.artifacts {
            *counts.entry(artifact.family).or_insert(0) += 1;
        }
        counts
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.identifier.as_str()).collect()
    }

    /// Export sub-folders that received at least one artifact.
    pub fn folders(&self) -> Vec<PathBuf> {
        self.artifacts
            .iter()
            .filter_map(|a| a.path.parent().map(|p| p.to_path_buf()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn artifact(&self, family: Family, identifier: &str) -> Option<&ArtifactRecord> {
        self.artifacts
            .iter()
            .find(|a| a.family == family && a.identifier == identifier)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} files, {} pages, {} documents written",
            self.files_total,
            self.units_total,
            self.artifacts.len()
        )?;
        for (family, count) in self.family_counts() {
            writeln!(f, "  {}: {}", family, count)?;
        }
        for artifact in &self.artifacts {
            writeln!(f, "  {} ({} pages)", artifact.path.display(), artifact.pages)?;
        }
        if self.rotated_units > 0 {
            writeln!(f, "  orientation corrected on {} pages", self.rotated_units)?;
        }
        if self.empty_units + self.failed_units > 0 {
            writeln!(
                f,
                "  no text on {} pages, recognition failed on {}",
                self.empty_units, self.failed_units
            )?;
        }
        for (label, records) in [
            ("skipped file", &self.skipped_files),
            ("skipped document", &self.skipped_groups),
            ("skipped page", &self.skipped_pages),
        ] {
            for record in records {
                writeln!(f, "  {} {}: {}", label, record.path.display(), record.reason)?;
            }
        }
        let folders = self.folders();
        if !folders.is_empty() {
            write!(f, "Output folders:")?;
            for folder in folders {
                write!(f, " {}", folder.display())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_folders() {
        let summary = RunSummary {
            files_total: 3,
            units_total: 4,
            artifacts: vec![
                ArtifactRecord {
                    family: Family::FamilyA,
                    identifier: "AB123-456789".into(),
                    path: "/out/FamilyA/AB123-456789.pdf".into(),
                    pages: 2,
                },
                ArtifactRecord {
                    family: Family::Unclassified,
                    identifier: "doc2".into(),
                    path: "/out/Other/doc2.pdf".into(),
                    pages: 1,
                },
                ArtifactRecord {
                    family: Family::FamilyA,
                    identifier: "XY999-000001".into(),
                    path: "/out/FamilyA/XY999-000001.pdf".into(),
                    pages: 1,
                },
            ],
            skipped_files: vec![SkipRecord {
                path: "/in/notes.txt".into(),
                reason: "unsupported file type".into(),
            }],
            ..Default::default()
        };

        assert_eq!(summary.family_counts()[&Family::FamilyA], 2);
        assert_eq!(
            summary.folders(),
            vec![PathBuf::from("/out/FamilyA"), PathBuf::from("/out/Other")]
        );
        assert!(summary.artifact(Family::Unclassified, "doc2").is_some());

        let text = summary.to_string();
        assert!(text.contains("3 documents written"));
        assert!(text.contains("skipped file /in/notes.txt"));
        assert!(text.contains("Output folders: /out/FamilyA /out/Other"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["filesTotal"], 3);
        assert_eq!(json["artifacts"][1]["family"], "unclassified");
        assert_eq!(json["skippedFiles"][0]["reason"], "unsupported file type");
    }
}
