//! The pipeline controller: one run from selected files to written artifacts.

use image::DynamicImage;
use scansort_rules::Classifier;
use std::path::{Path, PathBuf};

use crate::artifact::ArtifactWriter;
use crate::cancel::CancellationToken;
use crate::engine::{EngineSlot, TextFragment};
use crate::error::{PipelineError, Result};
use crate::extract::{extract, Extraction};
use crate::group::{FamilyFolders, Grouper, MergeStrategy};
use crate::orientation::{OrientationResolver, OrientationStrategy};
use crate::progress::{Phase, ProgressTracker, StatusBoard};
use crate::source::Rasterizer;
use crate::state::{PipelineState, StateMachine};
use crate::summary::{ArtifactRecord, RunSummary, SkipRecord};
use crate::unit::{ImageUnit, InputFile, InputKind};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    /// In selection order.
    pub inputs: Vec<PathBuf>,
    pub export_root: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(inputs: Vec<PathBuf>, export_root: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            export_root: Some(export_root.into()),
        }
    }

    /// The export root, if the request may start.
    pub fn validate(&self) -> Result<&Path> {
        if self.inputs.is_empty() {
            return Err(PipelineError::Precondition("no input files selected".into()));
        }
        match self.export_root.as_deref() {
            Some(root) if !root.as_os_str().is_empty() => Ok(root),
            _ => Err(PipelineError::Precondition("no export destination".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    StoppedByRequest,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    pub merge: MergeStrategy,
    pub orientation: OrientationStrategy,
    pub folders: FamilyFolders,
    /// Where run workspaces are created; the system temp dir when unset.
    pub workspace_parent: Option<PathBuf>,
}

pub struct PipelineController {
    options: ControllerOptions,
    classifier: Classifier,
    engine: EngineSlot,
    rasterizer: Box<dyn Rasterizer>,
    writer: Box<dyn ArtifactWriter>,
    board: StatusBoard,
    machine: StateMachine,
}

impl PipelineController {
    pub fn new(
        options: ControllerOptions,
        classifier: Classifier,
        engine: EngineSlot,
        rasterizer: Box<dyn Rasterizer>,
        writer: Box<dyn ArtifactWriter>,
    ) -> Self {
        Self {
            options,
            classifier,
            engine,
            rasterizer,
            writer,
            board: StatusBoard::new(),
            machine: StateMachine::default(),
        }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Shared handle for polling this controller's status.
    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.machine.state()
    }

    pub fn engine_build_count(&self) -> usize {
        self.engine.build_count()
    }

    /// Run the whole pipeline. A stop request is `Ok` with
    /// `RunStatus::StoppedByRequest`; only precondition and fatal failures
    /// are `Err`.
    pub fn run(&mut self, request: &RunRequest, cancel: &CancellationToken) -> Result<RunOutcome> {
        let export_root = request.validate()?.to_path_buf();
        if self.machine.state().is_active() {
            return Err(PipelineError::Precondition("a run is already active".into()));
        }
        self.machine.reset();
        self.board.reset();

        log::info!(
            "[Pipeline] run: {} inputs -> {} ({:?}, {:?})",
            request.inputs.len(),
            export_root.display(),
            self.options.merge,
            self.options.orientation
        );

        let mut summary = RunSummary {
            files_total: request.inputs.len(),
            ..Default::default()
        };

        match self.execute(request, &export_root, cancel, &mut summary) {
            Ok(()) => {
                self.transition(PipelineState::Completed)?;
                self.board.set_progress(1.0);
                self.board.set_message(format!(
                    "Finished: {} documents written",
                    summary.artifacts.len()
                ));
                Ok(RunOutcome {
                    status: RunStatus::Completed,
                    summary,
                })
            }
            Err(PipelineError::StoppedByRequest) => {
                self.transition(PipelineState::Cancelling)?;
                self.board.set_message("Stopping");
                self.transition(PipelineState::Stopped)?;
                self.board.set_message("Processing stopped");
                Ok(RunOutcome {
                    status: RunStatus::StoppedByRequest,
                    summary,
                })
            }
            Err(e) => {
                log::error!("[Pipeline] run failed: {}", e);
                if let Err(t) = self.transition(PipelineState::Failed) {
                    log::error!("[Pipeline] {}", t);
                }
                self.board.set_message(format!("Failed: {}", e));
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: PipelineState) -> Result<()> {
        self.machine.advance(next)?;
        self.board.set_state(next);
        Ok(())
    }

    fn execute(
        &mut self,
        request: &RunRequest,
        export_root: &Path,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<()> {
        self.transition(PipelineState::Ingesting)?;
        let mut workspace = Workspace::acquire(self.options.workspace_parent.as_deref())?;

        if self.engine.build_count() == 0 {
            self.board.set_message("Initialising OCR engine");
        }
        self.engine.get()?;

        let mut tracker = ProgressTracker::new();
        let mut units = self.ingest(request, &workspace, cancel, &mut tracker, summary)?;
        summary.units_total = units.len();

        self.transition(PipelineState::OrientationCorrecting)?;
        let prefetched = self.correct_orientation(&mut units, cancel, &mut tracker, summary)?;

        let mut grouper = Grouper::new(self.options.merge, export_root, self.options.folders.clone());
        let outcome = self.classify_and_merge(
            &units,
            prefetched,
            &mut grouper,
            &mut workspace,
            cancel,
            &mut tracker,
            summary,
        );
        record_groups(&grouper, summary);
        outcome
    }

    fn ingest(
        &mut self,
        request: &RunRequest,
        workspace: &Workspace,
        cancel: &CancellationToken,
        tracker: &mut ProgressTracker,
        summary: &mut RunSummary,
    ) -> Result<Vec<ImageUnit>> {
        let total = request.inputs.len();
        let mut units = Vec::new();

        for (index, path) in request.inputs.iter().enumerate() {
            cancel.check()?;
            self.board.set_message(format!(
                "Ingesting {} ({}/{})",
                display_name(path),
                index + 1,
                total
            ));

            match self.ingest_file(index, path, workspace) {
                Ok(mut pages) => units.append(&mut pages),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("[Pipeline] skipping {}: {}", path.display(), e);
                    summary.skipped_files.push(SkipRecord {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            self.board.set_progress(tracker.update(Phase::Ingest, index + 1, total));
        }

        log::info!("[Pipeline] ingested {} pages from {} files", units.len(), total);
        Ok(units)
    }

    fn ingest_file(&self, index: usize, path: &Path, workspace: &Workspace) -> Result<Vec<ImageUnit>> {
        let input = InputFile::from_path(index, path)?;
        let pages = match input.kind {
            InputKind::Image => {
                vec![image::open(&input.path).map_err(|e| PipelineError::render(&input.path, e))?]
            }
            InputKind::Pdf => self.render_with_repair(&input, workspace)?,
        };

        let mut units = Vec::with_capacity(pages.len());
        for (page_index, page) in pages.into_iter().enumerate() {
            let dest = workspace.page_path(input.index, &input.stem, page_index);
            page.save(&dest)
                .map_err(|e| PipelineError::Workspace(format!("{}: {}", dest.display(), e)))?;
            units.push(ImageUnit::new(&input, page_index, dest));
        }
        Ok(units)
    }

    /// Render; on failure repair once into the workspace and render again.
    fn render_with_repair(&self, input: &InputFile, workspace: &Workspace) -> Result<Vec<DynamicImage>> {
        match self.rasterizer.render(&input.path) {
            Ok(pages) => Ok(pages),
            Err(first) => {
                log::warn!("[Pipeline] {}; attempting repair", first);
                let repaired = workspace.repaired_path(input.index);
                self.writer.repair(&input.path, &repaired)?;
                let pages = self.rasterizer.render(&repaired).map_err(|e| {
                    PipelineError::render(&input.path, format!("unreadable after repair: {}", e))
                })?;
                log::info!("[Pipeline] {} repaired", input.path.display());
                Ok(pages)
            }
        }
    }

    fn correct_orientation(
        &mut self,
        units: &mut [ImageUnit],
        cancel: &CancellationToken,
        tracker: &mut ProgressTracker,
        summary: &mut RunSummary,
    ) -> Result<Vec<Option<Vec<TextFragment>>>> {
        let resolver = OrientationResolver::new(self.options.orientation);
        let total = units.len();
        let mut prefetched = Vec::with_capacity(total);

        for (i, unit) in units.iter_mut().enumerate() {
            cancel.check()?;
            self.board.set_message(format!(
                "Checking orientation of {} ({}/{})",
                unit.label(),
                i + 1,
                total
            ));
            let engine = self.engine.get()?;
            let resolution = resolver.resolve(unit, engine);
            if resolution.rotation != 0 {
                summary.rotated_units += 1;
            }
            prefetched.push(resolution.prefetched);
            self.board
                .set_progress(tracker.update(Phase::Orientation, i + 1, total));
        }
        Ok(prefetched)
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_and_merge(
        &mut self,
        units: &[ImageUnit],
        mut prefetched: Vec<Option<Vec<TextFragment>>>,
        grouper: &mut Grouper,
        workspace: &mut Workspace,
        cancel: &CancellationToken,
        tracker: &mut ProgressTracker,
        summary: &mut RunSummary,
    ) -> Result<()> {
        self.transition(PipelineState::Extracting)?;
        let total = units.len();

        for (i, unit) in units.iter().enumerate() {
            cancel.check()?;
            self.transition(PipelineState::Extracting)?;
            self.board.set_message(format!(
                "Recognising {} ({}/{})",
                unit.label(),
                i + 1,
                total
            ));

            let extraction = match prefetched.get_mut(i).and_then(Option::take) {
                Some(fragments) => Extraction::from_fragments(&fragments),
                None => extract(unit, self.engine.get()?),
            };
            match &extraction {
                Extraction::Empty => summary.empty_units += 1,
                Extraction::Failed(_) => summary.failed_units += 1,
                Extraction::Text { .. } => {}
            }

            self.transition(PipelineState::ClassifyingAndGrouping)?;
            let result = self.classifier.classify(extraction.text(), &unit.source_stem);
            log::info!(
                "[Pipeline] {} -> {} {}",
                unit.label(),
                result.family,
                result.identifier
            );
            grouper.assign(unit, &result, self.writer.as_ref(), workspace)?;
            self.board
                .set_progress(tracker.update(Phase::Recognition, i + 1, total));
        }

        self.transition(PipelineState::Merging)?;
        let groups = grouper.len();
        for idx in 0..groups {
            cancel.check()?;
            let target = grouper.groups()[idx].artifact.clone();
            self.board.set_message(format!(
                "Writing {} ({}/{})",
                display_name(&target),
                idx + 1,
                groups
            ));
            if let Err(e) = grouper.finalize(idx, self.writer.as_ref()) {
                log::warn!("[Pipeline] {} skipped: {}", target.display(), e);
            }
            self.board.set_progress(tracker.update(Phase::Merge, idx + 1, groups));
        }
        Ok(())
    }
}

/// Written groups become artifacts, failed ones skipped groups. Groups not
/// yet finalised when a run stops appear in neither list.
fn record_groups(grouper: &Grouper, summary: &mut RunSummary) {
    for group in grouper.groups() {
        if let Some(reason) = &group.error {
            summary.skipped_groups.push(SkipRecord {
                path: group.artifact.clone(),
                reason: reason.clone(),
            });
        } else if group.pages_written > 0 {
            summary.artifacts.push(ArtifactRecord {
                family: group.key.family,
                identifier: group.key.identifier.clone(),
                path: group.artifact.clone(),
                pages: group.pages_written,
            });
        }
    }
    summary.skipped_pages = grouper
        .skipped_pages()
        .iter()
        .map(|p| SkipRecord {
            path: p.path.clone(),
            reason: p.reason.clone(),
        })
        .collect();
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
