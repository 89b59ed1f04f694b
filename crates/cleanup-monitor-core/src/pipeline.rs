//! Two-stage processing of a single web asset.
//!
//! Stage one runs the image extractor and then counts what landed in the
//! `<stem>_images` directory next to the source file. The extractor's exit
//! code is not trusted; the directory contents are the measure of success.
//! Stage two runs the duplicate remover over that directory when both the
//! directory and the remover exist. Errors are recorded on the result and
//! never abort the run.

use log::debug;
use std::path::Path;

use crate::config::Settings;
use crate::discovery::{count_images, dir_size};
use crate::error::{Error, Result};
use crate::logging::ActivityLog;
use crate::processor::{invoke, ProcessorSpec};
use crate::stats::Statistics;
use crate::types::{FileTask, PipelineResult, Stage, StageFailure};

/// Drives the extractor and duplicate remover for one file at a time
#[derive(Debug, Clone)]
pub struct ProcessingPipeline {
    extractor: ProcessorSpec,
    remover: ProcessorSpec,
    log: ActivityLog,
}

impl ProcessingPipeline {
    pub fn new(extractor: ProcessorSpec, remover: ProcessorSpec, log: ActivityLog) -> Self {
        Self {
            extractor,
            remover,
            log,
        }
    }

    pub fn from_settings(settings: &Settings, log: ActivityLog) -> Self {
        Self::new(
            settings.image_extractor_spec(),
            settings.duplicate_remover_spec(),
            log,
        )
    }

    pub fn extractor(&self) -> &ProcessorSpec {
        &self.extractor
    }

    pub fn remover(&self) -> &ProcessorSpec {
        &self.remover
    }

    /// Run both stages for one file and report what they achieved
    pub fn process(&self, task: &FileTask) -> PipelineResult {
        let name = task.display_name();
        let mut result = PipelineResult::empty(task.path.clone());

        self.log.info(format!("Processing: {}", name));

        // Without an extractor there is nothing for the remover to work on
        if !self.extractor.is_present() {
            debug!("Image extractor not found, skipping {}", name);
            return result;
        }

        self.log.info("  -> Extracting images...");
        if let Err(e) = self.run_stage(&self.extractor, &task.path) {
            self.record_failure(&mut result, Stage::ImageExtraction, &name, e);
        }

        let images_dir = task.images_dir();
        if !images_dir.is_dir() {
            debug!("No images directory at {}", images_dir.display());
            return result;
        }

        match count_images(&images_dir) {
            Ok(count) => {
                result.images_extracted = count;
                self.log.info(format!("  Extracted {} images", count));
            }
            Err(source) => {
                let e = Error::Inspection {
                    path: images_dir.clone(),
                    source,
                };
                self.record_failure(&mut result, Stage::ImageExtraction, &name, e);
            }
        }

        if !self.remover.is_present() {
            return result;
        }

        self.log.info("  -> Removing duplicates...");
        let size_before = dir_size(&images_dir).ok();
        match self.run_stage(&self.remover, &task.path) {
            Ok(()) => {
                // One completed pass counts as one, whatever it removed
                result.duplicates_removed = 1;
                if let (Some(before), Ok(after)) = (size_before, dir_size(&images_dir)) {
                    result.bytes_reclaimed = before.saturating_sub(after);
                }
                self.log.info("  Duplicates removed");
            }
            Err(e) => self.record_failure(&mut result, Stage::DuplicateRemoval, &name, e),
        }

        result
    }

    /// Process a file and fold the outcome into the shared counters
    pub fn process_and_record(&self, task: &FileTask, stats: &Statistics) -> PipelineResult {
        let result = self.process(task);
        let totals = stats.fold(&result);

        let name = task.display_name();
        if result.is_clean() {
            self.log.info(format!("Completed: {}", name));
        } else {
            self.log.warn(format!(
                "Completed with {} failed stage(s): {}",
                result.stage_failures.len(),
                name
            ));
        }
        debug!("Totals after {}: {:?}", name, totals);

        result
    }

    fn run_stage(&self, spec: &ProcessorSpec, file: &Path) -> Result<()> {
        let output = invoke(spec, file)?;
        if !output.success() {
            let detail = output.stderr_tail().unwrap_or("no error output");
            self.log.warn(format!(
                "  {} exited with {}: {}",
                spec.describe(),
                output.status,
                detail
            ));
        }
        Ok(())
    }

    fn record_failure(&self, result: &mut PipelineResult, stage: Stage, name: &str, e: Error) {
        self.log
            .error(format!("Error processing {} during {}: {}", name, stage, e));
        result.stage_failures.push(StageFailure {
            stage,
            cause: e.to_string(),
        });
    }
}
