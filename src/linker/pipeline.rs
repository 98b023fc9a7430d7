//! Ordered, named sequence of linker steps.
//!
//! A [`Pipeline`] runs its steps strictly in list order against one [`LinkContext`]. The list
//! is never snapshotted: a running step can queue [`PipelineEdit`]s on the context and the
//! pipeline applies them as soon as that step returns, before moving the cursor forward.
//!
//! # Editing while running
//!
//! Only the region after the cursor is open. Steps inserted behind the running step execute
//! later in the same pass. Inserting at or before the cursor, or removing a step that already
//! ran (or is running), fails with [`Error::PipelineLocked`]. There is exactly one pass.
//!
//! # Naming
//!
//! Steps are addressed by kind, the value returned by [`Step::name`]. Each entry also gets a
//! unique instance name: the kind for the first instance, `Kind#2`, `Kind#3`, ... for later
//! ones. Anchored insertion and removal match the first entry whose kind or instance name
//! equals the target.

use std::fmt;

use log::debug;

use crate::{linker::LinkContext, Error, Result};

/// A unit of work in the linker pipeline.
///
/// Steps receive the context explicitly and keep no global state. A step that wants further
/// steps to run queues them through [`LinkContext::queue_pipeline_edit`].
pub trait Step {
    /// Step kind, used to address the step inside a pipeline.
    fn name(&self) -> &'static str;

    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Any error aborts the pipeline; it is wrapped in [`Error::StepFailed`].
    fn process(&mut self, ctx: &mut LinkContext) -> Result<()>;
}

/// A change to the pipeline requested by a running step.
pub enum PipelineEdit {
    /// Add a step at the end.
    Append(Box<dyn Step>),
    /// Add a step at the front.
    Prepend(Box<dyn Step>),
    /// Add a step right before the first step matching the target.
    AddBefore(String, Box<dyn Step>),
    /// Add a step right after the first step matching the target.
    AddAfter(String, Box<dyn Step>),
    /// Remove the first step matching the target.
    Remove(String),
}

impl fmt::Debug for PipelineEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEdit::Append(step) => write!(f, "Append({})", step.name()),
            PipelineEdit::Prepend(step) => write!(f, "Prepend({})", step.name()),
            PipelineEdit::AddBefore(target, step) => {
                write!(f, "AddBefore({target}, {})", step.name())
            }
            PipelineEdit::AddAfter(target, step) => {
                write!(f, "AddAfter({target}, {})", step.name())
            }
            PipelineEdit::Remove(target) => write!(f, "Remove({target})"),
        }
    }
}

struct PipelineEntry {
    name: String,
    step: Box<dyn Step>,
}

/// The step list and its execution cursor.
#[derive(Default)]
pub struct Pipeline {
    entries: Vec<PipelineEntry>,
    cursor: Option<usize>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the instance names of all steps, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Returns true if a step matching `target` exists.
    #[must_use]
    pub fn contains(&self, target: &str) -> bool {
        self.position(target).is_some()
    }

    fn position(&self, target: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name == target || entry.step.name() == target)
    }

    fn instance_name(&self, kind: &str) -> String {
        let existing = self
            .entries
            .iter()
            .filter(|entry| entry.step.name() == kind)
            .count();
        let mut ordinal = existing + 1;
        let mut name = if existing == 0 {
            kind.to_string()
        } else {
            format!("{kind}#{ordinal}")
        };
        // A removed instance can leave its ordinal free while a later one is still taken.
        while self.entries.iter().any(|entry| entry.name == name) {
            ordinal += 1;
            name = format!("{kind}#{ordinal}");
        }
        name
    }

    fn insert_at(&mut self, index: usize, step: Box<dyn Step>) -> Result<()> {
        if let Some(cursor) = self.cursor {
            if index <= cursor {
                return Err(Error::PipelineLocked(format!(
                    "cannot insert '{}' at or before the running step '{}'",
                    step.name(),
                    self.entries[cursor].name
                )));
            }
        }

        let name = self.instance_name(step.name());
        if self.entries.iter().any(|entry| entry.name == name) {
            return Err(Error::DuplicateStep(name));
        }
        self.entries.insert(index, PipelineEntry { name, step });
        Ok(())
    }

    /// Adds a step at the end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateStep`] if no unique instance name can be assigned.
    pub fn append_step(&mut self, step: Box<dyn Step>) -> Result<()> {
        self.insert_at(self.entries.len(), step)
    }

    /// Adds a step at the front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineLocked`] while the pipeline is running.
    pub fn prepend_step(&mut self, step: Box<dyn Step>) -> Result<()> {
        self.insert_at(0, step)
    }

    /// Adds a step right before the first step matching `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StepNotFound`] if no step matches `target`, and
    /// [`Error::PipelineLocked`] if the position is not after the running step.
    pub fn add_step_before(&mut self, target: &str, step: Box<dyn Step>) -> Result<()> {
        let index = self
            .position(target)
            .ok_or_else(|| Error::StepNotFound(target.to_string()))?;
        self.insert_at(index, step)
    }

    /// Adds a step right after the first step matching `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StepNotFound`] if no step matches `target`, and
    /// [`Error::PipelineLocked`] if the position is not after the running step.
    pub fn add_step_after(&mut self, target: &str, step: Box<dyn Step>) -> Result<()> {
        let index = self
            .position(target)
            .ok_or_else(|| Error::StepNotFound(target.to_string()))?;
        self.insert_at(index + 1, step)
    }

    /// Removes the first step matching `target`; does nothing when there is none.
    ///
    /// Returns true if a step was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineLocked`] when the step already ran or is running.
    pub fn remove_step(&mut self, target: &str) -> Result<bool> {
        let Some(index) = self.position(target) else {
            return Ok(false);
        };
        if let Some(cursor) = self.cursor {
            if index <= cursor {
                return Err(Error::PipelineLocked(format!(
                    "cannot remove '{}' after it ran",
                    self.entries[index].name
                )));
            }
        }
        self.entries.remove(index);
        Ok(true)
    }

    /// Applies an edit queued by a running step.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying insertion or removal.
    pub fn apply(&mut self, edit: PipelineEdit) -> Result<()> {
        match edit {
            PipelineEdit::Append(step) => self.append_step(step),
            PipelineEdit::Prepend(step) => self.prepend_step(step),
            PipelineEdit::AddBefore(target, step) => self.add_step_before(&target, step),
            PipelineEdit::AddAfter(target, step) => self.add_step_after(&target, step),
            PipelineEdit::Remove(target) => self.remove_step(&target).map(|_| ()),
        }
    }

    /// Runs every step in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StepFailed`] naming the step whose processing (or whose pipeline edits)
    /// failed. Later steps do not run.
    pub fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let mut index = 0;
        while index < self.entries.len() {
            self.cursor = Some(index);
            let result = self.run_entry(index, ctx);
            if let Err(error) = result {
                self.cursor = None;
                ctx.take_pipeline_edits();
                return Err(Error::StepFailed {
                    step: self.entries[index].name.clone(),
                    source: Box::new(error),
                });
            }
            index += 1;
        }
        self.cursor = None;
        Ok(())
    }

    fn run_entry(&mut self, index: usize, ctx: &mut LinkContext) -> Result<()> {
        let entry = &mut self.entries[index];
        debug!("Running step {}", entry.name);
        entry.step.process(ctx)?;

        for edit in ctx.take_pipeline_edits() {
            debug!("{} requested {:?}", self.entries[index].name, edit);
            self.apply(edit)?;
        }
        Ok(())
    }
}
