use crate::error::{AppError, AppResult};
use crate::layers::tasks::{Action, RequestTag, TaskOutcome};
use crate::layers::{ChatTurn, Paper};

/// The paper whose summary is on screen; questions are answered against its abstract.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPaper {
    pub paper_id: String,
    pub abstract_text: String,
    pub summary: String,
}

/// What applying a background result changed.
#[derive(Debug)]
pub enum Update {
    Summary { paper_id: String, text: String },
    Answer { paper_id: String, text: String },
    Failed { tag: RequestTag, error: AppError },
    /// The result belongs to a paper that is no longer current and was dropped.
    Stale(RequestTag),
}

/// State behind the interactive shell. Mutated only from the control loop;
/// background work reports back through `apply_outcome`.
#[derive(Debug, Default)]
pub struct Session {
    papers: Vec<Paper>,
    selected: Option<usize>,
    processed: Option<ProcessedPaper>,
    transcript: Vec<ChatTurn>,
    /// Question of the ask in flight. Joins the transcript together with its answer.
    pending_question: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the result set wholesale. The selection is cleared; the
    /// processed paper and the transcript survive.
    pub fn replace_results(&mut self, papers: Vec<Paper>) {
        self.papers = papers;
        self.selected = None;
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn select(&mut self, index: usize) -> AppResult<&Paper> {
        if index >= self.papers.len() {
            return Err(AppError::input(format!(
                "No paper #{} in the current results ({} shown).",
                index + 1,
                self.papers.len()
            )));
        }
        self.selected = Some(index);
        Ok(&self.papers[index])
    }

    pub fn selected(&self) -> AppResult<&Paper> {
        self.selected
            .and_then(|i| self.papers.get(i))
            .ok_or_else(|| AppError::input("Please select a paper from the list."))
    }

    pub fn processed(&self) -> Option<&ProcessedPaper> {
        self.processed.as_ref()
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    /// Tag and abstract for summarizing the selected paper.
    pub fn begin_summarize(&self) -> AppResult<(RequestTag, String)> {
        let paper = self.selected()?;
        Ok((RequestTag::new(&paper.id, Action::Summarize), paper.summary.clone()))
    }

    /// Holds the question until its answer arrives and returns the tag and
    /// the processed paper's abstract to ask against. A newer question
    /// replaces one still in flight.
    pub fn begin_ask(&mut self, question: &str) -> AppResult<(RequestTag, String)> {
        let processed = self
            .processed
            .as_ref()
            .ok_or_else(|| AppError::input("Please process a paper first."))?;
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::input("Please enter a question."));
        }

        let tag = RequestTag::new(&processed.paper_id, Action::Ask);
        let context = processed.abstract_text.clone();
        self.pending_question = Some(question.to_string());
        Ok((tag, context))
    }

    /// Text handed to the translator: the current summary.
    pub fn translation_source(&self) -> AppResult<String> {
        self.processed
            .as_ref()
            .map(|p| p.summary.clone())
            .ok_or_else(|| AppError::input("Please process a paper first."))
    }

    /// Applies a finished background result if it still refers to the
    /// current paper: the selection for summaries, the processed paper for
    /// answers. Anything else is discarded.
    pub fn apply_outcome(&mut self, outcome: TaskOutcome<String>) -> Update {
        let TaskOutcome { tag, result } = outcome;

        let current = match tag.action {
            Action::Summarize => self.selected().ok().map(|p| p.id.as_str()),
            Action::Ask => self.processed.as_ref().map(|p| p.paper_id.as_str()),
        };
        if current != Some(tag.paper_id.as_str()) {
            tracing::warn!(
                "Discarding stale {:?} result for {} (current: {:?})",
                tag.action,
                tag.paper_id,
                current
            );
            if tag.action == Action::Ask {
                self.pending_question = None;
            }
            return Update::Stale(tag);
        }

        let text = match result {
            Ok(text) => text,
            Err(error) => {
                if tag.action == Action::Ask {
                    self.pending_question = None;
                }
                return Update::Failed { tag, error };
            }
        };

        match tag.action {
            Action::Summarize => {
                let abstract_text = self.selected().map(|p| p.summary.clone()).unwrap_or_default();
                self.processed = Some(ProcessedPaper {
                    paper_id: tag.paper_id.clone(),
                    abstract_text,
                    summary: text.clone(),
                });
                Update::Summary { paper_id: tag.paper_id, text }
            }
            Action::Ask => {
                if let Some(question) = self.pending_question.take() {
                    self.transcript.push(ChatTurn::user(question));
                }
                self.transcript.push(ChatTurn::assistant(text.clone()));
                Update::Answer { paper_id: tag.paper_id, text }
            }
        }
    }
}
