use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One entry of an arXiv search response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Paper {
    /// Last path segment of the entry id, e.g. `2301.07041v1`.
    pub id: String,
    pub title: String,
    pub summary: String,
    pub pdf_url: String,
    pub published: NaiveDate,
    pub authors: Vec<String>,
}

impl Paper {
    /// One-line rendering used by the result list.
    pub fn headline(&self) -> String {
        format!(
            "{}\n    ID: {} | Date: {} | Authors: {}",
            self.title,
            self.id,
            self.published,
            self.authors.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub text: String,
    pub speaker: Speaker,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { text: text.into(), speaker: Speaker::User }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { text: text.into(), speaker: Speaker::Assistant }
    }

    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

pub mod completion;
pub mod discovery;
pub mod download;
pub mod retry;
pub mod session;
pub mod tasks;
