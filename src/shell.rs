//! Line-oriented terminal front end. Reads commands from stdin while
//! background summaries and answers are printed as they complete.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::layers::completion::CompletionClient;
use crate::layers::discovery::ArxivClient;
use crate::layers::download::{open_in_viewer, Downloader};
use crate::layers::session::{Session, Update};
use crate::layers::tasks::{run_with_timeout, Action, TaskDispatcher};
use crate::layers::Speaker;

const HELP: &str = "\
Commands:
  search <query>        search arXiv
  list                  show the current results
  select <n>            select result n
  summarize             summarize the selected paper
  download              save the selected paper's PDF
  preview               open the selected paper's PDF
  translate <language>  translate the current summary
  ask <question>        ask about the summarized paper
  transcript            show the chat so far
  help                  show this help
  quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    List,
    Select(usize),
    Summarize,
    Download,
    Preview,
    Translate(String),
    Ask(String),
    Transcript,
    Help,
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> AppResult<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "search" | "s" => {
                if rest.is_empty() {
                    return Err(AppError::input("Please enter a search query."));
                }
                Self::Search(rest.to_string())
            }
            "list" | "ls" => Self::List,
            "select" | "sel" => {
                let n: usize = rest
                    .parse()
                    .map_err(|_| AppError::input("Usage: select <n> (as shown by list)"))?;
                if n == 0 {
                    return Err(AppError::input("Results are numbered from 1."));
                }
                Self::Select(n - 1)
            }
            "summarize" | "sum" => Self::Summarize,
            "download" | "dl" => Self::Download,
            "preview" | "open" => Self::Preview,
            "translate" | "tr" => {
                let language = if rest.is_empty() { "English" } else { rest };
                Self::Translate(language.to_string())
            }
            "ask" => {
                if rest.is_empty() {
                    return Err(AppError::input("Please enter a question."));
                }
                Self::Ask(rest.to_string())
            }
            "transcript" | "chat" => Self::Transcript,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(AppError::input(format!("Unknown command {:?}; try help", other))),
        };
        Ok(Some(command))
    }
}

pub struct Shell {
    settings: Arc<Settings>,
    arxiv: ArxivClient,
    downloader: Downloader,
    completion: Option<CompletionClient>,
    dispatcher: TaskDispatcher<String>,
    session: Session,
}

impl Shell {
    pub fn new(settings: Arc<Settings>) -> AppResult<Self> {
        let completion = match CompletionClient::from_settings(&settings) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("AI features unavailable until configured: {}", e);
                None
            }
        };

        Ok(Self {
            arxiv: ArxivClient::new(&settings.arxiv)?,
            downloader: Downloader::new(&settings.download)?,
            completion,
            dispatcher: TaskDispatcher::new(settings.completion.task_timeout()),
            session: Session::new(),
            settings,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);
        prompt();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match Command::parse(&line) {
                        Ok(None) => {}
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => {
                            if let Err(e) = self.execute(command).await {
                                report(&e);
                            }
                        }
                        Err(e) => report(&e),
                    }
                    prompt();
                }
                Some(outcome) = self.dispatcher.next() => {
                    let update = self.session.apply_outcome(outcome);
                    show(update);
                    prompt();
                }
            }
        }

        Ok(())
    }

    fn completion(&self) -> AppResult<CompletionClient> {
        match &self.completion {
            Some(client) => Ok(client.clone()),
            None => CompletionClient::from_settings(&self.settings),
        }
    }

    pub async fn execute(&mut self, command: Command) -> AppResult<()> {
        match command {
            Command::Search(query) => {
                let papers = match self.arxiv.search(&query, self.settings.arxiv.max_results).await {
                    Ok(papers) => papers,
                    Err(e) => {
                        tracing::error!("Error fetching papers: {}", e);
                        println!("{}", search_failure_message(&e));
                        return Ok(());
                    }
                };
                if papers.is_empty() {
                    println!("No papers found.");
                }
                self.session.replace_results(papers);
                self.print_results();
            }
            Command::List => self.print_results(),
            Command::Select(index) => {
                let paper = self.session.select(index)?;
                println!("Selected [{}] {}", index + 1, paper.title);
            }
            Command::Summarize => {
                let client = self.completion()?;
                let (tag, text) = self.session.begin_summarize()?;
                self.dispatcher.submit(tag, async move { client.summarize(&text).await });
                println!("Processing... Please wait.");
            }
            Command::Download => {
                let paper = self.session.selected()?;
                let path = self.downloader.download(&paper.pdf_url, &paper.id).await?;
                println!("Paper downloaded as {}", path.display());
            }
            Command::Preview => {
                let paper = self.session.selected()?;
                let path = self.downloader.fetch_or_reuse(paper).await?;
                open_in_viewer(&path)?;
            }
            Command::Translate(language) => {
                let client = self.completion()?;
                let source = self.session.translation_source()?;
                println!("Translating... Please wait.");
                let translated = run_with_timeout(
                    "translate",
                    async move { client.translate(&source, &language).await },
                    self.settings.completion.task_timeout(),
                )
                .await?;
                println!("{}", translated);
            }
            Command::Ask(question) => {
                let client = self.completion()?;
                if self.dispatcher.is_busy(Action::Ask) {
                    println!("(previous question cancelled)");
                }
                let (tag, context) = self.session.begin_ask(&question)?;
                self.dispatcher
                    .submit(tag, async move { client.ask(&question, &context).await });
                println!("Thinking...");
            }
            Command::Transcript => {
                for turn in self.session.transcript() {
                    let who = match turn.speaker {
                        Speaker::User => "you",
                        Speaker::Assistant => "assistant",
                    };
                    println!("{}> {}", who, turn.text);
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }

    fn print_results(&self) {
        for (i, paper) in self.session.papers().iter().enumerate() {
            println!("[{}] {}", i + 1, paper.headline());
        }
    }
}

fn show(update: Update) {
    match update {
        Update::Summary { paper_id, text } => println!("\nSummary ({}):\n{}", paper_id, text),
        Update::Answer { text, .. } => println!("\nassistant> {}", text),
        Update::Failed { tag, error } => {
            tracing::error!("{:?} for {} failed: {}", tag.action, tag.paper_id, error);
            println!("\n{}", error);
        }
        Update::Stale(_) => {}
    }
}

/// Any failed search, whether HTTP, transport or feed parsing, reads the same
/// to the user. The cause stays in parentheses.
fn search_failure_message(error: &AppError) -> String {
    format!("Failed to fetch papers. Try again. ({})", error)
}

fn report(error: &AppError) {
    println!("{}", error);
}

fn prompt() {
    print!("garx> ");
    let _ = std::io::stdout().flush();
}
