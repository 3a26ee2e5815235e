use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::NaiveDate;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::Client;

use crate::config::ArxivSettings;
use crate::error::{AppError, AppResult};
use crate::layers::retry::RetryPolicy;
use crate::layers::Paper;

pub struct ArxivClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl ArxivClient {
    pub fn new(settings: &ArxivSettings) -> AppResult<Self> {
        let client = Client::builder().timeout(settings.timeout()).build()?;

        // arXiv asks API users to keep it slow; one request per second unless configured.
        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(nonzero!(1u32));

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            retry: RetryPolicy::new(settings.max_attempts, settings.retry_delay()),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    pub fn search_url(&self, query: &str, max_results: usize) -> String {
        format!(
            "{}?search_query=all:{}&start=0&max_results={}",
            self.base_url,
            urlencoding::encode(query.trim()),
            max_results
        )
    }

    /// Searches all fields for `query`. A 502 is retried with a fixed delay up
    /// to the configured attempt bound; any other failure is returned at once.
    pub async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<Paper>> {
        if query.trim().is_empty() {
            return Err(AppError::input("Please enter a search query."));
        }

        let url = self.search_url(query, max_results);
        let body = self
            .retry
            .run("arXiv search", |attempt| {
                let url = url.clone();
                async move {
                    self.limiter.until_ready().await;
                    tracing::info!("Querying arXiv (attempt {}): {}", attempt, url);

                    let resp = self.client.get(&url).send().await?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(AppError::http(status.as_u16(), "arXiv search"));
                    }
                    Ok(resp.text().await?)
                }
            })
            .await?;

        let mut papers = parse_feed(&body)?;
        papers.truncate(max_results);
        tracing::info!("arXiv returned {} paper(s) for {:?}", papers.len(), query);
        Ok(papers)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl EntryFields {
    fn push_text(&mut self, field: Field, author: &mut String, text: &str) {
        match field {
            Field::Id => self.id.push_str(text),
            Field::Title => self.title.push_str(text),
            Field::Summary => self.summary.push_str(text),
            Field::Published => self.published.push_str(text),
            Field::AuthorName => author.push_str(text),
            Field::None => {}
        }
    }

    /// Only the first `<link title="pdf">` counts.
    fn take_link(&mut self, e: &BytesStart) {
        if self.pdf_url.is_some() {
            return;
        }
        let mut href = None;
        let mut is_pdf = false;
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"href" => href = Some(String::from_utf8_lossy(&attr.value).to_string()),
                b"title" => is_pdf = &*attr.value == b"pdf",
                _ => {}
            }
        }
        if is_pdf {
            self.pdf_url = href;
        }
    }

    fn into_paper(self) -> Result<Paper, String> {
        let id = self
            .id
            .trim()
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or("missing id")?
            .to_string();

        let pdf_url = self.pdf_url.ok_or_else(|| format!("{} has no pdf link", id))?;

        let date = self.published.trim().split('T').next().unwrap_or_default();
        let published = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| format!("{} has bad published date {:?}: {}", id, self.published, e))?;

        Ok(Paper {
            id,
            title: self.title.split_whitespace().collect::<Vec<_>>().join(" "),
            summary: self.summary.trim().to_string(),
            pdf_url,
            published,
            authors: self.authors,
        })
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}

/// Parses an arXiv Atom feed. Entries without a pdf link or with an unreadable
/// id/published date are skipped; malformed XML fails the whole feed.
pub fn parse_feed(xml: &str) -> AppResult<Vec<Paper>> {
    let mut reader = Reader::from_str(xml);

    let mut papers = Vec::new();
    let mut entry: Option<EntryFields> = None;
    let mut field = Field::None;
    let mut author = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    entry = Some(EntryFields::default());
                    field = Field::None;
                }
                b"link" => {
                    if let Some(current) = entry.as_mut() {
                        current.take_link(&e);
                    }
                }
                tag if entry.is_some() => {
                    field = match tag {
                        b"id" => Field::Id,
                        b"title" => Field::Title,
                        b"summary" => Field::Summary,
                        b"published" => Field::Published,
                        b"name" => {
                            author.clear();
                            Field::AuthorName
                        }
                        _ => Field::None,
                    };
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(current) = entry.as_mut() {
                        current.take_link(&e);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = entry.as_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    current.push_text(field, &mut author, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = entry.as_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    current.push_text(field, &mut author, &text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(current) = entry.as_mut() {
                    let name = String::from_utf8_lossy(&e).into_owned();
                    match resolve_entity(&name) {
                        Some(text) => current.push_text(field, &mut author, &text),
                        None => tracing::debug!("Ignoring unknown entity &{};", name),
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(done) = entry.take() {
                        match done.into_paper() {
                            Ok(paper) => {
                                tracing::debug!("Parsed arXiv entry {}: {}", paper.id, paper.title);
                                papers.push(paper);
                            }
                            Err(reason) => tracing::warn!("Skipping arXiv entry: {}", reason),
                        }
                    }
                    field = Field::None;
                }
                b"name" => {
                    if field == Field::AuthorName {
                        if let Some(current) = entry.as_mut() {
                            current.authors.push(author.trim().to_string());
                        }
                    }
                    field = Field::None;
                }
                _ => field = Field::None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AppError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(papers)
}
