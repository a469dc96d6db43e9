//! Message bodies rendered from work packages
//!
//! Rendering is a pure function of the work package and a few derived
//! values; [`DefaultTemplate`] is what sessions use unless another
//! [`MessageTemplate`] is plugged into the backend.

use crate::error::Result;
use crate::hal::WorkPackage;
use chrono::{DateTime, Utc};
use std::fmt;

/// Everything a template may use.
#[derive(Debug, Clone)]
pub struct WorkPackageView<'a> {
    pub work_package: &'a WorkPackage,
    /// Subject with the importance marker removed.
    pub subject: &'a str,
    pub date: DateTime<Utc>,
    pub base_url: &'a str,
    pub word_count: usize,
    pub reading_minutes: u32,
}

impl<'a> WorkPackageView<'a> {
    #[must_use]
    pub fn new(
        work_package: &'a WorkPackage,
        subject: &'a str,
        date: DateTime<Utc>,
        base_url: &'a str,
        words_per_minute: u32,
    ) -> Self {
        let words = work_package
            .description()
            .map_or(0, |desc| word_count(&desc.raw));
        Self {
            work_package,
            subject,
            date,
            base_url,
            word_count: words,
            reading_minutes: reading_minutes(words, words_per_minute),
        }
    }

    /// Link to the work package in the web UI.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}/work_packages/{}", self.base_url, self.work_package.id())
    }
}

/// Number of whitespace separated words.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated minutes to read `words`; at least one when there is text.
#[must_use]
pub fn reading_minutes(words: usize, words_per_minute: u32) -> u32 {
    if words == 0 {
        return 0;
    }
    let wpm = usize::try_from(words_per_minute.max(1)).unwrap_or(usize::MAX);
    u32::try_from(words.div_ceil(wpm)).unwrap_or(u32::MAX)
}

/// Text and HTML alternatives of a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedBody {
    pub text: String,
    pub html: String,
}

/// Renders a work package into message bodies.
pub trait MessageTemplate: fmt::Debug + Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the template cannot be rendered.
    fn render(&self, view: &WorkPackageView<'_>) -> Result<RenderedBody>;
}

/// Description followed by a reading-time line and a link back.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTemplate;

impl MessageTemplate for DefaultTemplate {
    fn render(&self, view: &WorkPackageView<'_>) -> Result<RenderedBody> {
        let desc = view.work_package.description().unwrap_or_default();
        let url = view.url();
        let reading = if view.reading_minutes > 0 {
            format!("{} minute read", view.reading_minutes)
        } else {
            String::new()
        };

        let mut text = desc.raw;
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("\n-- \n");
        if !reading.is_empty() {
            text.push_str(&reading);
            text.push('\n');
        }
        text.push_str(&url);
        text.push('\n');

        let html = format!(
            "<html>\n<head></head>\n<body>\n{}\n<hr>\n<p>{reading}</p>\n<p><a href=\"{url}\">{url}</a></p>\n</body>\n</html>\n",
            desc.html
        );
        Ok(RenderedBody { text, html })
    }
}
