//! Content replacer. Swaps container regions of the live document.
//!
//! Missing containers never fail the swap; each selector is handled on its
//! own and the outcome is summarised in a [`ReplaceReport`].

use serde::Serialize;

use crate::dom::{parse_selector, Document};
use crate::types::{DocumentSide, PageData};

/// Why a container was not swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingInCurrent,
    MissingInIncoming,
    InvalidSelector,
}

impl From<DocumentSide> for SkipReason {
    fn from(side: DocumentSide) -> Self {
        match side {
            DocumentSide::Current => SkipReason::MissingInCurrent,
            DocumentSide::Incoming => SkipReason::MissingInIncoming,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedContainer {
    pub selector: String,
    pub reason: SkipReason,
}

/// Outcome of one replacement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    /// Title assigned to the live document.
    pub title: String,
    /// Selectors swapped, in list order.
    pub replaced: Vec<String>,
    pub skipped: Vec<SkippedContainer>,
}

impl ReplaceReport {
    /// True when no selector was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Swap every container in `containers` from `page` into `document`.
///
/// The title is always taken over from the incoming page. Swaps that
/// succeed are kept even when other selectors are skipped.
pub fn replace_content(document: &mut Document, page: &PageData, containers: &[String]) -> ReplaceReport {
    let mut incoming = Document::parse(&page.html);

    let title = incoming.title();
    document.set_title(&title);

    let mut report = ReplaceReport {
        title,
        ..ReplaceReport::default()
    };

    for selector in containers {
        let Some(parsed) = parse_selector(selector) else {
            tracing::warn!("Invalid container selector: {selector}");
            report.skipped.push(SkippedContainer {
                selector: selector.clone(),
                reason: SkipReason::InvalidSelector,
            });
            continue;
        };

        match document.swap_container(&mut incoming, &parsed) {
            Ok(()) => report.replaced.push(selector.clone()),
            Err(side) => {
                tracing::warn!("Container missing in {side}: {selector}");
                report.skipped.push(SkippedContainer {
                    selector: selector.clone(),
                    reason: side.into(),
                });
            }
        }
    }

    document.compact();

    tracing::debug!(
        "replaced {} of {} containers from {}",
        report.replaced.len(),
        containers.len(),
        page.url
    );
    report
}
