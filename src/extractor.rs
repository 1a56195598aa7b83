//! Citation field extraction from `PubmedArticle` trees.
//!
//! Every lookup is defensive: the MEDLINE schema allows almost any element to be
//! missing, repeated or to carry inline markup. A defect in one article yields a
//! record with sentinel or null fields and is counted, it never fails the file.

use std::io::BufRead;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::models::{CitationRecord, InvalidPmidPolicy, MAX_PMID, SENTINEL_PMID, SENTINEL_YEAR};
use crate::xml::{ArticleReader, XmlNode};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Map a three letter month abbreviation (`Jan` .. `Dec`) to its number.
#[must_use]
pub fn month_number(abbreviation: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|month| *month == abbreviation)
        .and_then(|index| u32::try_from(index + 1).ok())
}

/// Result of extracting one article.
#[derive(Debug)]
pub struct ArticleExtraction {
    /// The normalized record, sentinel fields included
    pub record: CitationRecord,
    /// Field defects found while reading the article
    pub defects: Vec<IngestError>,
    /// Whether the publication date had to be replaced by a fallback
    pub date_fallback: bool,
}

/// Result of extracting one document.
#[derive(Debug, Default)]
pub struct FileExtraction {
    /// Records kept under the configured invalid pmid policy
    pub records: Vec<CitationRecord>,
    /// `PubmedArticle` nodes seen
    pub articles: usize,
    /// Articles carrying at least one field defect
    pub defective_articles: usize,
    /// Articles whose publication date was replaced by a fallback
    pub date_fallbacks: usize,
    /// Articles without a usable pmid
    pub invalid_pmids: usize,
    /// Articles dropped because of the invalid pmid policy
    pub dropped: usize,
}

/// Turns `PubmedArticle` trees into [`CitationRecord`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordExtractor {
    policy: InvalidPmidPolicy,
}

impl RecordExtractor {
    /// Create an extractor applying `policy` to articles without a pmid.
    #[must_use]
    pub const fn new(policy: InvalidPmidPolicy) -> Self {
        Self { policy }
    }

    /// Extract every article of a decompressed `PubmedArticleSet` document.
    ///
    /// Fails only when the XML itself cannot be read.
    pub fn extract_document<R: BufRead>(&self, source: R, source_id: i64) -> Result<FileExtraction> {
        let mut reader = ArticleReader::new(source);
        let mut extraction = FileExtraction::default();

        while let Some(article) = reader.next_article()? {
            extraction.articles += 1;
            let outcome = Self::extract_article(&article, source_id);

            if !outcome.defects.is_empty() {
                extraction.defective_articles += 1;
                for defect in &outcome.defects {
                    debug!(%defect, "Article field defect");
                }
            }
            if outcome.date_fallback {
                extraction.date_fallbacks += 1;
            }

            if !outcome.record.has_valid_pmid() {
                extraction.invalid_pmids += 1;
                if self.policy == InvalidPmidPolicy::Drop {
                    extraction.dropped += 1;
                    continue;
                }
            }
            extraction.records.push(outcome.record);
        }

        if let Some(root) = reader.root_name() {
            if root != crate::xml::ROOT_ELEMENT {
                warn!(root, "Unexpected document root");
            }
        }

        Ok(extraction)
    }

    /// Extract one `PubmedArticle` node.
    #[must_use]
    pub fn extract_article(article: &XmlNode, source_id: i64) -> ArticleExtraction {
        let mut defects = Vec::new();

        let Some(citation) = article.child("MedlineCitation") else {
            defects.push(IngestError::FieldExtractionDefect {
                pmid: SENTINEL_PMID,
                field: "MedlineCitation",
                reason: "missing".to_string(),
            });
            return ArticleExtraction {
                record: empty_record(source_id),
                defects,
                date_fallback: false,
            };
        };

        let pmid = read_pmid(citation, &mut defects);
        let journal_issue = citation.path(&["Article", "Journal", "JournalIssue"]);
        let (pubdate, date_fallback) = read_pubdate(
            pmid,
            journal_issue.and_then(|issue| issue.child("PubDate")),
            &mut defects,
        );

        let record = CitationRecord {
            pmid,
            journal: scalar(citation.path(&["Article", "Journal", "Title"])),
            pubdate,
            volume: scalar(journal_issue.and_then(|issue| issue.child("Volume"))),
            issue: scalar(journal_issue.and_then(|issue| issue.child("Issue"))),
            title: scalar(citation.path(&["Article", "ArticleTitle"])),
            abstract_text: read_abstract(citation.path(&["Article", "Abstract", "AbstractText"])),
            page: scalar(citation.path(&["Article", "Pagination", "MedlinePgn"])),
            author: read_first_author(citation.path(&["Article", "AuthorList", "Author"])),
            language: read_language(citation.path(&["Article", "Language"])),
            source_id,
        };

        ArticleExtraction {
            record,
            defects,
            date_fallback,
        }
    }
}

fn empty_record(source_id: i64) -> CitationRecord {
    CitationRecord {
        pmid: SENTINEL_PMID,
        journal: None,
        pubdate: sentinel_date(),
        volume: None,
        issue: None,
        title: None,
        abstract_text: None,
        page: None,
        author: None,
        language: None,
        source_id,
    }
}

fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(SENTINEL_YEAR, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Text of a scalar node; of a repeated node, the first item carrying text.
fn scalar(node: Option<&XmlNode>) -> Option<String> {
    node?.items().find_map(XmlNode::text).map(str::to_string)
}

fn read_pmid(citation: &XmlNode, defects: &mut Vec<IngestError>) -> u64 {
    let Some(text) = citation.child("PMID").and_then(|pmid| pmid.items().find_map(XmlNode::text)) else {
        defects.push(IngestError::FieldExtractionDefect {
            pmid: SENTINEL_PMID,
            field: "PMID",
            reason: "missing".to_string(),
        });
        return SENTINEL_PMID;
    };

    let reason = match text.parse::<u64>() {
        Ok(pmid) if pmid <= MAX_PMID => return pmid,
        Ok(_) => format!("{text:?} exceeds {MAX_PMID}"),
        Err(e) => format!("{text:?}: {e}"),
    };
    defects.push(IngestError::FieldExtractionDefect {
        pmid: SENTINEL_PMID,
        field: "PMID",
        reason,
    });
    SENTINEL_PMID
}

fn read_pubdate(pmid: u64, pubdate: Option<&XmlNode>, defects: &mut Vec<IngestError>) -> (NaiveDate, bool) {
    let field = |name: &str| pubdate.and_then(|date| scalar(date.child(name)));

    let year = match field("Year") {
        None => SENTINEL_YEAR,
        Some(text) => text.parse::<i32>().unwrap_or_else(|e| {
            defects.push(IngestError::FieldExtractionDefect {
                pmid,
                field: "Year",
                reason: format!("{text:?}: {e}"),
            });
            SENTINEL_YEAR
        }),
    };

    // An unrecognized month resets the whole date to the first of the year.
    let (month, day) = match field("Month") {
        None => (1, read_day(pmid, field("Day"), defects)),
        Some(text) => match month_number(&text) {
            Some(month) => (month, read_day(pmid, field("Day"), defects)),
            None => {
                defects.push(IngestError::FieldExtractionDefect {
                    pmid,
                    field: "Month",
                    reason: format!("{text:?} is not a month abbreviation"),
                });
                (1, 1)
            }
        },
    };

    build_date(pmid, year, month, day)
}

fn read_day(pmid: u64, day: Option<String>, defects: &mut Vec<IngestError>) -> u32 {
    let Some(text) = day else {
        return 1;
    };
    text.parse::<u32>().unwrap_or_else(|e| {
        defects.push(IngestError::FieldExtractionDefect {
            pmid,
            field: "Day",
            reason: format!("{text:?}: {e}"),
        });
        1
    })
}

/// Build a calendar date, falling back to the first of the month, then of the
/// year, then to the sentinel year. The flag reports whether a fallback was used.
fn build_date(pmid: u64, year: i32, month: u32, day: u32) -> (NaiveDate, bool) {
    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        return (date, false);
    }

    let failure = IngestError::DateConstructionFailure { year, month, day };
    warn!(pmid, error = %failure, "Substituting fallback publication date");

    let fallback = NaiveDate::from_ymd_opt(year, month, 1)
        .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1))
        .unwrap_or_else(sentinel_date);
    (fallback, true)
}

fn read_abstract(node: Option<&XmlNode>) -> Option<String> {
    match node? {
        XmlNode::List(paragraphs) => {
            let parts: Vec<&str> = paragraphs.iter().filter_map(XmlNode::text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        single => single.text().map(str::to_string),
    }
}

fn read_first_author(node: Option<&XmlNode>) -> Option<String> {
    node?.items().next()?.child("Initials").and_then(XmlNode::text).map(str::to_string)
}

fn read_language(node: Option<&XmlNode>) -> Option<String> {
    let codes: Vec<&str> = node?.items().filter_map(XmlNode::text).collect();
    (!codes.is_empty()).then(|| codes.join(","))
}
