//! Decoding arXiv Atom feeds into [`Record`]s.
//!
//! The parser streams over the document with `quick-xml` and matches elements by their local
//! name, so namespace prefixes (`atom:entry`, `arxiv:doi`, `opensearch:totalResults`) do not
//! matter. It is deliberately forgiving inside an entry:
//!
//! - Missing optional elements become empty strings.
//! - An entry with neither a title nor an id, or with text that cannot be decoded, is skipped and
//!   counted in [`Feed::skipped`]; the rest of the batch is kept.
//!
//! Only a document that is not a well-formed feed fails as a whole, with
//! [`FetchError::Malformed`]. A feed made of arXiv error entries (the API's way of rejecting a
//! query) fails with [`FetchError::Query`].
//!
//! # Examples
//!
//! ```
//! use harvester::parse::parse;
//!
//! let xml = br#"<feed xmlns="http://www.w3.org/2005/Atom">
//!   <entry>
//!     <id>http://arxiv.org/abs/2405.00001v1</id>
//!     <title>A Title
//!       Over Two Lines</title>
//!     <published>2024-05-01T17:59:59Z</published>
//!     <author><name>Ada Lovelace</name></author>
//!   </entry>
//! </feed>"#;
//!
//! let records = parse(xml).unwrap();
//! assert_eq!(records[0].title, "A Title Over Two Lines");
//! assert_eq!(records[0].year, "2024");
//! assert_eq!(records[0].abstract_text, "");
//! ```

use lazy_static::lazy_static;
use quick_xml::{
  events::{BytesStart, Event},
  Reader,
};
use regex::Regex;

use crate::record::ARXIV_SOURCE;

use super::*;

lazy_static! {
  /// Runs of whitespace, including the newlines arXiv wraps long titles with.
  static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
  /// Resolver prefixes in front of a DOI link.
  static ref DOI_RESOLVER: Regex = Regex::new(r"^https?://(dx\.)?doi\.org/").unwrap();
  /// The identifier part of an arXiv abs URL.
  static ref ABS_URL: Regex = Regex::new(r"/abs/(.+)$").unwrap();
}

/// A decoded feed page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
  /// Usable entries, in feed order
  pub records:       Vec<Record>,
  /// Entries that were dropped as malformed
  pub skipped:       usize,
  /// Size of the whole result set as reported by `opensearch:totalResults`
  pub total_results: Option<u64>,
}

/// Decodes a feed page into records, dropping malformed entries.
pub fn parse(data: &[u8]) -> core::result::Result<Vec<Record>, FetchError> {
  parse_feed(data).map(|feed| feed.records)
}

/// Decodes a feed page, keeping the skipped-entry count and the reported result set size.
pub fn parse_feed(data: &[u8]) -> core::result::Result<Feed, FetchError> {
  let mut reader = Reader::from_reader(data);
  reader.config_mut().trim_text(true);

  let mut feed = Feed::default();
  let mut saw_feed = false;
  let mut api_errors = Vec::new();

  let mut path: Vec<String> = Vec::new();
  let mut text = String::new();
  let mut entry: Option<EntryFields> = None;
  let mut buf = Vec::new();

  loop {
    let event = reader.read_event_into(&mut buf).map_err(|e| {
      FetchError::Malformed(format!("{e} at byte {}", reader.buffer_position()))
    })?;

    match event {
      Event::Start(e) => {
        let name = local_name(&e);
        match name.as_str() {
          "feed" if path.is_empty() => saw_feed = true,
          "entry" if saw_feed && path.len() == 1 => entry = Some(EntryFields::default()),
          "link" => read_link(&e, entry.as_mut()),
          _ => (),
        }
        path.push(name);
        text.clear();
      },
      Event::Empty(e) =>
        if local_name(&e) == "link" {
          read_link(&e, entry.as_mut());
        },
      Event::Text(e) => match e.unescape() {
        Ok(chunk) => text.push_str(&chunk),
        Err(err) =>
          if let Some(fields) = entry.as_mut() {
            debug!("Undecodable text inside entry: {err}");
            fields.broken = true;
          },
      },
      Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
      Event::End(_) => {
        let name = path.pop().unwrap_or_default();
        let parent = path.last().map(String::as_str).unwrap_or_default();
        let value = std::mem::take(&mut text);

        if name == "entry" && path.len() == 1 {
          if let Some(fields) = entry.take() {
            match fields.finish() {
              EntryOutcome::Record(record) => feed.records.push(*record),
              EntryOutcome::ApiError(message) => api_errors.push(message),
              EntryOutcome::Skipped(reason) => {
                warn!("Skipping malformed feed entry: {reason}");
                feed.skipped += 1;
              },
            }
          }
        } else if let Some(fields) = entry.as_mut() {
          fields.assign(&name, parent, value);
        } else if name == "totalResults" {
          feed.total_results = value.trim().parse().ok();
        }
      },
      Event::Eof => break,
      _ => (),
    }
    buf.clear();
  }

  if !saw_feed {
    return Err(FetchError::Malformed("response is not an Atom feed".into()));
  }
  if let Some(open) = path.last() {
    return Err(FetchError::Malformed(format!("document ended inside <{open}>")));
  }
  if !api_errors.is_empty() {
    return Err(FetchError::Query(api_errors.join("; ")));
  }

  trace!(
    "Parsed {} entries ({} skipped, {:?} total results)",
    feed.records.len(),
    feed.skipped,
    feed.total_results
  );
  Ok(feed)
}

/// Extracts the message of an arXiv error feed, if `data` is one.
pub(crate) fn api_error_message(data: &[u8]) -> Option<String> {
  match parse_feed(data) {
    Err(FetchError::Query(message)) => Some(message),
    _ => None,
  }
}

/// The element name without its namespace prefix.
fn local_name(e: &BytesStart) -> String {
  String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Records the DOI carried by a `<link title="doi" href="...">` element.
fn read_link(e: &BytesStart, entry: Option<&mut EntryFields>) {
  let Some(fields) = entry else { return };

  let mut title = None;
  let mut href = None;
  for attr in e.attributes().flatten() {
    let Ok(value) = attr.unescape_value() else { continue };
    match attr.key.local_name().as_ref() {
      b"title" => title = Some(value.into_owned()),
      b"href" => href = Some(value.into_owned()),
      _ => (),
    }
  }

  if let (Some("doi"), Some(href)) = (title.as_deref(), href) {
    fields.doi_link = Some(href);
  }
}

/// Collapses whitespace runs into single spaces and trims the ends.
fn normalize(value: &str) -> String { WHITESPACE.replace_all(value.trim(), " ").into_owned() }

/// Raw values collected for one `<entry>` while it is being read.
#[derive(Debug, Default)]
struct EntryFields {
  /// `<id>`: the abs URL, or an API error URL
  id:          String,
  /// `<title>`
  title:       String,
  /// `<summary>`
  summary:     String,
  /// `<published>`
  published:   String,
  /// `<author><name>` values in order
  authors:     Vec<String>,
  /// `href` of the `<link title="doi">` element
  doi_link:    Option<String>,
  /// `<arxiv:doi>`
  doi_tag:     Option<String>,
  /// `<arxiv:journal_ref>`
  journal_ref: Option<String>,
  /// Set when some text in the entry could not be decoded
  broken:      bool,
}

/// What a completed `<entry>` turned out to be.
enum EntryOutcome {
  /// A usable record
  Record(Box<Record>),
  /// An arXiv error entry carrying this message
  ApiError(String),
  /// An entry that had to be dropped, with the reason
  Skipped(String),
}

impl EntryFields {
  /// Stores the text of a closed element according to where it sits in the entry.
  fn assign(&mut self, name: &str, parent: &str, value: String) {
    match (parent, name) {
      ("entry", "id") => self.id = value.trim().to_string(),
      ("entry", "title") => self.title = normalize(&value),
      ("entry", "summary") => self.summary = normalize(&value),
      ("entry", "published") => self.published = value.trim().to_string(),
      ("entry", "doi") => self.doi_tag = Some(value.trim().to_string()),
      ("entry", "journal_ref") => self.journal_ref = Some(normalize(&value)),
      ("author", "name") => {
        let author = normalize(&value);
        if !author.is_empty() {
          self.authors.push(author);
        }
      },
      _ => (),
    }
  }

  /// Turns the collected values into a [`Record`], or explains why not.
  fn finish(self) -> EntryOutcome {
    if self.id.contains("/api/errors") {
      let message = if self.summary.is_empty() { self.id } else { self.summary };
      return EntryOutcome::ApiError(message);
    }
    if self.broken {
      return EntryOutcome::Skipped(format!("undecodable text in entry \"{}\"", self.id));
    }
    if self.title.is_empty() && self.id.is_empty() {
      return EntryOutcome::Skipped("entry has neither a title nor an id".into());
    }

    let year = self
      .published
      .split('-')
      .next()
      .filter(|year| year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()))
      .unwrap_or_default()
      .to_string();

    let doi = match self.doi_link.filter(|link| !link.trim().is_empty()) {
      Some(link) => DOI_RESOLVER.replace(link.trim(), "").into_owned(),
      None => self.doi_tag.unwrap_or_default(),
    };

    let arxiv_id = ABS_URL
      .captures(&self.id)
      .and_then(|caps| caps.get(1))
      .map(|m| m.as_str().to_string())
      .unwrap_or_default();

    let venue = self
      .journal_ref
      .filter(|journal| !journal.is_empty())
      .unwrap_or_else(|| ARXIV_SOURCE.to_string());

    EntryOutcome::Record(Box::new(Record {
      title: self.title,
      abstract_text: self.summary,
      authors: self.authors,
      venue,
      year,
      doi,
      arxiv_id,
      ..Record::default()
    }))
  }
}
