//! The normalized unit written to the corpus.
//!
//! Every field is a plain string (or list of strings) that defaults to empty, so a consumer reading
//! the corpus never has to handle missing or null values. The serialized field names match the
//! corpus format read by the downstream preprocessing pipeline.

use super::*;

/// Source tag attached to every record harvested from arXiv.
pub const ARXIV_SOURCE: &str = "arXiv";
/// Group tag attached to every record unless the caller assigns another.
pub const DEFAULT_GROUP: &str = "default_group";

/// One harvested bibliographic record.
///
/// # Examples
///
/// ```
/// use harvester::record::Record;
///
/// let record = Record { title: "Attention Is All You Need".into(), ..Record::default() };
/// let line = serde_json::to_string(&record).unwrap();
/// assert!(line.contains(r#""abstract":"""#));
/// assert!(line.contains(r#""publisher":"arXiv""#));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
  /// Paper title with whitespace runs collapsed
  pub title:         String,
  /// Abstract text with whitespace runs collapsed
  #[serde(rename = "abstract")]
  pub abstract_text: String,
  /// Author display names, in the order the feed lists them
  pub authors:       Vec<String>,
  /// Journal reference if the entry has one, otherwise the source tag
  #[serde(rename = "journal_conference_name")]
  pub venue:         String,
  /// Where the record was harvested from
  #[serde(rename = "publisher")]
  pub source:        String,
  /// Four digit publication year
  pub year:          String,
  /// DOI of the published version
  pub doi:           String,
  /// Grouping tag for downstream consumers
  #[serde(rename = "group_name")]
  pub group:         String,
  /// The arXiv identifier, including version suffix
  pub arxiv_id:      String,
}

impl Default for Record {
  fn default() -> Self {
    Self {
      title:         String::new(),
      abstract_text: String::new(),
      authors:       Vec::new(),
      venue:         ARXIV_SOURCE.to_string(),
      source:        ARXIV_SOURCE.to_string(),
      year:          String::new(),
      doi:           String::new(),
      group:         DEFAULT_GROUP.to_string(),
      arxiv_id:      String::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn serializes_with_corpus_field_names() {
    let record = Record {
      title: "A".into(),
      abstract_text: "B".into(),
      authors: vec!["C. D.".into()],
      year: "2024".into(),
      doi: "10.1/x".into(),
      ..Record::default()
    };
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["abstract"], "B");
    assert_eq!(value["journal_conference_name"], "arXiv");
    assert_eq!(value["publisher"], "arXiv");
    assert_eq!(value["group_name"], "default_group");
    assert_eq!(value["authors"][0], "C. D.");
  }

  #[test]
  fn missing_fields_default_to_empty() {
    let record: Record = serde_json::from_str(r#"{"title":"Only a title"}"#).unwrap();
    assert_eq!(record.title, "Only a title");
    assert_eq!(record.abstract_text, "");
    assert!(record.authors.is_empty());
    assert_eq!(record.doi, "");
  }
}
