//! Parsing of the schema.org `JobPosting` block embedded in detail pages.
//!
//! The block is deserialized into a typed intermediate representation whose
//! fields are all optional, then [`JobPostingLd::validate`] turns it into an
//! [`ExtractedJob`] or a `StructuralMismatch`. Both the HTTP fast path and the
//! render fallback go through [`parse_job_posting`], so a posting yields the
//! same record whichever path read it.

use std::sync::LazyLock;

use chrono::NaiveDate;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CrawlError, CrawlResult};
use crate::types::job::{EmploymentType, ExtractedJob};

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// A single value, or a list of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }
}

/// `identifier` is either a bare string or a `PropertyValue` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Text(String),
    Property { value: Option<Value> },
}

impl Identifier {
    fn value(&self) -> Option<String> {
        let raw = match self {
            Identifier::Text(s) => s.clone(),
            Identifier::Property { value: Some(Value::String(s)) } => s.clone(),
            Identifier::Property { value: Some(Value::Number(n)) } => n.to_string(),
            Identifier::Property { .. } => return None,
        };
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Named {
    Text(String),
    Object { name: Option<String> },
}

impl Named {
    fn name(&self) -> Option<&str> {
        match self {
            Named::Text(s) => Some(s.as_str()),
            Named::Object { name } => name.as_deref(),
        }
        .map(str::trim)
        .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub address_locality: Option<String>,
    pub address_region: Option<String>,
    pub address_country: Option<Named>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Address {
    Text(String),
    Postal(PostalAddress),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Place {
    pub address: Option<Address>,
    pub name: Option<String>,
}

impl Place {
    /// Most specific non-empty label: locality, region, country, then place name.
    fn label(&self) -> Option<String> {
        let from_address = match &self.address {
            Some(Address::Text(s)) => Some(s.as_str()),
            Some(Address::Postal(a)) => a
                .address_locality
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| a.address_region.as_deref().filter(|s| !s.trim().is_empty()))
                .or_else(|| a.address_country.as_ref().and_then(Named::name)),
            None => None,
        };
        from_address
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Typed view of a schema.org `JobPosting` object.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPostingLd {
    pub title: Option<String>,
    pub identifier: Option<Identifier>,
    pub description: Option<String>,
    pub date_posted: Option<String>,
    pub employment_type: Option<OneOrMany<String>>,
    pub job_location: Option<OneOrMany<Place>>,
    pub hiring_organization: Option<Named>,
}

impl JobPostingLd {
    /// Check required fields and normalize into an [`ExtractedJob`].
    pub fn validate(self, url: &str) -> CrawlResult<ExtractedJob> {
        let mismatch = |reason: &str| CrawlError::StructuralMismatch {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| mismatch("JobPosting has no title"))?
            .to_string();

        let job_id = self
            .identifier
            .as_ref()
            .and_then(Identifier::value)
            .ok_or_else(|| mismatch("JobPosting has no identifier"))?;

        let employment_type = self
            .employment_type
            .as_ref()
            .and_then(|types| types.iter().map(|t| EmploymentType::parse(t)).next())
            .unwrap_or_default();

        let location = self.job_location.as_ref().and_then(|places| {
            let mut labels: Vec<String> = Vec::new();
            for label in places.iter().filter_map(Place::label) {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
            (!labels.is_empty()).then(|| labels.join("; "))
        });

        Ok(ExtractedJob {
            job_id,
            title,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            date_posted: self.date_posted.as_deref().and_then(parse_date),
            employment_type,
            location,
            hiring_organization: self
                .hiring_organization
                .as_ref()
                .and_then(Named::name)
                .map(str::to_string),
            url: url.to_string(),
        })
    }
}

/// Accepts `2025-03-01` or any datetime that starts with a date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Raw text of every JSON-LD script in an HTML document.
pub fn extract_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LD_JSON)
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

fn is_job_posting(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "JobPosting",
        Some(Value::Array(types)) => types.iter().any(|t| t == "JobPosting"),
        _ => false,
    }
}

/// Pick the `JobPosting` object out of a set of JSON-LD blocks.
///
/// Arrays and `@graph` containers are searched. If no object is tagged
/// `JobPosting`, the first object found is used.
pub fn find_job_posting<'a>(blocks: impl IntoIterator<Item = &'a str>) -> Option<Value> {
    let mut first_object = None;

    for block in blocks {
        let Ok(value) = serde_json::from_str::<Value>(block.trim()) else {
            continue;
        };

        let mut candidates: Vec<Value> = Vec::new();
        match value {
            Value::Array(items) => candidates.extend(items),
            Value::Object(mut map) => {
                if let Some(Value::Array(graph)) = map.remove("@graph") {
                    candidates.extend(graph);
                }
                candidates.push(Value::Object(map));
            }
            _ => {}
        }

        for candidate in candidates.into_iter().filter(Value::is_object) {
            if is_job_posting(&candidate) {
                return Some(candidate);
            }
            if first_object.is_none() {
                first_object = Some(candidate);
            }
        }
    }

    first_object
}

/// Parse JSON-LD script contents into a validated job.
///
/// No blocks at all is `MissingStructuredData`; blocks that hold no usable
/// `JobPosting` are a `StructuralMismatch`.
pub fn parse_job_posting<'a>(
    blocks: impl IntoIterator<Item = &'a str>,
    url: &str,
) -> CrawlResult<ExtractedJob> {
    let mut blocks = blocks.into_iter().peekable();
    if blocks.peek().is_none() {
        return Err(CrawlError::MissingStructuredData {
            url: url.to_string(),
        });
    }

    let value = find_job_posting(blocks).ok_or_else(|| CrawlError::StructuralMismatch {
        url: url.to_string(),
        reason: "no JSON-LD object".to_string(),
    })?;

    let posting: JobPostingLd =
        serde_json::from_value(value).map_err(|e| CrawlError::StructuralMismatch {
            url: url.to_string(),
            reason: format!("malformed JobPosting: {}", e),
        })?;

    posting.validate(url)
}

/// Parse a full HTML document's JSON-LD into a validated job.
pub fn parse_html(html: &str, url: &str) -> CrawlResult<ExtractedJob> {
    let blocks = extract_blocks(html);
    parse_job_posting(blocks.iter().map(String::as_str), url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{job_posting_html, job_posting_json};

    const URL: &str = "https://acme.wd1.myworkdayjobs.com/en-US/careers/job/Minneapolis/Analyst_R100";

    #[test]
    fn test_parses_workday_posting() {
        let job = parse_html(&job_posting_html("R100", "Data Analyst"), URL).unwrap();

        assert_eq!(job.job_id, "R100");
        assert_eq!(job.title, "Data Analyst");
        assert_eq!(job.employment_type, EmploymentType::FullTime);
        assert_eq!(job.location.as_deref(), Some("Minneapolis"));
        assert_eq!(job.date_posted, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(job.hiring_organization.as_deref(), Some("Acme Corp"));
        assert_eq!(job.url, URL);
    }

    #[test]
    fn test_missing_block_is_reported_as_missing() {
        let err = parse_html("<html><body><h1>Analyst</h1></body></html>", URL).unwrap_err();
        assert!(matches!(err, CrawlError::MissingStructuredData { .. }));
    }

    #[test]
    fn test_unparsable_block_is_structural_mismatch() {
        let err = parse_job_posting(["{\"@type\": \"JobPosting\","], URL).unwrap_err();
        assert!(matches!(err, CrawlError::StructuralMismatch { .. }));
    }

    #[test]
    fn test_missing_identifier_is_structural_mismatch() {
        let block = r#"{"@type": "JobPosting", "title": "Analyst"}"#;
        let err = parse_job_posting([block], URL).unwrap_err();
        match err {
            CrawlError::StructuralMismatch { reason, .. } => {
                assert!(reason.contains("identifier"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_field_type_is_structural_mismatch() {
        let block = r#"{"@type": "JobPosting", "title": ["a", "b"], "identifier": "R1"}"#;
        let err = parse_job_posting([block], URL).unwrap_err();
        assert!(matches!(err, CrawlError::StructuralMismatch { .. }));
    }

    #[test]
    fn test_graph_container_and_variant_shapes() {
        let block = r#"{
            "@context": "https://schema.org",
            "@graph": [
                {"@type": "Organization", "name": "Acme Corp"},
                {
                    "@type": "JobPosting",
                    "title": "Nurse",
                    "identifier": {"@type": "PropertyValue", "value": 4411},
                    "employmentType": ["PART_TIME", "FULL_TIME"],
                    "datePosted": "2025-02-10T08:00:00.000Z",
                    "hiringOrganization": "Acme Health",
                    "jobLocation": [
                        {"address": {"addressLocality": "St. Paul"}},
                        {"address": {"addressRegion": "MN"}},
                        {"address": {"addressLocality": "St. Paul"}}
                    ]
                }
            ]
        }"#;
        let job = parse_job_posting([block], URL).unwrap();

        assert_eq!(job.job_id, "4411");
        assert_eq!(job.employment_type, EmploymentType::PartTime);
        assert_eq!(job.location.as_deref(), Some("St. Paul; MN"));
        assert_eq!(job.date_posted, NaiveDate::from_ymd_opt(2025, 2, 10));
        assert_eq!(job.hiring_organization.as_deref(), Some("Acme Health"));
    }

    #[test]
    fn test_skips_unparsable_blocks() {
        let json = job_posting_json("R7", "Engineer");
        let job = parse_job_posting(["{not json", json.as_str()], URL).unwrap();
        assert_eq!(job.job_id, "R7");
    }

    #[test]
    fn test_unparsable_date_is_none() {
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date("2025-1"), None);
        assert_eq!(
            parse_date("2025-03-01"),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
    }
}
