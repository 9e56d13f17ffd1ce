use anyhow::Result;
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::normalize;

/// Metadata lookup collaborator: free-text query in, raw volume records out.
///
/// Implementations must be `Sync` so the fetch and select stages can share
/// the process with them. An unreachable provider should be reported as an
/// error by `search`; callers degrade that to "zero candidates".
pub trait MetadataLookup: Sync {
    fn search(&self, query: &str) -> Result<Vec<Volume>>;
}

/// One raw record from the lookup provider. Every field is optional;
/// absence means the provider did not report it, and absent fields
/// contribute nothing to ranking.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Volume {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(rename = "publishedDate")]
    pub published_date: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "industryIdentifiers", default)]
    pub industry_identifiers: Vec<IndustryId>,
    #[serde(rename = "maturityRating")]
    pub maturity_rating: Option<String>,
    #[serde(rename = "averageRating")]
    pub average_rating: Option<f64>,
    #[serde(rename = "imageLinks")]
    pub image_links: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndustryId {
    #[serde(rename = "type")]
    pub id_type: String,
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<VolumeItem>,
}

#[derive(Debug, Deserialize)]
struct VolumeItem {
    #[serde(rename = "volumeInfo")]
    volume_info: Volume,
}

pub struct GoogleBooks {
    client: reqwest::blocking::Client,
}

impl GoogleBooks {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

impl MetadataLookup for GoogleBooks {
    fn search(&self, query: &str) -> Result<Vec<Volume>> {
        let url = format!(
            "https://www.googleapis.com/books/v1/volumes?q={}",
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            warn!("Volume lookup returned {}", response.status());
            return Ok(Vec::new());
        }

        let body: VolumesResponse = response.json()?;
        let mut volumes: Vec<Volume> = body.items.into_iter().map(|i| i.volume_info).collect();
        for volume in &mut volumes {
            polish(volume);
        }

        info!("Received {} records for query: {}", volumes.len(), query);
        Ok(volumes)
    }
}

/// Repair the rough edges lookup responses arrive with: cramped punctuation,
/// inconsistent casing, and author initials written three different ways.
fn polish(volume: &mut Volume) {
    if let Some(title) = volume.title.take() {
        volume.title = Some(normalize::to_title_case(&normalize::space_after_punctuation(
            &title,
        )));
    }
    if let Some(subtitle) = volume.subtitle.take() {
        volume.subtitle = Some(normalize::to_title_case(
            &normalize::space_after_punctuation(&subtitle),
        ));
    }
    if let Some(author) = volume.authors.first_mut() {
        *author = normalize::normalize_author(author);
    }
}
