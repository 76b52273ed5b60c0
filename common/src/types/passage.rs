use std::{cmp::Ordering, collections::BTreeMap};

use serde::{Deserialize, Serialize};

use super::{
    chat::SourceDocument,
    document::{METADATA_FILENAME, METADATA_PAGE},
};

/// A single retrieval hit: the stored text, its metadata, and a relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

impl ScoredPassage {
    pub fn new(content: impl Into<String>, metadata: BTreeMap<String, String>, score: f32) -> Self {
        Self {
            content: content.into(),
            metadata,
            score,
        }
    }

    pub fn to_source_document(&self) -> SourceDocument {
        let filename = self
            .metadata
            .get(METADATA_FILENAME)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let page_number = self
            .metadata
            .get(METADATA_PAGE)
            .and_then(|page| page.parse::<u32>().ok())
            .unwrap_or(0);

        SourceDocument {
            filename,
            page_number,
            snippet: self.content.clone(),
            score: clamp_score(self.score),
        }
    }
}

/// Clamps a similarity score into `[0, 1]`, mapping NaN to zero.
pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Sorts passages by descending score (stable, NaN last) and keeps at most `limit`.
pub fn rank_passages(mut passages: Vec<ScoredPassage>, limit: usize) -> Vec<ScoredPassage> {
    passages.sort_by(|a, b| descending(a.score, b.score));
    passages.truncate(limit);
    passages
}

fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
