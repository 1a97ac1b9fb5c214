use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CONTENT_TYPE: &str = "lexical";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub question_html: String,
    pub content_type: String,
    pub options: Vec<PollOption>,
    pub total_votes: i64,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Sum of the per-option counts. Equals `total_votes` for any persisted poll.
    pub fn option_vote_sum(&self) -> i64 {
        self.options.iter().map(|o| o.votes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub votes: i64,
}

/// An option produced by [`reconcile_options`]. `id` is `None` for options
/// that did not match an existing one and still need an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDraft {
    pub id: Option<String>,
    pub text: String,
    pub votes: i64,
}

/// Key used to match option texts across edits.
pub fn normalize_option_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Trim every option text and drop the blank ones, keeping order.
pub fn clean_option_texts<I, S>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    texts
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Match `incoming` option texts against `existing` options.
///
/// Existing options are bucketed by normalized text into FIFO queues. Each
/// incoming text takes the front of its bucket, so duplicate texts match
/// positionally and every existing option is claimed at most once. A claimed
/// option keeps its id and votes and takes the incoming text. Unclaimed
/// incoming texts become fresh options with zero votes; unclaimed existing
/// options are dropped.
pub fn reconcile_options(existing: &[PollOption], incoming: &[String]) -> Vec<OptionDraft> {
    let mut buckets: HashMap<String, VecDeque<&PollOption>> = HashMap::new();
    for option in existing {
        buckets
            .entry(normalize_option_text(&option.text))
            .or_default()
            .push_back(option);
    }

    clean_option_texts(incoming)
        .into_iter()
        .map(|text| {
            let claimed = buckets
                .get_mut(&normalize_option_text(&text))
                .and_then(VecDeque::pop_front);
            match claimed {
                Some(prior) => OptionDraft {
                    id: Some(prior.id.clone()),
                    text,
                    votes: prior.votes.max(0),
                },
                None => OptionDraft {
                    id: None,
                    text,
                    votes: 0,
                },
            }
        })
        .collect()
}
