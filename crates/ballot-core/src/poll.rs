use crate::error::CoreError;
use ballot_db::polls::{NewPoll, PollChanges};
use ballot_db::DbPool;
use ballot_models::poll::{clean_option_texts, Poll, DEFAULT_CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

/// Body of a create request. Loosely typed so that type errors surface as
/// validation failures rather than decode failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollInput {
    pub question: Option<Value>,
    pub question_html: Option<String>,
    pub content_type: Option<String>,
    pub options: Option<Value>,
    pub allow_multiple_votes: Option<Value>,
    pub is_active: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePollInput {
    pub question: Option<Value>,
    pub question_html: Option<String>,
    pub content_type: Option<String>,
    pub options: Option<Value>,
    pub allow_multiple_votes: Option<Value>,
    pub is_active: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteInput {
    pub option_id: Option<String>,
}

/// A create request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPoll {
    pub question: String,
    pub question_html: String,
    pub content_type: String,
    pub options: Vec<String>,
    pub allow_multiple_votes: bool,
    pub is_active: bool,
}

/// `allowMultipleVotes`: absent means true, otherwise only `true` / `"true"` enable it.
pub fn allow_multiple_votes_flag(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        Some(_) => false,
    }
}

/// `isActive`: absent means true, otherwise only `false` / `"false"` disable it.
pub fn is_active_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => s != "false",
        _ => true,
    }
}

fn plain_question(value: &Value) -> Result<String, CoreError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::String(_) => Err(CoreError::Validation(
            "plain text question is required".into(),
        )),
        _ => Err(CoreError::Validation(
            "question must be plain text string".into(),
        )),
    }
}

fn option_texts(value: &Value) -> Result<Vec<String>, CoreError> {
    let Value::Array(items) = value else {
        return Err(CoreError::Validation("options must be an array".into()));
    };
    // Scalars are accepted as their text form; null and nested values count as blank.
    let raw = items.iter().filter_map(|item| match item {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    });
    Ok(clean_option_texts(raw))
}

pub fn validate_create(input: &CreatePollInput) -> Result<ValidatedPoll, CoreError> {
    let question = match input.question.as_ref() {
        Some(value) => plain_question(value)?,
        None => {
            return Err(CoreError::Validation(
                "plain text question is required".into(),
            ))
        }
    };

    let options = match input.options.as_ref() {
        Some(value) => option_texts(value)?,
        None => Vec::new(),
    };
    if options.len() < 2 {
        return Err(CoreError::Validation(
            "at least 2 options are required".into(),
        ));
    }

    Ok(ValidatedPoll {
        question,
        question_html: input.question_html.clone().unwrap_or_default(),
        content_type: input
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        options,
        allow_multiple_votes: allow_multiple_votes_flag(input.allow_multiple_votes.as_ref()),
        is_active: is_active_flag(input.is_active.as_ref()),
    })
}

pub fn validate_update(input: &UpdatePollInput) -> Result<PollChanges, CoreError> {
    Ok(PollChanges {
        question: input.question.as_ref().map(plain_question).transpose()?,
        question_html: input.question_html.clone(),
        content_type: input.content_type.clone(),
        is_active: input.is_active.as_ref().map(|v| is_active_flag(Some(v))),
        allow_multiple_votes: input
            .allow_multiple_votes
            .as_ref()
            .map(|v| allow_multiple_votes_flag(Some(v))),
        options: input.options.as_ref().map(option_texts).transpose()?,
    })
}

fn require_option_id(input: &VoteInput) -> Result<&str, CoreError> {
    input
        .option_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CoreError::Validation("optionId required".into()))
}

pub async fn list_polls(pool: &DbPool) -> Result<Vec<Poll>, CoreError> {
    Ok(ballot_db::polls::list_polls(pool).await?)
}

pub async fn get_poll(pool: &DbPool, poll_id: &str) -> Result<Poll, CoreError> {
    ballot_db::polls::get_poll(pool, poll_id)
        .await?
        .ok_or(CoreError::NotFound)
}

pub async fn create_poll(pool: &DbPool, input: &CreatePollInput) -> Result<Poll, CoreError> {
    let valid = validate_create(input)?;
    let poll = ballot_db::polls::create_poll(
        pool,
        &NewPoll {
            question: &valid.question,
            question_html: &valid.question_html,
            content_type: &valid.content_type,
            is_active: valid.is_active,
            allow_multiple_votes: valid.allow_multiple_votes,
            options: &valid.options,
        },
    )
    .await?;
    tracing::debug!(poll_id = %poll.id, options = poll.options.len(), "poll created");
    Ok(poll)
}

pub async fn update_poll(
    pool: &DbPool,
    poll_id: &str,
    input: &UpdatePollInput,
) -> Result<Poll, CoreError> {
    let changes = validate_update(input)?;
    Ok(ballot_db::polls::update_poll(pool, poll_id, &changes).await?)
}

pub async fn cast_vote(pool: &DbPool, poll_id: &str, input: &VoteInput) -> Result<Poll, CoreError> {
    let option_id = require_option_id(input)?;
    Ok(ballot_db::polls::cast_vote(pool, poll_id, option_id).await?)
}

pub async fn retract_vote(
    pool: &DbPool,
    poll_id: &str,
    input: &VoteInput,
) -> Result<Poll, CoreError> {
    let option_id = require_option_id(input)?;
    Ok(ballot_db::polls::retract_vote(pool, poll_id, option_id).await?)
}

pub async fn reset_poll(pool: &DbPool, poll_id: &str) -> Result<Poll, CoreError> {
    Ok(ballot_db::polls::reset_votes(pool, poll_id).await?)
}

pub async fn delete_poll(pool: &DbPool, poll_id: &str) -> Result<(), CoreError> {
    ballot_db::polls::delete_poll(pool, poll_id).await?;
    tracing::debug!(poll_id, "poll deleted");
    Ok(())
}
