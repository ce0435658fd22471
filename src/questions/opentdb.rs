//! [`QuestionSource`] backed by the Open Trivia Database.
//!
//! Question and option text is served verbatim, HTML entities included.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::config;
use crate::model::Difficulty;
use crate::questions::{Question, QuestionError, QuestionResult, QuestionSource};

/// Open Trivia Database HTTP client.
#[derive(Clone)]
pub struct OpenTriviaClient {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl OpenTriviaClient {
    /// Client against the configured base URL, see
    /// [`config::OPENTDB_URL_ENV`].
    pub fn new() -> QuestionResult<Self> {
        Self::with_base_url(config::opentdb_url())
    }

    /// Client against an explicit base URL.
    pub fn with_base_url(base_url: impl AsRef<str>) -> QuestionResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| QuestionError::upstream("building the http client", err))?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
        })
    }
}

impl QuestionSource for OpenTriviaClient {
    fn fetch(
        &self,
        category_id: u32,
        difficulty: Difficulty,
        count: u8,
    ) -> BoxFuture<'static, QuestionResult<Vec<Question>>> {
        let client = self.clone();
        Box::pin(async move {
            let url = format!("{}/api.php", client.base_url);
            let response = client
                .client
                .get(&url)
                .query(&[
                    ("amount", count.to_string()),
                    ("category", category_id.to_string()),
                    ("difficulty", difficulty.as_str().to_string()),
                    ("type", "multiple".to_string()),
                ])
                .send()
                .await
                .map_err(|err| QuestionError::upstream("requesting questions", err))?;

            let status = response.status();
            if !status.is_success() {
                return Err(QuestionError::Status {
                    status: status.as_u16(),
                });
            }
            let payload: ApiResponse = response
                .json()
                .await
                .map_err(|err| QuestionError::upstream("decoding the question payload", err))?;
            // response_code 0 means success; anything else is "no results
            // for these parameters"
            if payload.response_code != 0 || payload.results.is_empty() {
                return Err(QuestionError::Empty);
            }

            Ok(payload
                .results
                .into_iter()
                .map(|item| {
                    Question::assemble(
                        item.question,
                        item.correct_answer,
                        item.incorrect_answers,
                        item.category,
                    )
                })
                .collect())
        })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    response_code: u8,
    #[serde(default)]
    results: Vec<ApiQuestion>,
}

#[derive(Deserialize)]
struct ApiQuestion {
    category: String,
    question: String,
    correct_answer: String,
    incorrect_answers: Vec<String>,
}
