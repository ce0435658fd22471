//! Question supply: the [`QuestionSource`] seam, a prefetching
//! [`QuestionBank`], and a built-in [`StaticSource`] for offline play and
//! tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::model::Difficulty;

#[cfg(feature = "opentdb")]
pub mod opentdb;

/// Shorthand for question supply results.
pub type QuestionResult<T> = Result<T, QuestionError>;

/// Why the question supply could not produce questions.
#[derive(Debug, Error)]
pub enum QuestionError {
    /// The supply has nothing left for the requested category and difficulty.
    #[error("the question supply is exhausted")]
    Empty,
    /// The question service answered with a non-success status.
    #[error("question service responded with status {status}")]
    Status {
        /// HTTP status code returned upstream.
        status: u16,
    },
    /// Reaching or decoding the question service failed.
    #[error("question service request failed while {message}")]
    Upstream {
        /// What the request was doing when it failed.
        message: String,
        /// Underlying transport or decode error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl QuestionError {
    /// Wrap a transport or decode failure with what was being attempted.
    pub fn upstream(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Upstream {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

/// One playable question with its options already shuffled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Prompt shown to every player.
    pub question: String,
    /// All selectable options, correct one included, in display order.
    pub options: Vec<String>,
    /// The correct option, verbatim.
    pub answer: String,
    /// Display name of the category this came from.
    pub category: String,
}

impl Question {
    /// Build a question from its answer and decoys, shuffling the options
    /// once so every participant sees the same order.
    pub fn assemble(
        question: impl Into<String>,
        answer: impl Into<String>,
        decoys: Vec<String>,
        category: impl Into<String>,
    ) -> Self {
        let answer = answer.into();
        let mut options = decoys;
        options.push(answer.clone());
        options.shuffle(&mut rand::rng());
        Self {
            question: question.into(),
            options,
            answer,
            category: category.into(),
        }
    }
}

/// Where questions come from.
pub trait QuestionSource: Send + Sync {
    /// Fetch up to `count` questions for a category and difficulty.
    fn fetch(
        &self,
        category_id: u32,
        difficulty: Difficulty,
        count: u8,
    ) -> BoxFuture<'static, QuestionResult<Vec<Question>>>;
}

/// Prefetching queue in front of a [`QuestionSource`].
///
/// The host's driver drains it one question per round; when the queue runs
/// dry, [`QuestionBank::next`] fetches a fresh batch inline.
pub struct QuestionBank {
    source: Arc<dyn QuestionSource>,
    category_id: u32,
    difficulty: Difficulty,
    batch: u8,
    queue: Mutex<VecDeque<Question>>,
}

impl QuestionBank {
    /// Create a bank drawing `batch` questions at a time from `source`.
    pub fn new(
        source: Arc<dyn QuestionSource>,
        category_id: u32,
        difficulty: Difficulty,
        batch: u8,
    ) -> Self {
        Self {
            source,
            category_id,
            difficulty,
            batch,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Fetch one batch ahead of need. Resolves to how many questions arrived.
    pub async fn prefetch(&self) -> QuestionResult<usize> {
        let fetched = self
            .source
            .fetch(self.category_id, self.difficulty, self.batch)
            .await?;
        let mut queue = self.queue.lock().await;
        let added = fetched.len();
        queue.extend(fetched);
        Ok(added)
    }

    /// Take the next question, fetching a batch inline when the queue is dry.
    pub async fn next(&self) -> QuestionResult<Question> {
        let mut queue = self.queue.lock().await;
        if let Some(question) = queue.pop_front() {
            return Ok(question);
        }
        let fetched = self
            .source
            .fetch(self.category_id, self.difficulty, self.batch)
            .await?;
        queue.extend(fetched);
        queue.pop_front().ok_or(QuestionError::Empty)
    }

    /// How many questions are queued right now.
    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }
}

/// Fixed question list served in rotation, options reshuffled per serving.
///
/// Ignores the requested category and difficulty. Repeats are possible once
/// the rotation wraps.
pub struct StaticSource {
    items: Vec<Question>,
    cursor: AtomicUsize,
}

impl StaticSource {
    /// Serve exactly these questions, in order, wrapping around.
    pub fn new(items: Vec<Question>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A small built-in set, enough to demo a game without network access.
    pub fn sample() -> Self {
        Self::new(vec![
            Question::assemble(
                "What is the capital of France?",
                "Paris",
                vec!["Lyon".into(), "Marseille".into(), "Nice".into()],
                "Geography",
            ),
            Question::assemble(
                "Which planet is known as the Red Planet?",
                "Mars",
                vec!["Venus".into(), "Jupiter".into(), "Mercury".into()],
                "Science & Nature",
            ),
            Question::assemble(
                "How many sides does a hexagon have?",
                "Six",
                vec!["Five".into(), "Seven".into(), "Eight".into()],
                "Math",
            ),
            Question::assemble(
                "Who painted the Mona Lisa?",
                "Leonardo da Vinci",
                vec![
                    "Michelangelo".into(),
                    "Raphael".into(),
                    "Claude Monet".into(),
                ],
                "General Knowledge",
            ),
            Question::assemble(
                "In which year did the Apollo 11 mission land on the Moon?",
                "1969",
                vec!["1965".into(), "1971".into(), "1958".into()],
                "History",
            ),
            Question::assemble(
                "Which country hosted the first modern Olympic Games?",
                "Greece",
                vec!["France".into(), "Italy".into(), "England".into()],
                "Sports",
            ),
        ])
    }
}

impl QuestionSource for StaticSource {
    fn fetch(
        &self,
        _category_id: u32,
        _difficulty: Difficulty,
        count: u8,
    ) -> BoxFuture<'static, QuestionResult<Vec<Question>>> {
        if self.items.is_empty() {
            return Box::pin(async { Err(QuestionError::Empty) });
        }
        let start = self.cursor.fetch_add(count as usize, Ordering::Relaxed);
        let picked: Vec<Question> = (0..count as usize)
            .map(|offset| {
                let mut question = self.items[(start + offset) % self.items.len()].clone();
                question.options.shuffle(&mut rand::rng());
                question
            })
            .collect();
        Box::pin(async move { Ok(picked) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(source: StaticSource, batch: u8) -> QuestionBank {
        QuestionBank::new(Arc::new(source), 9, Difficulty::Easy, batch)
    }

    #[test]
    fn assemble_keeps_the_answer_among_the_options() {
        let question = Question::assemble(
            "Largest ocean?",
            "Pacific",
            vec!["Atlantic".into(), "Indian".into(), "Arctic".into()],
            "Geography",
        );
        assert_eq!(question.options.len(), 4);
        assert!(question.options.contains(&question.answer));
    }

    #[tokio::test]
    async fn bank_serves_prefetched_questions_in_order() {
        let bank = tiny(StaticSource::sample(), 3);
        assert_eq!(bank.prefetch().await.unwrap(), 3);
        assert_eq!(bank.queued().await, 3);

        let first = bank.next().await.unwrap();
        assert_eq!(first.answer, "Paris");
        let second = bank.next().await.unwrap();
        assert_eq!(second.answer, "Mars");
        assert_eq!(bank.queued().await, 1);
    }

    #[tokio::test]
    async fn dry_bank_fetches_inline_and_rotation_wraps() {
        let source = StaticSource::new(vec![
            Question::assemble("A?", "a", vec!["x".into()], "General Knowledge"),
            Question::assemble("B?", "b", vec!["y".into()], "General Knowledge"),
        ]);
        let bank = tiny(source, 2);

        assert_eq!(bank.next().await.unwrap().answer, "a");
        assert_eq!(bank.next().await.unwrap().answer, "b");
        // second inline fetch wraps back to the start of the rotation
        assert_eq!(bank.next().await.unwrap().answer, "a");
    }

    #[tokio::test]
    async fn empty_source_reports_exhaustion() {
        let bank = tiny(StaticSource::new(Vec::new()), 4);
        assert!(matches!(bank.next().await, Err(QuestionError::Empty)));
        assert!(matches!(bank.prefetch().await, Err(QuestionError::Empty)));
    }

    #[tokio::test]
    async fn source_failures_propagate() {
        struct Failing;
        impl QuestionSource for Failing {
            fn fetch(
                &self,
                _category_id: u32,
                _difficulty: Difficulty,
                _count: u8,
            ) -> BoxFuture<'static, QuestionResult<Vec<Question>>> {
                Box::pin(async { Err(QuestionError::Status { status: 503 }) })
            }
        }

        let bank = QuestionBank::new(Arc::new(Failing), 9, Difficulty::Hard, 6);
        assert!(matches!(
            bank.next().await,
            Err(QuestionError::Status { status: 503 })
        ));
    }
}
