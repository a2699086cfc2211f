//! Client for the language-model service that turns retrieved context into
//! tutor answers.
//!
//! The service takes `{"prompt", "action", "max_tokens"}` as JSON and answers
//! with `{"response": "..."}`. Every failure (unreachable host, non-2xx
//! status, timeout, malformed body) becomes a [`Fallback`] carrying a fixed
//! message for the requested action.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::Settings,
    corpus::{Corpus, DEFAULT_TOP_K},
    error::{Error, Result},
};

/// Token budget sent with every request.
pub const MAX_TOKENS: u32 = 500;

/// Reply used when the service answers without a `response` field.
pub const MISSING_RESPONSE_REPLY: &str =
    "I apologize, but I couldn't process your request.";

/// What the model is told to say when the materials do not cover a topic.
pub const NOT_COVERED_REPLY: &str = "This topic is not covered in our current course materials. Please consult your instructor.";

/// Passages retrieved for hints and essay grading.
pub const HINT_TOP_K: usize = 2;

/// The kind of request sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Explain,
    Hint,
    Evaluate,
    Chat,
    /// Any other action tag the service understands.
    Custom(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Explain => "explain",
            Self::Hint => "hint",
            Self::Evaluate => "evaluate",
            Self::Chat => "chat",
            Self::Custom(tag) => tag,
        }
    }

    /// Static reply returned when a request for this action fails.
    pub fn fallback(&self) -> &'static str {
        match self {
            Self::Explain => {
                "I'm currently unavailable for explanations. Please consult your textbook or ask your instructor."
            }
            Self::Hint => {
                "Try to recall the main concepts from this topic. Review the related chapter in your textbook."
            }
            Self::Evaluate => {
                "Evaluation service is temporarily unavailable. Compare your answer with your textbook content."
            }
            Self::Chat => {
                "I'm currently unavailable. Please check your textbook or other learning resources."
            }
            Self::Custom(_) => "Service temporarily unavailable.",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed completion: the action's static reply plus what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{action} request failed: {cause}")]
pub struct Fallback {
    pub action: Action,
    pub cause: String,
}

impl Fallback {
    pub fn message(&self) -> &'static str {
        self.action.fallback()
    }
}

/// The model's reply, or the fallback to show instead.
pub type Completion = std::result::Result<String, Fallback>;

/// Collapse a [`Completion`] into the text to show the reader.
pub fn reply_text(completion: Completion) -> String {
    completion.unwrap_or_else(|fallback| fallback.message().to_string())
}

/// A multiple-choice question as shown to the student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// The correct option, as its letter or text.
    pub correct: String,
}

/// Grade and feedback for a short written answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0 to 5: accuracy (2), completeness (2), terminology (1).
    pub score: u8,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub explanation: String,
    pub suggestion: String,
}

impl Evaluation {
    /// Neutral grade used when the service is down or its reply is not a
    /// valid evaluation.
    pub fn fallback() -> Self {
        Self {
            score: 3,
            strengths: vec!["Answer submitted successfully".to_string()],
            improvements: vec![
                "Compare with textbook content for accuracy".to_string(),
            ],
            explanation: "Review the key concepts in your textbook".to_string(),
            suggestion: "Focus on understanding the core principles from the materials"
                .to_string(),
        }
    }

    /// Parse the service's reply, tolerating prose around the JSON object.
    fn parse(reply: &str) -> Option<Self> {
        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        let evaluation: Self =
            serde_json::from_str(reply.get(start..=end)?).ok()?;
        (evaluation.score <= 5).then_some(evaluation)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    action: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    response: Option<String>,
}

/// Blocking HTTP client for the language-model service.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    url: String,
    agent: ureq::Agent,
}

impl AssistantClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            url: url.into(),
            agent,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ai_url.clone(), settings.ai_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `prompt` tagged with `action`.
    pub fn complete(&self, prompt: &str, action: &Action) -> Completion {
        self.request(prompt, action).map_err(|e| {
            warn!(action = %action, error = %e, "language model unavailable, using fallback");
            Fallback {
                action: action.clone(),
                cause: e.to_string(),
            }
        })
    }

    fn request(&self, prompt: &str, action: &Action) -> Result<String> {
        let request_json = serde_json::to_string(&CompletionRequest {
            prompt,
            action: action.as_str(),
            max_tokens: MAX_TOKENS,
        })?;

        debug!(url = %self.url, action = %action, "calling language model");
        let response_text = self
            .agent
            .post(self.url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| Error::RemoteService(e.to_string()))?;

        let response: CompletionResponse = serde_json::from_str(&response_text)
            .map_err(|e| {
                Error::RemoteService(format!("malformed response body: {e}"))
            })?;

        Ok(response
            .response
            .unwrap_or_else(|| MISSING_RESPONSE_REPLY.to_string()))
    }
}

/// Answers questions from a corpus, grounding the model in retrieved
/// passages.
#[derive(Debug, Clone, Copy)]
pub struct Tutor<'a> {
    corpus: &'a Corpus,
    client: &'a AssistantClient,
}

impl<'a> Tutor<'a> {
    pub fn new(corpus: &'a Corpus, client: &'a AssistantClient) -> Self {
        Self { corpus, client }
    }

    /// Answer `question` about `subject`, given the conversation so far.
    ///
    /// Retrieval runs before the remote call, so no corpus lock is held
    /// while waiting on the service.
    pub fn ask(
        &self,
        question: &str,
        conversation: &str,
        subject: &str,
    ) -> Completion {
        let context = self.corpus.get_context(question, subject, DEFAULT_TOP_K);
        let prompt = chat_prompt(question, conversation, &context);
        self.client.complete(&prompt, &Action::Chat)
    }

    /// Explain why `question`'s answer is correct, addressing the student's
    /// `request`.
    pub fn explain(
        &self,
        question: &QuizQuestion,
        request: &str,
        subject: &str,
    ) -> Completion {
        let query = format!("{} {request}", question.question);
        let context = self.corpus.get_context(&query, subject, DEFAULT_TOP_K);
        let prompt = explain_prompt(question, request, &context);
        self.client.complete(&prompt, &Action::Explain)
    }

    /// A hint toward `question`'s answer that does not give it away.
    pub fn hint(&self, question: &QuizQuestion, subject: &str) -> Completion {
        let context =
            self.corpus
                .get_context(&question.question, subject, HINT_TOP_K);
        let prompt = hint_prompt(&question.question, &context);
        self.client.complete(&prompt, &Action::Hint)
    }

    /// Grade a short written `answer` against `expected_points`.
    ///
    /// Never fails: an unreachable service or an unparseable reply yields
    /// [`Evaluation::fallback`].
    pub fn evaluate(
        &self,
        question: &str,
        answer: &str,
        subject: &str,
        expected_points: &[String],
    ) -> Evaluation {
        let query = format!("{question} evaluation criteria");
        let context = self.corpus.get_context(&query, subject, HINT_TOP_K);
        let prompt = evaluate_prompt(question, answer, expected_points, &context);

        match self.client.complete(&prompt, &Action::Evaluate) {
            Ok(reply) => Evaluation::parse(&reply).unwrap_or_else(|| {
                warn!("evaluation reply was not valid JSON, using fallback grade");
                Evaluation::fallback()
            }),
            Err(_) => Evaluation::fallback(),
        }
    }
}

fn option_label(position: usize) -> char {
    u8::try_from(position)
        .ok()
        .and_then(|p| p.checked_add(b'A'))
        .filter(u8::is_ascii_uppercase)
        .map_or('?', char::from)
}

fn explain_prompt(question: &QuizQuestion, request: &str, context: &str) -> String {
    let mut options = String::new();
    for (i, option) in question.options.iter().enumerate() {
        options.push_str(&format!("{}) {option}\n", option_label(i)));
    }
    format!(
        "You are a tutor. Use EXCLUSIVELY the course materials below as reference.\n\
         \n\
         QUESTION: {}\n\
         \n\
         OPTIONS:\n\
         {options}\
         \n\
         CORRECT ANSWER: {}\n\
         \n\
         STUDENT'S REQUEST: {request}\n\
         \n\
         COURSE MATERIALS CONTEXT:\n\
         {context}\n\
         \n\
         Base your explanation SOLELY on the course materials provided above. \
         Do not use any external knowledge.\n\
         Explain why the correct answer is right and why the other options \
         are wrong according to the materials, using their terminology and \
         citing pages when possible. Keep it concise.\n",
        question.question, question.correct
    )
}

fn hint_prompt(question: &str, context: &str) -> String {
    format!(
        "Give a helpful hint for this question based EXCLUSIVELY on the course materials.\n\
         \n\
         QUESTION: {question}\n\
         \n\
         COURSE CONTEXT:\n\
         {context}\n\
         \n\
         Use ONLY the materials provided above. Do not add external knowledge.\n\
         Point to the key concepts and relevant sections without giving away \
         the answer. Make it encouraging.\n"
    )
}

fn evaluate_prompt(
    question: &str,
    answer: &str,
    expected_points: &[String],
    context: &str,
) -> String {
    let expected = expected_points.join("; ");
    format!(
        "Evaluate this short answer based EXCLUSIVELY on the course materials.\n\
         \n\
         QUESTION: {question}\n\
         STUDENT ANSWER: {answer}\n\
         EXPECTED POINTS: {expected}\n\
         \n\
         GRADING CONTEXT:\n\
         {context}\n\
         \n\
         Use ONLY the materials above for evaluation.\n\
         Score accuracy (0-2 points), completeness covering the expected \
         points (0-2 points) and use of the materials' terminology (0-1 point).\n\
         \n\
         Reply with JSON only:\n\
         {{\"score\": 0-5, \"strengths\": [\"...\"], \"improvements\": [\"...\"], \
         \"explanation\": \"brief correct answer from the materials\", \
         \"suggestion\": \"how to improve\"}}\n"
    )
}

fn chat_prompt(question: &str, conversation: &str, context: &str) -> String {
    format!(
        "You are a tutor. Answer using EXCLUSIVELY the course materials below.\n\
         \n\
         STUDENT QUESTION: {question}\n\
         CONVERSATION CONTEXT: {conversation}\n\
         \n\
         COURSE MATERIALS CONTEXT:\n\
         {context}\n\
         \n\
         Base your answer SOLELY on the course materials provided above. \
         Do not use any external knowledge.\n\
         Use the terminology of the materials and mention the relevant \
         sources and pages when possible.\n\
         \n\
         If the information is not found in the course materials, say: \
         \"{NOT_COVERED_REPLY}\"\n"
    )
}
