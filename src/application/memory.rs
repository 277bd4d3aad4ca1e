//! Bounded conversation memory.
//!
//! Recent turns are kept verbatim. When the memory outgrows its token limit
//! the oldest turns are folded into a running summary, written by the
//! language model when it is reachable and extracted from the evicted text
//! when it is not. The estimated size of [`ConversationMemory::messages`]
//! never exceeds the limit.

use std::collections::VecDeque;

use super::tokens::{estimate_token_count, tail_within_tokens, truncate_to_tokens};
use crate::domain::conversation::{ChatMessage, Role};
use crate::domain::providers::LanguageModel;

pub const SUMMARIZE_PROMPT: &str = "You maintain the memory of a conversation between a student and a college admissions assistant. \
Summarize the conversation below in a few sentences. Keep names, branches, numbers and any facts the student shared about themselves. \
Reply with the summary only.";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Turn {
    user: String,
    assistant: String,
}

impl Turn {
    fn tokens(&self) -> usize {
        estimate_token_count(&self.user) + estimate_token_count(&self.assistant)
    }
}

fn tokens_of(turns: &VecDeque<Turn>) -> usize {
    turns.iter().map(Turn::tokens).sum()
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    token_limit: usize,
    summary: Option<String>,
    turns: VecDeque<Turn>,
}

impl ConversationMemory {
    pub fn new(token_limit: usize) -> Self {
        Self {
            token_limit,
            summary: None,
            turns: VecDeque::new(),
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.turns.is_empty()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// The memory as chat messages: the summary first (as a system message),
    /// then the retained turns oldest to newest.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() * 2 + 1);
        if let Some(summary) = &self.summary {
            messages.push(ChatMessage::system(summary.clone()));
        }
        for turn in &self.turns {
            messages.push(ChatMessage::user(turn.user.clone()));
            messages.push(ChatMessage::assistant(turn.assistant.clone()));
        }
        messages
    }

    /// Plain-text transcript used when condensing follow-up questions.
    pub fn history_text(&self) -> String {
        self.messages()
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::System => "summary",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn token_count(&self) -> usize {
        self.summary.as_deref().map_or(0, estimate_token_count) + self.turns_tokens()
    }

    fn turns_tokens(&self) -> usize {
        tokens_of(&self.turns)
    }

    /// Appends a completed exchange, compacting older turns when the limit
    /// is exceeded. Never fails: a summarizer error falls back to keeping
    /// the most recent evicted text.
    ///
    /// Nothing is written until the summary is ready, so dropping the
    /// future part-way leaves the memory as it was.
    pub async fn record_turn(&mut self, user: &str, reply: &str, summarizer: &dyn LanguageModel) {
        let mut turns = self.turns.clone();
        turns.push_back(Turn {
            user: user.to_string(),
            assistant: reply.to_string(),
        });
        let summary_tokens = self.summary.as_deref().map_or(0, estimate_token_count);
        if summary_tokens + tokens_of(&turns) <= self.token_limit {
            self.turns = turns;
            return;
        }

        // Evict whole turns, oldest first, down to three quarters of the limit
        let target = self.token_limit - self.token_limit / 4;
        let mut evicted = Vec::new();
        while turns.len() > 1 && tokens_of(&turns) > target {
            if let Some(turn) = turns.pop_front() {
                evicted.push(turn);
            }
        }
        if tokens_of(&turns) > self.token_limit {
            // The newest turn alone does not fit.
            evicted.extend(turns.drain(..));
        }

        let budget = self.token_limit - tokens_of(&turns);
        let transcript = self.transcript_of(&evicted);
        log::debug!(
            "Compacting {} turns into summary (budget {} tokens)",
            evicted.len(),
            budget
        );

        let summary = if budget == 0 {
            String::new()
        } else {
            match summarizer.complete(&Self::summary_request(&transcript)).await {
                Ok(summary) => truncate_to_tokens(summary.trim(), budget),
                Err(e) => {
                    log::warn!("Conversation summary failed, keeping recent text instead: {}", e);
                    tail_within_tokens(&transcript, budget)
                }
            }
        };

        // Commit turns and summary together
        self.turns = turns;
        self.summary = (!summary.is_empty()).then_some(summary);
    }

    fn transcript_of(&self, evicted: &[Turn]) -> String {
        let mut lines = Vec::with_capacity(evicted.len() * 2 + 1);
        if let Some(summary) = &self.summary {
            lines.push(format!("summary: {}", summary));
        }
        for turn in evicted {
            lines.push(format!("user: {}", turn.user));
            lines.push(format!("assistant: {}", turn.assistant));
        }
        lines.join("\n")
    }

    fn summary_request(transcript: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system(SUMMARIZE_PROMPT), ChatMessage::user(transcript)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CounselError, CounselResult};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockSummarizer {
        reply: Option<String>,
        calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl MockSummarizer {
        fn replying(reply: &str) -> Self {
            Self { reply: Some(reply.to_string()), ..Default::default() }
        }

        fn failing() -> Self {
            Self::default()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for MockSummarizer {
        async fn complete(&self, messages: &[ChatMessage]) -> CounselResult<String> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.reply
                .clone()
                .ok_or_else(|| CounselError::Upstream("language model request failed (HTTP 503)".to_string()))
        }
    }

    /// Never answers, like a summary call stuck until the request times out.
    struct StalledSummarizer;

    #[async_trait]
    impl LanguageModel for StalledSummarizer {
        async fn complete(&self, _messages: &[ChatMessage]) -> CounselResult<String> {
            std::future::pending::<CounselResult<String>>().await
        }
    }

    fn long_turn(i: usize) -> (String, String) {
        (
            format!("Question {} about the seat matrix and closing ranks for the CSE branch?", i),
            format!("Answer {}: CSE has 120 seats and the closing rank varies by category and round.", i),
        )
    }

    #[tokio::test]
    async fn test_small_history_is_kept_verbatim() {
        let summarizer = MockSummarizer::replying("unused");
        let mut memory = ConversationMemory::new(1024);
        assert!(memory.is_empty());

        memory.record_turn("How many seats in CSE?", "CSE has 120 seats.", &summarizer).await;

        assert_eq!(
            memory.messages(),
            vec![ChatMessage::user("How many seats in CSE?"), ChatMessage::assistant("CSE has 120 seats.")]
        );
        assert_eq!(summarizer.call_count(), 0);
        assert_eq!(memory.history_text(), "user: How many seats in CSE?\nassistant: CSE has 120 seats.");
    }

    #[tokio::test]
    async fn test_budget_holds_over_many_turns() {
        let summarizer = MockSummarizer::replying("The student asked repeatedly about CSE seats and ranks.");
        let mut memory = ConversationMemory::new(120);
        for i in 0..30 {
            let (user, reply) = long_turn(i);
            memory.record_turn(&user, &reply, &summarizer).await;
            assert!(memory.token_count() <= 120, "turn {} exceeded budget: {}", i, memory.token_count());
        }
        assert!(summarizer.call_count() > 0);
        assert_eq!(memory.summary(), Some("The student asked repeatedly about CSE seats and ranks."));
        assert_eq!(memory.messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_failing_summarizer_still_respects_budget() {
        let summarizer = MockSummarizer::failing();
        let mut memory = ConversationMemory::new(100);
        for i in 0..20 {
            let (user, reply) = long_turn(i);
            memory.record_turn(&user, &reply, &summarizer).await;
            assert!(memory.token_count() <= 100);
        }
        let summary = memory.summary().expect("fallback summary");
        assert!(!summary.is_empty());
    }

    #[tokio::test]
    async fn test_most_recent_turn_stays_verbatim() {
        let summarizer = MockSummarizer::replying("Earlier questions covered CSE.");
        let mut memory = ConversationMemory::new(80);
        for i in 0..10 {
            let (user, reply) = long_turn(i);
            memory.record_turn(&user, &reply, &summarizer).await;
        }
        let (user, reply) = long_turn(9);
        let messages = memory.messages();
        let n = messages.len();
        assert_eq!(messages[n - 2], ChatMessage::user(user));
        assert_eq!(messages[n - 1], ChatMessage::assistant(reply));
    }

    #[tokio::test]
    async fn test_summary_request_includes_previous_summary() {
        let summarizer = MockSummarizer::replying("S1");
        let mut memory = ConversationMemory::new(60);
        for i in 0..6 {
            let (user, reply) = long_turn(i);
            memory.record_turn(&user, &reply, &summarizer).await;
        }
        let calls = summarizer.calls.lock().unwrap();
        assert!(calls.len() >= 2);
        let last = calls.last().unwrap();
        assert_eq!(last[0].content, SUMMARIZE_PROMPT);
        assert!(last[1].content.starts_with("summary: S1"));
    }

    #[tokio::test]
    async fn test_oversized_single_turn_is_summarized() {
        let summarizer = MockSummarizer::failing();
        let mut memory = ConversationMemory::new(20);
        let huge = vec!["hostel"; 200].join(" ");
        memory.record_turn(&huge, "ok", &summarizer).await;
        assert!(memory.token_count() <= 20);
        assert!(memory.messages().iter().all(|m| m.role == Role::System));
    }

    #[tokio::test]
    async fn test_cancelled_compaction_leaves_memory_unchanged() {
        let mut memory = ConversationMemory::new(100);
        let summarizer = MockSummarizer::replying(&vec!["seats"; 40].join(" "));
        for i in 0..3 {
            let (user, reply) = long_turn(i);
            memory.record_turn(&user, &reply, &summarizer).await;
        }
        assert!(memory.summary().is_some());
        let before = memory.messages();

        // This turn needs compaction, and the summary call never returns
        let (user, reply) = long_turn(3);
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            memory.record_turn(&user, &reply, &StalledSummarizer),
        )
        .await;

        assert!(result.is_err(), "record_turn should still be waiting on the summary");
        assert_eq!(memory.messages(), before);
        assert!(memory.token_count() <= memory.token_limit());
    }
}
