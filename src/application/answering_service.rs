use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

use super::prompt::{build_messages, condense_messages};
use super::sessions::SessionStore;
use crate::domain::answering::AnsweringService;
use crate::domain::providers::{LanguageModel, TextEmbedder};
use crate::domain::vector_repository::VectorRepository;
use crate::error::{CounselError, CounselResult};

/// Retrieval-augmented answering over the admissions knowledge base.
pub struct AnsweringServiceImpl {
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorRepository>,
    llm: Arc<dyn LanguageModel>,
    sessions: Arc<SessionStore>,
    system_prompt: String,
    top_k: usize,
}

impl AnsweringServiceImpl {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        store: Arc<dyn VectorRepository>,
        llm: Arc<dyn LanguageModel>,
        sessions: Arc<SessionStore>,
        system_prompt: String,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            sessions,
            system_prompt,
            top_k,
        }
    }

    /// Rewrites a follow-up into a standalone question. Falls back to the
    /// original query when the model returns nothing usable.
    async fn condense(&self, history: &str, query: &str) -> CounselResult<String> {
        let condensed = self.llm.complete(&condense_messages(history, query)).await?;
        let condensed = condensed.trim();
        if condensed.is_empty() {
            return Ok(query.to_string());
        }
        debug!("Condensed {:?} into {:?}", query, condensed);
        Ok(condensed.to_string())
    }
}

#[async_trait]
impl AnsweringService for AnsweringServiceImpl {
    async fn answer(&self, session_id: &str, query: &str) -> CounselResult<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CounselError::Validation("No query provided".to_string()));
        }

        // Held until the turn is recorded
        let session = self.sessions.session(session_id);
        let mut memory = session.lock().await;

        // Follow-ups are rewritten into standalone questions for retrieval
        let search_text = if memory.is_empty() {
            query.to_string()
        } else {
            self.condense(&memory.history_text(), query).await?
        };

        let vector = self.embedder.embed_one(&search_text).await?;
        let chunks = self.store.query(vector, self.top_k).await?;
        info!("Session {:?}: retrieved {} chunks", session_id, chunks.len());

        let messages = build_messages(&self.system_prompt, &chunks, memory.messages(), query);
        let reply = self.llm.complete(&messages).await?;

        memory.record_turn(query, &reply, self.llm.as_ref()).await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{ChatMessage, Role};
    use crate::domain::document::{EmbeddedChunk, RetrievedChunk};
    use assert_matches::assert_matches;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct MockEmbedder {
        inputs: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TextEmbedder for MockEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, texts: Vec<String>) -> CounselResult<Vec<Vec<f32>>> {
            self.inputs.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    #[derive(Clone, Default)]
    struct MockVectorRepository {
        results: Arc<Mutex<Vec<RetrievedChunk>>>,
        fail: Arc<Mutex<bool>>,
        queries: Arc<Mutex<Vec<usize>>>,
    }

    impl MockVectorRepository {
        fn set_results(&self, results: Vec<RetrievedChunk>) {
            *self.results.lock().unwrap() = results;
        }

        fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl VectorRepository for MockVectorRepository {
        async fn ensure_collection(&self) -> CounselResult<()> {
            Ok(())
        }

        async fn upsert(&self, _chunks: &[EmbeddedChunk]) -> CounselResult<()> {
            Ok(())
        }

        async fn query(&self, _vector: Vec<f32>, k: usize) -> CounselResult<Vec<RetrievedChunk>> {
            self.queries.lock().unwrap().push(k);
            if *self.fail.lock().unwrap() {
                return Err(CounselError::StoreUnavailable("vector store query failed".to_string()));
            }
            Ok(self.results.lock().unwrap().clone())
        }

        async fn count(&self) -> CounselResult<u64> {
            Ok(self.results.lock().unwrap().len() as u64)
        }
    }

    /// Replies with canned answers in order; an exhausted queue is an
    /// upstream failure.
    #[derive(Clone, Default)]
    struct MockLanguageModel {
        replies: Arc<Mutex<Vec<String>>>,
        calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl MockLanguageModel {
        fn with_replies(replies: &[&str]) -> Self {
            let model = Self::default();
            *model.replies.lock().unwrap() = replies.iter().rev().map(|r| r.to_string()).collect();
            model
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for MockLanguageModel {
        async fn complete(&self, messages: &[ChatMessage]) -> CounselResult<String> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| CounselError::Upstream("language model request failed (HTTP 500)".to_string()))
        }
    }

    struct Fixture {
        service: AnsweringServiceImpl,
        embedder: MockEmbedder,
        store: MockVectorRepository,
        llm: MockLanguageModel,
        sessions: Arc<SessionStore>,
    }

    fn fixture(llm: MockLanguageModel) -> Fixture {
        let embedder = MockEmbedder::default();
        let store = MockVectorRepository::default();
        let sessions = Arc::new(SessionStore::new(1024, Duration::from_secs(3600), 100));
        let service = AnsweringServiceImpl::new(
            Arc::new(embedder.clone()),
            Arc::new(store.clone()),
            Arc::new(llm.clone()),
            sessions.clone(),
            "You are the SVECW admissions assistant. For more details, please visit the official SVECW website: https://svecw.edu.in/".to_string(),
            2,
        );
        Fixture { service, embedder, store, llm, sessions }
    }

    fn cse_chunk() -> RetrievedChunk {
        RetrievedChunk {
            text: "CSE (Computer Science and Engineering) - 120 seats".to_string(),
            source: "grouped_data.xlsx".to_string(),
            page: Some(1),
            section: None,
            score: 0.88,
        }
    }

    #[tokio::test]
    async fn test_answer_puts_retrieved_chunk_in_prompt() {
        let f = fixture(MockLanguageModel::with_replies(&["CSE has 120 seats."]));
        f.store.set_results(vec![cse_chunk()]);

        let reply = f.service.answer("default", "What is the seat intake for CSE?").await.unwrap();
        assert_eq!(reply, "CSE has 120 seats.");

        let calls = f.llm.calls();
        assert_eq!(calls.len(), 1, "no condense call without history");
        let prompt = &calls[0];
        assert_eq!(prompt[0].role, Role::System);
        assert!(prompt[0].content.contains("CSE (Computer Science and Engineering) - 120 seats"));
        assert_eq!(prompt.last().unwrap(), &ChatMessage::user("What is the seat intake for CSE?"));
        assert_eq!(*f.store.queries.lock().unwrap(), vec![2]);
        assert_eq!(*f.embedder.inputs.lock().unwrap(), vec!["What is the seat intake for CSE?".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_retrieval_still_calls_model() {
        let f = fixture(MockLanguageModel::with_replies(&[
            "For more details, please visit the official SVECW website: https://svecw.edu.in/",
        ]));

        let reply = f.service.answer("default", "What scholarships are available?").await.unwrap();
        assert!(reply.contains("https://svecw.edu.in/"));
        assert_eq!(f.llm.calls().len(), 1);
        assert!(f.llm.calls()[0][0].content.contains("https://svecw.edu.in/"));
    }

    #[tokio::test]
    async fn test_follow_up_is_condensed_and_memory_included() {
        let f = fixture(MockLanguageModel::with_replies(&[
            "CSE has 120 seats.",
            "How many seats does the IT branch have?",
            "IT has 120 seats.",
        ]));
        f.store.set_results(vec![cse_chunk()]);

        f.service.answer("s1", "Seats in CSE?").await.unwrap();
        let reply = f.service.answer("s1", "And IT?").await.unwrap();
        assert_eq!(reply, "IT has 120 seats.");

        let inputs = f.embedder.inputs.lock().unwrap().clone();
        assert_eq!(inputs[1], "How many seats does the IT branch have?");

        let calls = f.llm.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1][1].content.contains("user: Seats in CSE?"));
        let final_prompt = &calls[2];
        assert_eq!(final_prompt[1], ChatMessage::user("Seats in CSE?"));
        assert_eq!(final_prompt[2], ChatMessage::assistant("CSE has 120 seats."));
        assert_eq!(final_prompt[3], ChatMessage::user("And IT?"));
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_memory() {
        let f = fixture(MockLanguageModel::with_replies(&["first", "second"]));
        f.service.answer("alice", "Hostel facilities?").await.unwrap();
        f.service.answer("bob", "Placements?").await.unwrap();

        let calls = f.llm.calls();
        assert_eq!(calls.len(), 2, "bob's first question needs no condensing");
        assert_eq!(calls[1].len(), 2);
        assert_eq!(f.sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_memory_unchanged() {
        let f = fixture(MockLanguageModel::with_replies(&["unused"]));
        f.store.set_failing(true);

        let err = f.service.answer("default", "Seats in CSE?").await.unwrap_err();
        assert_matches!(err, CounselError::StoreUnavailable(_));
        assert!(f.llm.calls().is_empty());
        assert!(f.sessions.session("default").lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_leaves_memory_unchanged() {
        let f = fixture(MockLanguageModel::default());

        let err = f.service.answer("default", "Seats in CSE?").await.unwrap_err();
        assert_matches!(err, CounselError::Upstream(_));
        assert!(f.sessions.session("default").lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_before_any_call() {
        let f = fixture(MockLanguageModel::with_replies(&["unused"]));

        let err = f.service.answer("default", "   ").await.unwrap_err();
        assert_eq!(err, CounselError::Validation("No query provided".to_string()));
        assert!(f.llm.calls().is_empty());
        assert!(f.embedder.inputs.lock().unwrap().is_empty());
        assert!(f.sessions.is_empty());
    }
}
