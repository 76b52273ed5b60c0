//! Streaming chat orchestration: retrieve, prompt, generate, and multiplex the
//! generated fragments with the retrieval sources into one response stream.

use std::{panic::AssertUnwindSafe, pin::Pin, sync::Arc, time::Instant};

use async_stream::stream;
use common::{
    types::{
        chat::{EMPTY_QUERY_APOLOGY, GENERATION_FAILURE_APOLOGY},
        passage::rank_passages,
        ChatRequest, ChatResponseChunk, HistoryMessage, ScoredPassage, SourceDocument,
    },
    utils::config::AppConfig,
};
use futures::{FutureExt, Stream, StreamExt};
use generation::{GenerationProvider, GenerationRequest};
use retrieval_pipeline::RetrievalStore;
use state_machines::core::GuardError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::received;

/// Response stream of one chat call. Ends after the `is_final` chunk.
pub type ChatStream = Pin<Box<dyn Stream<Item = ChatResponseChunk> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatConfig {
    pub retrieval_limit: usize,
    /// Only the most recent messages are forwarded to the provider.
    pub max_history_messages: usize,
}

impl ChatConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            retrieval_limit: config.retrieval_limit.max(1),
            max_history_messages: config.max_history_messages,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<dyn RetrievalStore>,
    provider: Arc<dyn GenerationProvider>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn RetrievalStore>,
        provider: Arc<dyn GenerationProvider>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Answers `request` as a stream of fragments followed by one terminal chunk.
    ///
    /// Retrieval is best-effort: a store error is logged and generation runs
    /// with an empty context. A panic inside retrieval or generation ends the
    /// stream with a single apology chunk. Once `cancel` fires, or the returned
    /// stream is dropped, nothing further is emitted and the provider stream is
    /// released.
    pub fn chat(&self, request: ChatRequest, cancel: CancellationToken) -> ChatStream {
        let store = Arc::clone(&self.store);
        let provider = Arc::clone(&self.provider);
        let config = self.config;
        let started = Instant::now();

        Box::pin(stream! {
            let has_query = request.has_query();
            let ChatRequest { query, session_id, history } = request;
            let provider_name = provider.provider_name().to_string();
            let machine = received();

            if !has_query {
                let _errored = machine.fail();
                info!(%session_id, "rejected chat request with empty query");
                yield ChatResponseChunk::apology(EMPTY_QUERY_APOLOGY);
                return;
            }
            if cancel.is_cancelled() {
                let _errored = machine.fail();
                debug!(%session_id, "chat cancelled before start");
                return;
            }

            let machine = match machine
                .accept()
                .map_err(|(_, guard)| transition_failed("accept", &guard))
            {
                Ok(machine) => machine,
                Err(apology) => {
                    yield apology;
                    return;
                }
            };

            let search = AssertUnwindSafe(store.search(&query, config.retrieval_limit)).catch_unwind();
            let searched = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _errored = machine.fail();
                    debug!(%session_id, "chat cancelled during retrieval");
                    return;
                }
                searched = search => searched,
            };
            let passages = match searched {
                Ok(Ok(passages)) => rank_passages(passages, config.retrieval_limit),
                Ok(Err(err)) => {
                    warn!(%session_id, error = %err, "retrieval failed; answering without context");
                    Vec::new()
                }
                Err(_) => {
                    let _errored = machine.fail();
                    error!(%session_id, "retrieval panicked");
                    yield ChatResponseChunk::apology(GENERATION_FAILURE_APOLOGY);
                    return;
                }
            };
            debug!(%session_id, hits = passages.len(), "retrieval finished");

            let machine = match machine
                .generate()
                .map_err(|(_, guard)| transition_failed("generate", &guard))
            {
                Ok(machine) => machine,
                Err(apology) => {
                    yield apology;
                    return;
                }
            };

            let (sources, context_docs) = split_passages(passages);
            let generation_request = GenerationRequest::new(
                query,
                context_docs,
                recent_history(history, config.max_history_messages),
            );

            let opening = AssertUnwindSafe(provider.stream_generate(generation_request)).catch_unwind();
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _errored = machine.fail();
                    debug!(%session_id, "chat cancelled while opening generation");
                    return;
                }
                opened = opening => opened,
            };
            let mut fragments = match opened {
                Ok(fragments) => fragments,
                Err(_) => {
                    let _errored = machine.fail();
                    error!(%session_id, provider = %provider_name, "generation panicked before streaming");
                    yield ChatResponseChunk::apology(GENERATION_FAILURE_APOLOGY);
                    return;
                }
            };

            let machine = match machine
                .stream()
                .map_err(|(_, guard)| transition_failed("stream", &guard))
            {
                Ok(machine) => machine,
                Err(apology) => {
                    yield apology;
                    return;
                }
            };

            let mut fragment_count = 0usize;
            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        let _errored = machine.fail();
                        debug!(%session_id, fragment_count, "chat cancelled while streaming");
                        return;
                    }
                    next = AssertUnwindSafe(fragments.next()).catch_unwind() => next,
                };

                match next {
                    Ok(Some(fragment)) => {
                        if fragment.is_empty() {
                            continue;
                        }
                        fragment_count = fragment_count.saturating_add(1);
                        yield ChatResponseChunk::fragment(fragment);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        let _errored = machine.fail();
                        error!(%session_id, provider = %provider_name, fragment_count, "generation panicked mid-stream");
                        yield ChatResponseChunk::apology(GENERATION_FAILURE_APOLOGY);
                        return;
                    }
                }
            }
            drop(fragments);

            if cancel.is_cancelled() {
                let _errored = machine.fail();
                return;
            }

            let _completed = match machine
                .complete()
                .map_err(|(_, guard)| transition_failed("complete", &guard))
            {
                Ok(machine) => machine,
                Err(apology) => {
                    yield apology;
                    return;
                }
            };

            let elapsed = started.elapsed();
            info!(
                %session_id,
                provider = %provider_name,
                fragment_count,
                source_count = sources.len(),
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "chat completed"
            );
            yield ChatResponseChunk::terminal(sources, elapsed);
        })
    }
}

fn split_passages(passages: Vec<ScoredPassage>) -> (Vec<SourceDocument>, Vec<String>) {
    let sources = passages
        .iter()
        .map(ScoredPassage::to_source_document)
        .collect();
    let context_docs = passages.into_iter().map(|passage| passage.content).collect();
    (sources, context_docs)
}

fn recent_history(history: Vec<HistoryMessage>, max_messages: usize) -> Vec<HistoryMessage> {
    let skip = history.len().saturating_sub(max_messages);
    history.into_iter().skip(skip).collect()
}

fn transition_failed(event: &str, guard: &GuardError) -> ChatResponseChunk {
    error!(event, guard = ?guard, "invalid chat pipeline transition");
    ChatResponseChunk::apology(GENERATION_FAILURE_APOLOGY)
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, task::Poll, time::Duration};

    use async_trait::async_trait;
    use common::{
        error::AppError,
        types::{
            document::{METADATA_FILENAME, METADATA_PAGE},
            MessageRole,
        },
    };
    use futures::stream;
    use generation::{diagnostic_fragment, FragmentStream};
    use retrieval_pipeline::Metadata;
    use tokio::sync::Mutex;

    use super::*;

    enum SearchBehaviour {
        Hits(Vec<ScoredPassage>),
        Fail,
        Panic,
    }

    struct MockStore {
        behaviour: SearchBehaviour,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockStore {
        fn with_hits(hits: Vec<ScoredPassage>) -> Self {
            Self {
                behaviour: SearchBehaviour::Hits(hits),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                behaviour: SearchBehaviour::Fail,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn panicking() -> Self {
            Self {
                behaviour: SearchBehaviour::Panic,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RetrievalStore for MockStore {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<ScoredPassage>, AppError> {
            self.calls.lock().await.push("search");
            match &self.behaviour {
                SearchBehaviour::Hits(hits) => Ok(hits.clone()),
                SearchBehaviour::Fail => Err(AppError::InternalError("index offline".into())),
                SearchBehaviour::Panic => panic!("index exploded"),
            }
        }

        async fn upsert(
            &self,
            texts: Vec<String>,
            _metadatas: Vec<Metadata>,
        ) -> Result<usize, AppError> {
            self.calls.lock().await.push("upsert");
            Ok(texts.len())
        }
    }

    enum Script {
        Fragments(Vec<&'static str>),
        FailMidStream(Vec<&'static str>, &'static str),
        PanicMidStream(Vec<&'static str>),
        PanicOnOpen,
        Hang(Vec<&'static str>),
    }

    struct MockProvider {
        script: Script,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl MockProvider {
        fn new(script: Script) -> Self {
            Self {
                script,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    fn owned(fragments: &[&'static str]) -> Vec<String> {
        fragments.iter().map(ToString::to_string).collect()
    }

    #[async_trait]
    impl GenerationProvider for MockProvider {
        fn provider_name(&self) -> &str {
            "mock"
        }

        async fn stream_generate(&self, request: GenerationRequest) -> FragmentStream {
            self.requests.lock().await.push(request);
            match &self.script {
                Script::Fragments(fragments) => stream::iter(owned(fragments)).boxed(),
                Script::FailMidStream(fragments, cause) => stream::iter(owned(fragments))
                    .chain(stream::iter([diagnostic_fragment("mock", cause)]))
                    .boxed(),
                Script::PanicMidStream(fragments) => stream::iter(owned(fragments))
                    .chain(stream::poll_fn(|_| -> Poll<Option<String>> {
                        panic!("provider blew up")
                    }))
                    .boxed(),
                Script::PanicOnOpen => panic!("provider refused to start"),
                Script::Hang(fragments) => stream::iter(owned(fragments))
                    .chain(stream::pending())
                    .boxed(),
            }
        }
    }

    fn passage(filename: &str, page: u32, content: &str, score: f32) -> ScoredPassage {
        let metadata = BTreeMap::from([
            (METADATA_FILENAME.to_string(), filename.to_string()),
            (METADATA_PAGE.to_string(), page.to_string()),
        ]);
        ScoredPassage::new(content, metadata, score)
    }

    fn orchestrator(
        store: &Arc<MockStore>,
        provider: &Arc<MockProvider>,
        config: ChatConfig,
    ) -> ChatOrchestrator {
        let store: Arc<MockStore> = Arc::clone(store);
        let provider: Arc<MockProvider> = Arc::clone(provider);
        ChatOrchestrator::new(store, provider, config)
    }

    async fn collect(orchestrator: &ChatOrchestrator, request: ChatRequest) -> Vec<ChatResponseChunk> {
        orchestrator
            .chat(request, CancellationToken::new())
            .collect()
            .await
    }

    #[tokio::test]
    async fn streams_fragments_then_terminal_chunk_with_sources() {
        let store = Arc::new(MockStore::with_hits(vec![passage(
            "test.pdf",
            4,
            "X is located in the north wing.",
            0.95,
        )]));
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["Answer ", "part."])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("Where is X located?", "s-1")).await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], ChatResponseChunk::fragment("Answer "));
        assert_eq!(chunks[1], ChatResponseChunk::fragment("part."));

        let terminal = &chunks[2];
        assert!(terminal.is_final);
        assert!(terminal.answer.is_empty());
        assert!(terminal.processing_time_ms >= 0.0);
        assert_eq!(terminal.source_documents.len(), 1);
        assert_eq!(terminal.source_documents[0].filename, "test.pdf");
        assert_eq!(terminal.source_documents[0].page_number, 4);
        assert!((terminal.source_documents[0].score - 0.95).abs() < f32::EPSILON);

        let requests = provider.requests.lock().await;
        assert_eq!(requests[0].context_docs, ["X is located in the north wing."]);
        assert_eq!(requests[0].query, "Where is X located?");
    }

    #[tokio::test]
    async fn provider_failure_is_passed_through_before_terminal_chunk() {
        let store = Arc::new(MockStore::with_hits(Vec::new()));
        let provider = Arc::new(MockProvider::new(Script::FailMidStream(
            vec!["Partial "],
            "connection reset",
        )));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("question", "s-2")).await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].answer, "Partial ");
        assert!(chunks[1].answer.contains("Error generating response"));
        assert!(!chunks[1].is_final);
        assert!(chunks[2].is_final);
        assert_eq!(chunks.iter().filter(|chunk| chunk.is_final).count(), 1);
    }

    #[tokio::test]
    async fn empty_query_short_circuits_with_apology() {
        let store = Arc::new(MockStore::with_hits(Vec::new()));
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["unused"])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("   ", "s-3")).await;

        assert_eq!(chunks, [ChatResponseChunk::apology(EMPTY_QUERY_APOLOGY)]);
        assert_eq!(chunks[0].processing_time_ms, 0.0);
        assert!(store.calls.lock().await.is_empty());
        assert!(provider.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn retrieval_failure_falls_back_to_empty_context() {
        let store = Arc::new(MockStore::failing());
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["I do not know."])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("question", "s-4")).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].answer, "I do not know.");
        assert!(chunks[1].is_final);
        assert!(chunks[1].source_documents.is_empty());
        assert!(provider.requests.lock().await[0].context_docs.is_empty());
        assert_eq!(*store.calls.lock().await, ["search"]);
    }

    #[tokio::test]
    async fn retrieval_panic_ends_with_single_apology() {
        let store = Arc::new(MockStore::panicking());
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["unused"])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("question", "s-panic-1")).await;

        assert_eq!(chunks, [ChatResponseChunk::apology(GENERATION_FAILURE_APOLOGY)]);
        assert!(chunks[0].is_final);
        assert_eq!(chunks[0].processing_time_ms, 0.0);
        assert!(chunks[0].source_documents.is_empty());
        assert_eq!(*store.calls.lock().await, ["search"]);
        assert!(provider.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn generation_panic_while_opening_ends_with_single_apology() {
        let store = Arc::new(MockStore::with_hits(vec![passage("a.txt", 1, "a", 0.9)]));
        let provider = Arc::new(MockProvider::new(Script::PanicOnOpen));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("question", "s-panic-2")).await;

        assert_eq!(chunks, [ChatResponseChunk::apology(GENERATION_FAILURE_APOLOGY)]);
        assert!(chunks[0].is_final);
        assert_eq!(chunks[0].processing_time_ms, 0.0);
        assert!(chunks[0].source_documents.is_empty());
        assert_eq!(provider.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn processing_time_counts_from_the_chat_call() {
        let store = Arc::new(MockStore::with_hits(Vec::new()));
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["ok"])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let pending = orchestrator.chat(ChatRequest::new("question", "s-7"), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(25)).await;
        let chunks: Vec<ChatResponseChunk> = pending.collect().await;

        let terminal = chunks.last().expect("terminal chunk");
        assert!(terminal.is_final);
        assert!(terminal.processing_time_ms >= 25.0);
    }

    #[tokio::test]
    async fn sources_are_sorted_and_limited() {
        let store = Arc::new(MockStore::with_hits(vec![
            passage("c.txt", 1, "c", 0.20),
            passage("a.txt", 1, "a", 0.90),
            passage("e.txt", 1, "e", 0.10),
            passage("b.txt", 1, "b", 0.50),
            passage("d.txt", 1, "d", 0.70),
        ]));
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["ok"])));
        let orchestrator = orchestrator(
            &store,
            &provider,
            ChatConfig {
                retrieval_limit: 3,
                max_history_messages: 20,
            },
        );

        let chunks = collect(&orchestrator, ChatRequest::new("rank these", "s-5")).await;
        let terminal = chunks.last().expect("terminal chunk");

        let filenames: Vec<&str> = terminal
            .source_documents
            .iter()
            .map(|source| source.filename.as_str())
            .collect();
        assert_eq!(filenames, ["a.txt", "d.txt", "b.txt"]);
        assert_eq!(
            provider.requests.lock().await[0].context_docs,
            ["a", "d", "b"]
        );
    }

    #[tokio::test]
    async fn history_is_truncated_to_most_recent_messages() {
        let store = Arc::new(MockStore::with_hits(Vec::new()));
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["ok"])));
        let orchestrator = orchestrator(
            &store,
            &provider,
            ChatConfig {
                retrieval_limit: 3,
                max_history_messages: 4,
            },
        );
        let history = (0..10)
            .map(|i| {
                let role = if i % 2 == 0 {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                };
                HistoryMessage::new(role, format!("message {i}"))
            })
            .collect();

        collect(
            &orchestrator,
            ChatRequest::new("next", "s-6").with_history(history),
        )
        .await;

        let requests = provider.requests.lock().await;
        let forwarded: Vec<&str> = requests[0]
            .history
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(forwarded, ["message 6", "message 7", "message 8", "message 9"]);
    }

    #[tokio::test]
    async fn panic_during_streaming_yields_single_apology() {
        let store = Arc::new(MockStore::with_hits(vec![passage("a.txt", 1, "a", 0.9)]));
        let provider = Arc::new(MockProvider::new(Script::PanicMidStream(vec!["Hello "])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("question", "s-7")).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].answer, "Hello ");
        assert_eq!(chunks[1], ChatResponseChunk::apology(GENERATION_FAILURE_APOLOGY));
        assert_eq!(chunks[1].processing_time_ms, 0.0);
    }

    #[tokio::test]
    async fn cancellation_stops_the_stream_without_terminal_chunk() {
        let store = Arc::new(MockStore::with_hits(Vec::new()));
        let provider = Arc::new(MockProvider::new(Script::Hang(vec!["first"])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());
        let cancel = CancellationToken::new();

        let mut chunks = orchestrator.chat(ChatRequest::new("question", "s-8"), cancel.clone());
        let first = chunks.next().await.expect("first fragment");
        assert_eq!(first.answer, "first");

        cancel.cancel();
        let rest = tokio::time::timeout(Duration::from_secs(1), chunks.next())
            .await
            .expect("stream ends promptly after cancellation");
        assert!(rest.is_none());
    }

    #[tokio::test]
    async fn cancelled_before_start_does_no_work() {
        let store = Arc::new(MockStore::with_hits(Vec::new()));
        let provider = Arc::new(MockProvider::new(Script::Fragments(vec!["unused"])));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let chunks: Vec<ChatResponseChunk> = orchestrator
            .chat(ChatRequest::new("question", "s-9"), cancel)
            .collect()
            .await;

        assert!(chunks.is_empty());
        assert!(store.calls.lock().await.is_empty());
        assert!(provider.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn concatenated_fragments_reproduce_the_answer() {
        let parts = vec!["The ", "", "answer ", "is ", "42."];
        let store = Arc::new(MockStore::with_hits(Vec::new()));
        let provider = Arc::new(MockProvider::new(Script::Fragments(parts)));
        let orchestrator = orchestrator(&store, &provider, ChatConfig::default());

        let chunks = collect(&orchestrator, ChatRequest::new("question", "s-10")).await;

        let answer: String = chunks
            .iter()
            .filter(|chunk| !chunk.is_final)
            .map(|chunk| chunk.answer.as_str())
            .collect();
        assert_eq!(answer, "The answer is 42.");
        assert_eq!(chunks.iter().filter(|chunk| chunk.is_final).count(), 1);
    }
}
