//! End-to-end tests for engines and sessions
//!
//! These drive complete requests through the public API with a replayed
//! transcript standing in for a real model, so every assertion about chunk
//! boundaries and stop handling is deterministic.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;

use genstream_core::{
    config::ErrorPolicy,
    generation::FinishReason,
    model::{replay::ReplayModel, LanguageModel},
    tokenizer::{
        normalizer::UnicodeNormalizer,
        vocab::{VocabTokenizer, VocabularyBuilder},
        Tokenizer,
    },
    CoreError, Engine, ResponseContext, Result,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn letters_tokenizer() -> VocabTokenizer {
    let vocab = VocabularyBuilder::new()
        .set_bos_token("<s>")
        .add_tokens(('a'..='z').map(|c| c.to_string()))
        .add_tokens([" ", "."])
        .build();
    VocabTokenizer::new(vocab).with_dummy_prefix(false)
}

fn engine(transcript: &str, stops: &[&str], max_num_tokens: usize) -> Engine {
    engine_with_delay(transcript, stops, max_num_tokens, Duration::ZERO)
}

fn engine_with_delay(transcript: &str, stops: &[&str], max_num_tokens: usize, delay: Duration) -> Engine {
    init_tracing();
    let tokenizer = letters_tokenizer();
    let model = ReplayModel::from_text(&tokenizer, transcript)
        .unwrap()
        .with_step_delay(delay);
    Engine::builder()
        .tokenizer(tokenizer)
        .model(model)
        .start_token_id(0)
        .stop_sequences(stops.iter().map(|s| s.to_string()).collect())
        .max_num_tokens(max_num_tokens)
        .build()
        .unwrap()
}

fn collect_async(engine: &Engine, prompt: &str) -> Vec<ResponseContext> {
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let mut session = engine.create_session();
    let sink = Arc::clone(&chunks);
    session
        .predict_async(prompt, move |response| sink.lock().push(response))
        .unwrap();
    session.wait().unwrap();
    let chunks = chunks.lock().clone();
    chunks
}

/// A model that fails on a chosen decode step
struct FailingModel {
    fail_at: usize,
    steps: AtomicUsize,
}

impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn init_input_tokens(&self, _input_ids: &[u32]) -> Result<()> {
        self.steps.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn next_token(&self) -> Result<u32> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if step >= self.fail_at {
            return Err(CoreError::model(
                "MODEL_DECODE_FAILED",
                "Decode step failed",
                format!("Step {}", step),
                "Retry the request",
            ));
        }
        // 'a' in the letters vocabulary
        Ok(1)
    }
}

#[test]
fn test_async_chunks_reassemble_to_sync_output() {
    let text = "the quick brown fox jumps over the lazy dog.";
    let engine = engine(text, &[], text.len() + 1);

    let chunks = collect_async(&engine, "");
    let streamed: String = chunks.iter().map(|c| c.text()).collect();

    let mut session = engine.create_session();
    let sync = session.predict_sync("").unwrap();

    assert_eq!(streamed, text);
    assert_eq!(sync.text(), streamed);
    assert!(sync.is_done());
}

#[test]
fn test_exactly_one_final_chunk() {
    let engine = engine("hello world", &["wor"], 64);
    let chunks = collect_async(&engine, "");

    assert_eq!(chunks.iter().filter(|c| c.is_done()).count(), 1);
    assert!(chunks.last().unwrap().is_done());
    let text: String = chunks.iter().map(|c| c.text()).collect();
    assert_eq!(text, "hello ");
}

#[test]
fn test_first_listed_stop_sequence_wins() {
    let chunks = collect_async(&engine("xxfooyy", &["foo", "oo"], 64), "");
    let text: String = chunks.iter().map(|c| c.text()).collect();
    assert_eq!(text, "xx");

    let chunks = collect_async(&engine("xxfooyy", &["oo", "foo"], 64), "");
    let text: String = chunks.iter().map(|c| c.text()).collect();
    assert_eq!(text, "xxf");
}

#[test]
fn test_trailing_window_withholds_recent_text() {
    let engine = engine("abcdefghijklmnopqrstuvwxy", &["zz"], 26);
    let chunks = collect_async(&engine, "");

    // ten chars withheld: nothing until the eleventh token
    assert!(chunks[..10].iter().all(|c| c.text().is_empty()));
    assert_eq!(chunks[10].text(), "a");
}

#[test]
fn test_zero_budget_yields_single_empty_final_chunk() {
    // "abc" plus the start token fills the whole budget
    let engine = engine("zzz", &[], 4);
    let chunks = collect_async(&engine, "abc");
    assert_eq!(chunks, vec![ResponseContext::chunk(String::new(), true)]);

    let mut session = engine.create_session();
    let response = session.predict_sync("abc").unwrap();
    assert_eq!(response.text(), "");
    assert!(response.is_done());
}

#[test]
fn test_size_in_tokens_is_idempotent_and_isolated() {
    let engine = engine_with_delay("abcdefgh", &[], 9, Duration::from_millis(5));
    let mut session = engine.create_session();
    session.predict_async("", |_| {}).unwrap();

    assert_eq!(session.size_in_tokens("hello world").unwrap(), 11);
    assert_eq!(session.size_in_tokens("hello world").unwrap(), 11);
    assert_eq!(
        session.size_in_tokens("HELLO").unwrap_err().code(),
        "TOKENIZER_UNKNOWN_CHARACTER"
    );

    let outcome = session.wait().unwrap();
    assert_eq!(outcome.text, "abcdefgh");
    assert_eq!(
        session.size_in_tokens("hello world").unwrap(),
        engine.tokenizer().encode("hello world").unwrap().len()
    );
}

#[test]
fn test_drop_blocks_until_final_chunk() {
    let engine = engine_with_delay("abcdefghij", &[], 11, Duration::from_millis(5));
    let finished = Arc::new(AtomicBool::new(false));

    let mut session = engine.create_session();
    let flag = Arc::clone(&finished);
    session
        .predict_async("", move |response| {
            if response.is_done() {
                flag.store(true, Ordering::SeqCst);
            }
        })
        .unwrap();
    drop(session);

    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn test_session_outlives_dropped_engine_handle() {
    let engine = engine("abc", &[], 4);
    let mut session = engine.create_session();
    drop(engine);

    assert_eq!(session.predict_sync("").unwrap().text(), "abc");
}

#[test]
fn test_cancel_delivers_final_chunk_with_released_prefix() {
    let transcript = "abcdefghijklmnopqrstuvwxyz";
    let engine = engine_with_delay(transcript, &[], 27, Duration::from_millis(10));
    let chunks = Arc::new(Mutex::new(Vec::new()));

    let mut session = engine.create_session();
    let sink = Arc::clone(&chunks);
    session
        .predict_async("", move |response| sink.lock().push(response))
        .unwrap();
    std::thread::sleep(Duration::from_millis(55));
    session.cancel();
    let outcome = session.wait().unwrap();

    assert_eq!(outcome.finish_reason, FinishReason::Cancelled);
    let chunks = chunks.lock();
    assert_eq!(chunks.iter().filter(|c| c.is_done()).count(), 1);
    let text: String = chunks.iter().map(|c| c.text()).collect();
    assert!(transcript.starts_with(&text));
    assert_eq!(text.chars().count(), outcome.tokens_generated);
}

#[test]
fn test_decode_failure_reports_and_finishes_request() {
    let engine = Engine::builder()
        .tokenizer(letters_tokenizer())
        .model(FailingModel {
            fail_at: 3,
            steps: AtomicUsize::new(0),
        })
        .start_token_id(0)
        .max_num_tokens(64)
        .error_policy(ErrorPolicy::Report)
        .build()
        .unwrap();

    let chunks = Arc::new(Mutex::new(Vec::new()));
    let mut session = engine.create_session();
    let sink = Arc::clone(&chunks);
    session
        .predict_async("", move |response| sink.lock().push(response))
        .unwrap();

    let err = session.wait().unwrap_err();
    assert_eq!(err.code(), "MODEL_DECODE_FAILED");
    let chunks = chunks.lock();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.last(), Some(&ResponseContext::chunk(String::new(), true)));

    let err = session.predict_sync("").unwrap_err();
    assert_eq!(err.code(), "MODEL_DECODE_FAILED");
}

#[test]
fn test_normalizer_applies_to_decoded_pieces() {
    let vocab = VocabularyBuilder::new()
        .set_bos_token("<s>")
        .add_tokens(["▁hello", "▁world", "\u{FB01}"])
        .build();
    let tokenizer = VocabTokenizer::new(vocab);
    let model = ReplayModel::from_text(&tokenizer, "hello world\u{FB01}").unwrap();
    let engine = Engine::builder()
        .tokenizer(tokenizer)
        .normalizer(UnicodeNormalizer::default())
        .model(model)
        .start_token_id(0)
        .max_num_tokens(4)
        .build()
        .unwrap();

    let mut session = engine.create_session();
    assert_eq!(session.predict_sync("").unwrap().text(), " hello worldfi");
}
