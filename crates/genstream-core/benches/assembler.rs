//! Benchmarks for stop-sequence assembly and end-to-end session throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use genstream_core::{
    generation::assembler::TokenStreamAssembler,
    model::replay::ReplayModel,
    tokenizer::vocab::{VocabTokenizer, VocabularyBuilder},
    Engine,
};

const FRAGMENTS: &[&str] = &[" the", " quick", " brown", " fox", " jumps", " over", " a", " lazy", " dog", "."];

fn stop_list(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("<|stop_{}|>", i)).collect()
}

/// Feeding fragments through the assembler with a growing stop list
fn bench_assembler_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembler_push");
    group.throughput(Throughput::Elements(FRAGMENTS.len() as u64 * 100));

    for count in [0usize, 1, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let stops = stop_list(count);
            b.iter(|| {
                let mut assembler = TokenStreamAssembler::new(stops.clone(), 10);
                let mut released = 0;
                for _ in 0..100 {
                    for fragment in FRAGMENTS {
                        released += assembler.push(black_box(fragment)).ready.len();
                    }
                }
                released + assembler.flush().len()
            });
        });
    }

    group.finish();
}

/// Full requests through a session, including thread spawn and join
fn bench_session_predict_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_predict_sync");

    for tokens in [16usize, 128, 512] {
        let vocab = VocabularyBuilder::new()
            .set_bos_token("<s>")
            .add_tokens(('a'..='z').map(|c| c.to_string()))
            .build();
        let tokenizer = VocabTokenizer::new(vocab).with_dummy_prefix(false);
        let transcript: String = ('a'..='z').cycle().take(tokens).collect();
        let model = ReplayModel::from_text(&tokenizer, &transcript).expect("transcript encodes");
        let engine = Engine::builder()
            .tokenizer(tokenizer)
            .model(model)
            .start_token_id(0)
            .max_num_tokens(tokens + 1)
            .build()
            .expect("engine builds");

        group.throughput(Throughput::Elements(tokens as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tokens), &engine, |b, engine| {
            let mut session = engine.create_session();
            b.iter(|| session.predict_sync("").expect("generation succeeds"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_assembler_push, bench_session_predict_sync);
criterion_main!(benches);
