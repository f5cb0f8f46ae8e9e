use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lawchat::documents::{loader::normalize_text, Chunker};
use lawchat::store::LocalEmbedder;

fn legal_text() -> String {
    (1..=200)
        .map(|n| {
            format!(
                "Article {n}. Whoever commits theft of movable property belonging to another \
                 is punishable with simple imprisonment or rigorous imprisonment not exceeding \
                 five years, according to the gravity of the offence."
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn chunker_benchmark(c: &mut Criterion) {
    let chunker = Chunker::new(1000, 200);
    let text = legal_text();

    c.bench_function("chunker_split_legal_code", |b| {
        b.iter(|| {
            let chunks = chunker.chunk(black_box(text.as_str()), "Criminal Code");
            black_box(chunks.len());
        });
    });
}

fn normalize_benchmark(c: &mut Criterion) {
    let raw = legal_text().replace("\n\n", "\r\n \t\r\n\r\n\r\n");

    c.bench_function("normalize_extracted_text", |b| {
        b.iter(|| {
            let text = normalize_text(black_box(&raw));
            black_box(text.len());
        });
    });
}

fn local_embedding_benchmark(c: &mut Criterion) {
    let embedder = LocalEmbedder::new(1536);
    let chunk: String = legal_text().chars().take(1000).collect();

    c.bench_function("local_embed_chunk", |b| {
        b.iter(|| {
            let vector = embedder.embed(black_box(&chunk));
            black_box(vector.len());
        });
    });
}

criterion_group!(
    benches,
    chunker_benchmark,
    normalize_benchmark,
    local_embedding_benchmark
);
criterion_main!(benches);
