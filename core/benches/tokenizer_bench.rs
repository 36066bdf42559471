use criterion::{criterion_group, criterion_main, Criterion};
use retriever_core::bm25::rank;
use retriever_core::segment::chunk_record;
use retriever_core::tokenizer::normalize;
use retriever_core::{Bm25Params, CorpusIndex};

const PARAGRAPH: &str = "The retriever splits converted documents into sections, \
packs sentences into chunks and scores them with BM25. Lower-casing and \
punctuation removal are the only normalization steps!";

fn bench_normalize(c: &mut Criterion) {
    let text = PARAGRAPH.repeat(64);
    c.bench_function("normalize_paragraphs", |b| b.iter(|| normalize(&text)));
}

fn bench_rank(c: &mut Criterion) {
    let docs = (0..2_000)
        .map(|i| chunk_record(&format!("doc{}.md", i % 50), "Benchmark section", &format!("{PARAGRAPH} chunk {i}")))
        .collect();
    let index = CorpusIndex::from_documents(docs);
    c.bench_function("rank_2000_chunks", |b| b.iter(|| rank("bm25 sentences chunk", &index, Bm25Params::default())));
}

criterion_group!(benches, bench_normalize, bench_rank);
criterion_main!(benches);
