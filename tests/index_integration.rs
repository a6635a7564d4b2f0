//! Integration tests for building, persisting and searching an index.

mod common;

use std::sync::Arc;

use common::BagOfWords;
use mailsense::corpus::Corpus;
use mailsense::domain::EmailRecord;
use mailsense::embedding::{
    rank, Embedding, EmbeddingError, EmbeddingMatrix, EmbeddingProvider, SimilarityIndex,
};
use pretty_assertions::assert_eq;

fn provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(BagOfWords::new(4096))
}

const CORPUS: [&str; 5] = [
    "Invio del preventivo per il progetto di analisi dati",
    "Conferma della riunione di lunedì con il team legale",
    "Contratto firmato per la piattaforma di visione artificiale",
    "Richiesta di informazioni sui vostri servizi AI",
    "Fattura di marzo in allegato",
];

#[test]
fn search_returns_one_result_per_document() {
    let index = SimilarityIndex::build(provider(), &CORPUS).unwrap();

    let results = index.search("preventivo progetto").unwrap();
    assert_eq!(results.len(), CORPUS.len());

    let mut rows: Vec<usize> = results.iter().map(|r| r.index).collect();
    rows.sort_unstable();
    assert_eq!(rows, (0..CORPUS.len()).collect::<Vec<_>>());
}

#[test]
fn scores_stay_in_range_and_descend() {
    let index = SimilarityIndex::build(provider(), &CORPUS).unwrap();

    for query in ["fattura", "riunione team", "qualcosa di diverso", ""] {
        let results = index.search(query).unwrap();
        assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[test]
fn persisted_index_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.safetensors");

    let built = SimilarityIndex::build(provider(), &CORPUS).unwrap();
    built.persist(&path).unwrap();
    let loaded = SimilarityIndex::open(provider(), &path).unwrap();

    assert_eq!(loaded.matrix(), built.matrix());
    assert_eq!(
        loaded.search("contratto firmato").unwrap(),
        built.search("contratto firmato").unwrap()
    );
}

#[test]
fn document_finds_itself_first() {
    let index = SimilarityIndex::build(provider(), &CORPUS).unwrap();

    for (row, text) in CORPUS.iter().enumerate() {
        let top = index.search(text).unwrap()[0];
        assert_eq!(top.index, row);
        assert!((top.score - 1.0).abs() < 1e-5);
    }
}

#[test]
fn sunny_weather_example() {
    let corpus = [
        "I love sunny days",
        "I love sunny days",
        "The stock market crashed today",
    ];
    let index = SimilarityIndex::build(provider(), &corpus).unwrap();

    let results = index.search("sunny weather").unwrap();
    assert_eq!(results[0].index, 0);
    assert_eq!(results[1].index, 1);
    assert_eq!(results[2].index, 2);
    assert!((results[0].score - results[1].score).abs() < 1e-6);
    assert!(results[1].score > results[2].score);
}

#[test]
fn zero_query_scores_zero() {
    let index = SimilarityIndex::build(provider(), &CORPUS).unwrap();
    let zero = vec![0.0f32; index.matrix().dim()];

    let results = rank(&zero, index.matrix()).unwrap();
    assert_eq!(results.len(), CORPUS.len());
    assert!(results.iter().all(|r| r.score == 0.0));
    // Ties keep corpus order.
    let rows: Vec<usize> = results.iter().map(|r| r.index).collect();
    assert_eq!(rows, vec![0, 1, 2, 3, 4]);
}

#[test]
fn empty_index_returns_no_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.safetensors");

    let index = SimilarityIndex::build(provider(), &[]).unwrap();
    assert!(index.search("anything").unwrap().is_empty());

    index.persist(&path).unwrap();
    let loaded = SimilarityIndex::open(provider(), &path).unwrap();
    assert!(loaded.is_empty());
    assert!(loaded.search("anything").unwrap().is_empty());
}

#[test]
fn artifact_from_another_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("other.safetensors");
    EmbeddingMatrix::from_rows("other/model", 4096, vec![Embedding::new(vec![1.0; 4096])])
        .unwrap()
        .persist(&path)
        .unwrap();

    let err = SimilarityIndex::open(provider(), &path).err().unwrap();
    assert!(matches!(err, EmbeddingError::ModelMismatch { .. }));
}

#[test]
fn binary_text_is_an_encoding_error() {
    let err = SimilarityIndex::build(provider(), &["ok", "bad\0bytes"]).err().unwrap();
    assert!(matches!(err, EmbeddingError::Encoding(_)));
}

#[test]
fn corpus_rows_join_back_to_emails() {
    let dir = tempfile::tempdir().unwrap();
    for (i, body) in CORPUS.iter().enumerate() {
        let record = EmailRecord::new("oggi", format!("Email {i}"), "x@y.it", *body);
        Corpus::write_record(dir.path(), i, &record).unwrap();
    }

    let corpus = Corpus::load(dir.path()).unwrap();
    let index = SimilarityIndex::build(provider(), &corpus.bodies()).unwrap();

    let best = index.top_k("fattura marzo", 1).unwrap()[0];
    let email = &corpus.get(best.index).unwrap().email;
    assert_eq!(email.body, "Fattura di marzo in allegato");
}
