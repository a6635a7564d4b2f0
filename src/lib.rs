//! mailsense - Semantic search and an assistant chat loop over an email corpus
//!
//! This crate provides local text embeddings and cosine-similarity search
//! over a directory of emails, a driver for a hosted assistant that calls
//! back into that search, and a generator for synthetic corpora.

pub mod assistant;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod embedding;
pub mod generator;
pub mod providers;
