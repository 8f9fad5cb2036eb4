//! # Site Search
//!
//! A self-hosted search engine for a fixed set of web sites.
//!
//! Site Search crawls every configured site from its root, reduces page text
//! to Russian lemmas, keeps a per-site inverted index in SQLite and answers
//! queries with ranked, highlighted results via a CLI and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Crawler    │──▶│  Lemmatizer  │──▶│  SQLite   │
//! │ (per site)  │   │  + Indexer   │   │  index    │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │  Search  │         │  Stats   │
//!                 └────┬─────┘         └────┬─────┘
//!                      └──────┬─────────────┘
//!                             ▼
//!                      CLI / HTTP API
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sitesearch init                 # create database
//! sitesearch index                # crawl and index all configured sites
//! sitesearch search "леопард"     # ranked results with snippets
//! sitesearch serve                # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Site / page / lemma / index rows |
//! | [`store`] | Storage trait and SQLite backend |
//! | [`morphology`] | Dictionary-backed morphological analysis |
//! | [`lemmatizer`] | Lemma counting and position-preserving lemmatization |
//! | [`urls`] | Site roots, page paths, link filtering |
//! | [`html`] | Title, visible text and links of a page |
//! | [`fetch`] | HTTP page download |
//! | [`crawler`] | Recursive concurrent site traversal |
//! | [`indexer`] | Lemma frequency and index accumulation |
//! | [`indexing`] | Indexing runs, stop requests, single-page refresh |
//! | [`search`] | Ranked search with stop lemmas and snippets |
//! | [`snippet`] | Highlighted result excerpts |
//! | [`stats`] | Index statistics |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod config;
pub mod crawler;
pub mod db;
pub mod error;
pub mod fetch;
pub mod html;
pub mod indexer;
pub mod indexing;
pub mod lemmatizer;
pub mod migrate;
pub mod models;
pub mod morphology;
pub mod search;
pub mod server;
pub mod snippet;
pub mod stats;
pub mod store;
pub mod urls;
