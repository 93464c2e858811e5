//! # gator
//!
//! A command-line RSS aggregator: register feeds, follow them, and let
//! `gator poll` collect their posts into a local SQLite database.
//!
//! ## Architecture
//!
//! A poll cycle runs a single feed through the pipeline:
//!
//! ```text
//! Poller → Ingestor → Fetcher → Normalizer → Store
//! ```
//!
//! - [`poller`]: fixed-interval loop, stops on the first fatal error
//! - [`ingest`]: claims the stalest feed and stores its new posts
//! - [`fetcher`]: HTTP client with a per-request deadline
//! - [`normalizer`]: RSS 2.0 parsing and HTML entity unescaping
//! - [`store`]: SQLite persistence
//!
//! ## Quick Start
//!
//! ```bash
//! gator register kahya
//! gator addfeed "Rust Blog" https://blog.rust-lang.org/feed.xml
//! gator poll 1m
//! gator browse 5
//! ```
//!
//! ## Known limitation
//!
//! A feed is claimed by stamping `last_fetched_at` before it is fetched. That
//! keeps a single `gator poll` process from fetching a feed twice in a row,
//! but two processes polling the same database can claim the same feed.

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// config, store, fetcher, normalizer.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration file handling.
pub mod config;

/// Core domain models.
///
/// - [`User`](domain::User)
/// - [`Feed`](domain::Feed) and [`FeedFollow`](domain::FeedFollow)
/// - [`Post`](domain::Post): a stored feed item
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for feed fetching
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// Ingestion of one feed per cycle with duplicate suppression.
pub mod ingest;

/// RSS parsing and normalization into [`ParsedFeed`](normalizer::ParsedFeed).
pub mod normalizer;

/// The polling loop behind `gator poll`.
pub mod poller;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
