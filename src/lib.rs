//! astro-bot — a Firestore-backed conversational flow bot.
//!
//! Flow definitions live in a document collection, are composed into an
//! in-memory flow tree, and are hot-reloaded when the collection changes.
//! Alongside the bot runs an authenticated admin HTTP surface over the
//! process manager and an unauthenticated webhook restart trigger.

pub mod admin;
pub mod bot;
pub mod config;
pub mod error;
pub mod flow;
pub mod logger;
pub mod process;
pub mod runtime;
pub mod store;
