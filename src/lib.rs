//! # Projects Tracker
//!
//! Ask natural-language questions about a set of project documents and get
//! an answer synthesized by a managed retrieval-augmented-generation
//! service, with a citation back to the source document.
//!
//! Retrieval, ranking and generation all happen in the managed knowledge
//! base. The tracker lists the documents, forwards questions, and keeps a
//! per-session transcript.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ S3 bucket   │──▶│  Catalog    │   │ Bedrock KB        │
//! │ (ListV2)    │   │  lister     │   │ RetrieveAndGen.   │
//! └─────────────┘   └──────┬──────┘   └────────▲─────────┘
//!                          ▼                   │
//!                    ┌───────────────────────────┐
//!                    │ Controller + SessionState │
//!                    └──────┬──────────────┬─────┘
//!                           ▼              ▼
//!                      ┌─────────┐    ┌─────────┐
//!                      │  chat   │    │  HTTP   │
//!                      │  (CLI)  │    │ server  │
//!                      └─────────┘    └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tracker catalog                          # list project documents
//! tracker ask "Who was the architect on Berlin project?"
//! tracker workflow --document Acme_Berlin.pdf --option "Key contacts"
//! tracker chat                             # interactive session
//! tracker serve                            # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors |
//! | [`traits`] | Object store and knowledge base seams |
//! | [`aws`] | Credentials and SigV4 signing |
//! | [`s3`] | S3 object listing |
//! | [`catalog`] | Document catalog lister |
//! | [`bedrock`] | Retrieve-and-generate dispatcher |
//! | [`session`] | Session state machine and query templates |
//! | [`controller`] | Dispatch-and-render cycle |
//! | [`render`] | Terminal rendering |
//! | [`chat`] | Interactive terminal chat |
//! | [`server`] | HTTP server |

pub mod aws;
pub mod bedrock;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod render;
pub mod s3;
pub mod server;
pub mod session;
pub mod traits;
