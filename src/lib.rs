//! Aula is a self-hosted course engine: teachers author course outlines,
//! reviewers gate publication, learners enroll and accumulate verified
//! progress until a certificate is issued.
//!
//! The crate is split into three layers. [`domain`] holds the pure types
//! and state machines, [`application`] hosts the services that enforce
//! lifecycle and progress rules over repository traits, and [`infra`]
//! provides the Postgres and in-memory repositories plus the HTTP API.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
