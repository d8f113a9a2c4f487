//! # replydesk-core
//!
//! Core of the `ReplyDesk` backend: everything that touches a user's
//! delegated Gmail credential or an external provider.
//!
//! This crate provides:
//! - **Credential store** - one delegated credential per user (`SQLite`)
//! - **Token refresher** - expiry checks and serialized per-user refresh
//! - **Mail gateway** - Gmail REST list/send with a caller-supplied credential
//! - **Inference gateway** - classify, sentiment and reply drafting via a chat-completion API
//! - **Orchestrator** - per-operation sequencing with typed outcomes
//! - Pass-through template and brand-voice repositories

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
mod error;
pub mod inference;
pub mod mail;
pub mod service;
pub mod store;

pub use auth::{TokenExchange, TokenRefresher};
pub use config::Config;
pub use error::{Error, Result, ServiceError, ServiceResult};
pub use inference::{
    Category, ChatCompletionClient, CompletionProvider, InferenceGateway, InferenceLimits, Sentiment,
    ToneHint,
};
pub use mail::{
    GmailClient, MailGateway, MailMessage, MailProvider, MessageHeader, OutgoingMessage,
    SentMessage,
};
pub use replydesk_oauth::Token;
pub use service::Orchestrator;
pub use store::{
    BrandVoice, BrandVoiceRepository, CredentialStore, Database, EmailId, EmailPriority,
    EmailRecord, EmailRepository, EmailStatus, NewEmail, NewUser, Template, TemplateDraft,
    TemplateId, TemplateRepository, User, UserId, UserRepository,
};
