//! # replydesk-oauth
//!
//! `OAuth2` authorization-code client used to obtain and renew delegated
//! mailbox credentials on behalf of a user.
//!
//! ## Features
//!
//! - **Authorization Code Flow**: consent URL building and code exchange
//! - **Token management**: refresh exchange, expiry checks, refresh-token retention
//! - **Provider configurations**: Google (Gmail API scopes) or any custom provider
//!
//! ## Quick Start
//!
//! ```ignore
//! use replydesk_oauth::{AuthorizationCodeFlow, OAuthClient, Provider};
//!
//! let provider = Provider::google()?;
//! let client = OAuthClient::new("client_id", provider)
//!     .with_client_secret("secret")
//!     .with_redirect_uri("https://app.example.com/oauth/callback");
//! let flow = AuthorizationCodeFlow::new(client);
//!
//! // Send the user here
//! let url = flow.authorization_url(None, Some("user-42"))?;
//!
//! // On callback
//! let token = flow.exchange_code("code_from_redirect").await?;
//!
//! // Later, once the access token has lapsed
//! if token.is_expired() {
//!     let renewed = flow.client().refresh_token(&token).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, OAuthClient};
pub use provider::Provider;
pub use token::Token;
