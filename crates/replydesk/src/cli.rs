//! Command-line arguments.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use replydesk_core::{EmailPriority, EmailStatus};

/// `ReplyDesk` - Gmail support inbox backend
#[derive(Parser, Debug)]
#[command(name = "replydesk", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "REPLYDESK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log verbosity (-v debug, -vv trace); `RUST_LOG` takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level operations.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Register a business account
    AddUser {
        /// Login email address
        #[arg(long)]
        email: String,
        /// Password hash from the authentication layer
        #[arg(long)]
        password_hash: String,
        /// Company display name
        #[arg(long)]
        company: String,
    },
    /// Show a user's account and connection state
    Status(UserArg),
    /// Print the Gmail consent URL for a user
    Connect(UserArg),
    /// Exchange an authorization code from the consent redirect
    Authorize {
        #[command(flatten)]
        user: UserArg,
        /// One-time authorization code
        #[arg(long)]
        code: String,
    },
    /// Store a token set obtained elsewhere
    ImportTokens {
        #[command(flatten)]
        user: UserArg,
        /// Access token
        #[arg(long)]
        access_token: String,
        /// Refresh token; omitted keeps the stored one
        #[arg(long)]
        refresh_token: Option<String>,
        /// Absolute expiry (RFC 3339)
        #[arg(long, conflicts_with = "expires_in")]
        expires_at: Option<DateTime<Utc>>,
        /// Seconds until expiry
        #[arg(long, default_value_t = 3600)]
        expires_in: i64,
    },
    /// Forget the stored Gmail credential
    Disconnect(UserArg),
    /// List recent inbox messages
    Messages {
        #[command(flatten)]
        user: UserArg,
        /// Print only sender, subject and date per message
        #[arg(long)]
        summary: bool,
    },
    /// Send a plain-text message from the connected account
    Send {
        #[command(flatten)]
        user: UserArg,
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Subject line
        #[arg(long)]
        subject: String,
        /// Message body ("-" reads stdin)
        #[arg(long)]
        body: String,
    },
    /// Classify an email body
    Classify(ContentArg),
    /// Score the sentiment of an email body
    Sentiment(ContentArg),
    /// Draft a reply to an email body
    Reply {
        #[command(flatten)]
        user: UserArg,
        /// Tone override; defaults to the brand voice
        #[arg(long)]
        tone: Option<String>,
        #[command(flatten)]
        content: ContentArg,
    },
    /// Record and track customer emails
    #[command(subcommand)]
    Email(EmailCommand),
    /// Manage reply templates
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Manage the brand voice
    #[command(subcommand)]
    BrandVoice(BrandVoiceCommand),
}

/// Email record operations.
#[derive(Subcommand, Debug)]
pub enum EmailCommand {
    /// Record an incoming email
    Add {
        #[command(flatten)]
        user: UserArg,
        /// Subject line
        #[arg(long)]
        subject: String,
        /// Message body ("-" reads stdin)
        #[arg(long)]
        body: String,
        /// low, medium or high
        #[arg(long, default_value = "medium")]
        priority: EmailPriority,
        /// Arrival time (RFC 3339); defaults to now
        #[arg(long)]
        received_at: Option<DateTime<Utc>>,
    },
    /// List the user's emails, newest first
    List(UserArg),
    /// Set an email's reply status
    Status {
        #[command(flatten)]
        user: UserArg,
        /// Email id
        #[arg(long)]
        id: i64,
        /// pending or responded
        status: EmailStatus,
    },
}

/// Template operations.
#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// Create a template
    Add {
        #[command(flatten)]
        user: UserArg,
        #[command(flatten)]
        fields: TemplateFields,
    },
    /// List the user's templates
    List(UserArg),
    /// Replace a template's fields
    Update {
        #[command(flatten)]
        user: UserArg,
        /// Template id
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        fields: TemplateFields,
    },
    /// Delete a template
    Delete {
        #[command(flatten)]
        user: UserArg,
        /// Template id
        #[arg(long)]
        id: i64,
    },
}

/// Brand voice operations.
#[derive(Subcommand, Debug)]
pub enum BrandVoiceCommand {
    /// Save the brand voice
    Set {
        #[command(flatten)]
        user: UserArg,
        /// Tone, e.g. "friendly"
        #[arg(long)]
        tone: String,
        /// Phrases to weave into replies
        #[arg(long, default_value = "")]
        phrases: String,
    },
    /// Show the brand voice
    Show(UserArg),
}

/// Acting user.
#[derive(Args, Debug)]
pub struct UserArg {
    /// User id
    #[arg(long = "user", short = 'u')]
    pub user_id: i64,
}

/// Email body input.
#[derive(Args, Debug)]
pub struct ContentArg {
    /// Email body ("-" reads stdin)
    pub content: String,
}

/// Template fields.
#[derive(Args, Debug)]
pub struct TemplateFields {
    /// Template name
    #[arg(long)]
    pub name: String,
    /// Template body
    #[arg(long)]
    pub content: String,
    /// Variable name used by the body (repeatable)
    #[arg(long = "variable")]
    pub variables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "replydesk", "send", "-u", "3", "--to", "jane@example.com", "--subject", "Hi",
            "--body", "Hello",
        ]);
        let Ok(Cli {
            command: Command::Send { user, to, .. },
            ..
        }) = cli
        else {
            panic!("send did not parse");
        };
        assert_eq!(user.user_id, 3);
        assert_eq!(to, "jane@example.com");
    }

    #[test]
    fn test_parse_template_variables() {
        let cli = Cli::try_parse_from([
            "replydesk", "template", "add", "--user", "1", "--name", "Shipping",
            "--content", "Hi {{name}}", "--variable", "name", "--variable", "order",
        ]);
        let Ok(Cli {
            command: Command::Template(TemplateCommand::Add { fields, .. }),
            ..
        }) = cli
        else {
            panic!("template add did not parse");
        };
        assert_eq!(fields.variables, vec!["name", "order"]);
    }

    #[test]
    fn test_parse_email_add() {
        let cli = Cli::try_parse_from([
            "replydesk", "email", "add", "-u", "2", "--subject", "Refund", "--body", "Please",
            "--priority", "HIGH",
        ]);
        let Ok(Cli {
            command: Command::Email(EmailCommand::Add { priority, received_at, .. }),
            ..
        }) = cli
        else {
            panic!("email add did not parse");
        };
        assert_eq!(priority, EmailPriority::High);
        assert!(received_at.is_none());
    }

    #[test]
    fn test_email_enums_reject_unknown_values() {
        let priority = Cli::try_parse_from([
            "replydesk", "email", "add", "-u", "2", "--subject", "s", "--body", "b",
            "--priority", "urgent",
        ]);
        assert!(priority.is_err());

        let status =
            Cli::try_parse_from(["replydesk", "email", "status", "-u", "2", "--id", "1", "done"]);
        assert!(status.is_err());
    }

    #[test]
    fn test_expiry_flags_conflict() {
        let result = Cli::try_parse_from([
            "replydesk", "import-tokens", "--user", "1", "--access-token", "A",
            "--expires-at", "2030-01-01T00:00:00Z", "--expires-in", "60",
        ]);
        assert!(result.is_err());
    }
}
