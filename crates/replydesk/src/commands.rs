//! Command dispatch.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use replydesk_core::{
    BrandVoice, Config, Database, EmailId, MailMessage, NewEmail, NewUser, Orchestrator,
    ServiceError, TemplateDraft, TemplateId, Token, UserId,
};
use serde_json::{Value, json};
use tracing::debug;

use crate::cli::{
    BrandVoiceCommand, Cli, Command, ContentArg, EmailCommand, TemplateCommand, TemplateFields,
};

/// Runs one command and returns its JSON output.
pub async fn run(cli: Cli) -> Result<Value> {
    let config = Config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if let Command::InitConfig { force } = cli.command {
        let path = cli.config.unwrap_or_else(Config::default_path);
        return init_config(&config, &path, force).await;
    }
    let db = open_database(&config).await?;

    let output = match cli.command {
        Command::InitConfig { .. } => bail!("init-config is handled before the database opens"),
        Command::AddUser {
            email,
            password_hash,
            company,
        } => {
            add_user(
                &db,
                NewUser {
                    email,
                    password_hash,
                    company_name: company,
                },
            )
            .await?
        }
        Command::Status(user) => user_status(&db, UserId::new(user.user_id)).await?,
        Command::Email(command) => email(&db, command).await?,
        Command::Template(command) => template(&db, command).await?,
        Command::BrandVoice(command) => brand_voice(&db, command).await?,
        Command::Connect(user) => {
            let url = orchestrator(&config, &db)?
                .connect(UserId::new(user.user_id))
                .await?;
            json!({ "authorization_url": url.as_str() })
        }
        Command::Authorize { user, code } => {
            orchestrator(&config, &db)?
                .complete_authorization(UserId::new(user.user_id), &code)
                .await?;
            json!({ "connected": true })
        }
        Command::ImportTokens {
            user,
            access_token,
            refresh_token,
            expires_at,
            expires_in,
        } => {
            let expires_at = match expires_at {
                Some(at) => at,
                None => expiry_after(Utc::now(), expires_in)?,
            };
            orchestrator(&config, &db)?
                .store_tokens(
                    UserId::new(user.user_id),
                    &access_token,
                    refresh_token.as_deref(),
                    expires_at,
                )
                .await?;
            json!({ "connected": true, "expires_at": expires_at })
        }
        Command::Disconnect(user) => {
            orchestrator(&config, &db)?
                .disconnect(UserId::new(user.user_id))
                .await?;
            json!({ "connected": false })
        }
        Command::Messages { user, summary } => {
            let messages = orchestrator(&config, &db)?
                .list_messages(UserId::new(user.user_id))
                .await?;
            if summary {
                Value::Array(messages.iter().map(message_summary).collect())
            } else {
                serde_json::to_value(messages)?
            }
        }
        Command::Send {
            user,
            to,
            subject,
            body,
        } => {
            let body = read_content(&body)?;
            let sent = orchestrator(&config, &db)?
                .send_message(UserId::new(user.user_id), &to, &subject, &body)
                .await?;
            serde_json::to_value(sent)?
        }
        Command::Classify(content) => {
            let category = orchestrator(&config, &db)?
                .classify(&read_arg(&content)?)
                .await?;
            json!({ "category": category.as_str() })
        }
        Command::Sentiment(content) => {
            let sentiment = orchestrator(&config, &db)?
                .analyze_sentiment(&read_arg(&content)?)
                .await?;
            json!({ "sentiment": sentiment.as_str() })
        }
        Command::Reply {
            user,
            tone,
            content,
        } => {
            let reply = orchestrator(&config, &db)?
                .generate_reply(
                    UserId::new(user.user_id),
                    &read_arg(&content)?,
                    tone.as_deref(),
                )
                .await?;
            json!({ "reply": reply })
        }
    };
    Ok(output)
}

/// Writes the loaded configuration (defaults plus environment) to `path`.
async fn init_config(config: &Config, path: &Path, force: bool) -> Result<Value> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        bail!("{} already exists; pass --force to replace it", path.display());
    }
    config
        .save(path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(json!({ "config": path.display().to_string() }))
}

async fn add_user(db: &Database, new_user: NewUser) -> Result<Value> {
    let users = db.users();
    if users
        .find_by_email(&new_user.email)
        .await
        .map_err(ServiceError::from)?
        .is_some()
    {
        return Err(ServiceError::InvalidInput(format!(
            "{} is already registered",
            new_user.email
        ))
        .into());
    }
    let user = users.create(&new_user).await.map_err(ServiceError::from)?;
    Ok(serde_json::to_value(user)?)
}

async fn user_status(db: &Database, id: UserId) -> Result<Value> {
    let user = db
        .users()
        .get(id)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::NotFound(format!("User not found: {id}")))?;
    Ok(json!({
        "id": user.id,
        "email": user.email,
        "company_name": user.company_name,
        "connected": user.is_connected(),
        "access_token_valid": user.credential.as_ref().is_some_and(Token::is_valid),
        "expires_at": user.credential.as_ref().map(|token| token.expires_at),
    }))
}

/// Absolute expiry `seconds` after `now`, rejecting values past the
/// representable range.
fn expiry_after(now: DateTime<Utc>, seconds: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .context("--expires-in is out of range")
}

fn message_summary(message: &MailMessage) -> Value {
    json!({
        "id": message.id,
        "from": message.header("From"),
        "subject": message.header("Subject"),
        "date": message.header("Date"),
    })
}

/// Provider-backed operations need a complete configuration; record
/// commands do not.
fn orchestrator(config: &Config, db: &Database) -> Result<Orchestrator> {
    Orchestrator::from_config(config, db).context("Provider configuration is incomplete")
}

async fn open_database(config: &Config) -> Result<Database> {
    if let Some(dir) = config.database_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let path = config.database_path.to_string_lossy();
    debug!("Opening database at {path}");
    Database::open(&path)
        .await
        .with_context(|| format!("Failed to open database {path}"))
}

async fn template(db: &Database, command: TemplateCommand) -> Result<Value> {
    let repo = db.templates();
    let output = match command {
        TemplateCommand::Add { user, fields } => {
            let template = repo
                .create(UserId::new(user.user_id), &draft(fields))
                .await
                .map_err(ServiceError::from)?;
            serde_json::to_value(template)?
        }
        TemplateCommand::List(user) => {
            let templates = repo
                .list_for_user(UserId::new(user.user_id))
                .await
                .map_err(ServiceError::from)?;
            serde_json::to_value(templates)?
        }
        TemplateCommand::Update { user, id, fields } => {
            let template = repo
                .update(UserId::new(user.user_id), TemplateId::new(id), &draft(fields))
                .await
                .map_err(ServiceError::from)?;
            serde_json::to_value(template)?
        }
        TemplateCommand::Delete { user, id } => {
            repo.delete(UserId::new(user.user_id), TemplateId::new(id))
                .await
                .map_err(ServiceError::from)?;
            json!({ "deleted": id })
        }
    };
    Ok(output)
}

async fn email(db: &Database, command: EmailCommand) -> Result<Value> {
    let repo = db.emails();
    let output = match command {
        EmailCommand::Add {
            user,
            subject,
            body,
            priority,
            received_at,
        } => {
            let mut new_email = NewEmail::new(subject, read_content(&body)?).with_priority(priority);
            new_email.received_at = received_at;
            let record = repo
                .create(UserId::new(user.user_id), &new_email)
                .await
                .map_err(ServiceError::from)?;
            serde_json::to_value(record)?
        }
        EmailCommand::List(user) => {
            let records = repo
                .list_for_user(UserId::new(user.user_id))
                .await
                .map_err(ServiceError::from)?;
            serde_json::to_value(records)?
        }
        EmailCommand::Status { user, id, status } => {
            let record = repo
                .set_status(UserId::new(user.user_id), EmailId::new(id), status)
                .await
                .map_err(ServiceError::from)?;
            serde_json::to_value(record)?
        }
    };
    Ok(output)
}

async fn brand_voice(db: &Database, command: BrandVoiceCommand) -> Result<Value> {
    let repo = db.brand_voices();
    match command {
        BrandVoiceCommand::Set {
            user,
            tone,
            phrases,
        } => {
            let voice = BrandVoice {
                user_id: UserId::new(user.user_id),
                tone,
                common_phrases: phrases,
            };
            repo.save(&voice).await.map_err(ServiceError::from)?;
            Ok(serde_json::to_value(voice)?)
        }
        BrandVoiceCommand::Show(user) => {
            let user = UserId::new(user.user_id);
            let voice = repo
                .get(user)
                .await
                .map_err(ServiceError::from)?
                .ok_or_else(|| ServiceError::NotFound(format!("no brand voice for user {user}")))?;
            Ok(serde_json::to_value(voice)?)
        }
    }
}

fn draft(fields: TemplateFields) -> TemplateDraft {
    TemplateDraft {
        name: fields.name,
        content: fields.content,
        variables: fields.variables,
    }
}

fn read_arg(arg: &ContentArg) -> Result<String> {
    read_content(&arg.content)
}

/// Returns `value`, or stdin when `value` is "-".
fn read_content(value: &str) -> Result<String> {
    if value != "-" {
        return Ok(value.to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read stdin")?;
    Ok(buf)
}
