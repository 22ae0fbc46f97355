use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::{NotifyError, Result};
use crate::message::{Embed, MessageData, PostedMessage};
use crate::surface::ChatSurface;
use crate::utils::truncate_string;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const GUILD_TEXT: u8 = 0;
const MAX_FETCH_LIMIT: usize = 100;
const MAX_RATE_LIMIT_WAIT_MS: u64 = 5_000;
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone)]
pub struct DiscordOptions {
    pub token: String,
    pub application_id: String,
    pub guild_id: String,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GuildChannel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Serialize)]
struct AllowedMentions {
    parse: Vec<&'static str>,
}

#[derive(Serialize)]
struct AttachmentRef<'a> {
    id: usize,
    filename: &'a str,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
    embeds: &'a [Embed],
    allowed_mentions: AllowedMentions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentRef<'a>>,
}

impl<'a> MessagePayload<'a> {
    fn new(message: &'a MessageData) -> Self {
        let parse = if message.mention_everyone {
            vec!["everyone"]
        } else {
            Vec::new()
        };
        Self {
            content: &message.content,
            embeds: &message.embeds,
            allowed_mentions: AllowedMentions { parse },
            attachments: message
                .files
                .iter()
                .enumerate()
                .map(|(id, f)| AttachmentRef {
                    id,
                    filename: &f.name,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// [`ChatSurface`] over the Discord REST API for a single guild.
///
/// Channels are addressed by name; [`DiscordSurface::ensure_channels`] must
/// run once at startup to resolve (and create) them.
pub struct DiscordSurface {
    client: reqwest::Client,
    options: DiscordOptions,
    channels: RwLock<HashMap<String, String>>,
}

impl DiscordSurface {
    pub fn new(options: DiscordOptions) -> Result<Self> {
        if options.token.is_empty() {
            return Err(NotifyError::InvalidConfig("discord token is empty".into()));
        }
        if options.guild_id.is_empty() {
            return Err(NotifyError::InvalidConfig("discord guild_id is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .build()?;
        Ok(Self {
            client,
            options,
            channels: RwLock::new(HashMap::new()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.options.api_base, path))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.options.token),
            )
    }

    /// Sends the request built by `build`, waiting out at most one short
    /// rate-limit response.
    async fn execute<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder> + Send + Sync,
    {
        let mut waited = false;
        loop {
            let resp = build()?.send().await?;
            if resp.status() != StatusCode::TOO_MANY_REQUESTS {
                return check(resp).await;
            }

            let retry_after_ms = resp
                .json::<RateLimitBody>()
                .await
                .map(|b| (b.retry_after * 1000.0).ceil() as u64)
                .unwrap_or(1000);
            if waited || retry_after_ms > MAX_RATE_LIMIT_WAIT_MS {
                return Err(NotifyError::RateLimited { retry_after_ms });
            }
            tracing::warn!(retry_after_ms, "Discord rate limited, waiting");
            tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
            waited = true;
        }
    }

    fn channel_id(&self, name: &str) -> Result<String> {
        self.channels
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| NotifyError::UnknownChannel(name.to_string()))
    }

    /// Resolves the named text channels in the guild, creating any that are
    /// missing.
    pub async fn ensure_channels(&self, names: &[&str]) -> Result<()> {
        let path = format!("/guilds/{}/channels", self.options.guild_id);
        let existing: Vec<GuildChannel> = self
            .execute(|| Ok(self.request(Method::GET, &path)))
            .await?
            .json()
            .await?;

        let mut resolved: HashMap<String, String> = existing
            .into_iter()
            .filter(|c| c.kind == GUILD_TEXT)
            .map(|c| (c.name, c.id))
            .collect();

        for name in names {
            if resolved.contains_key(*name) {
                continue;
            }
            let body = serde_json::json!({ "name": name, "type": GUILD_TEXT });
            let created: GuildChannel = self
                .execute(|| Ok(self.request(Method::POST, &path).json(&body)))
                .await?
                .json()
                .await?;
            tracing::info!(channel = %name, id = %created.id, "Created Discord channel");
            resolved.insert(created.name, created.id);
        }

        let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
        for name in names {
            if let Some(id) = resolved.get(*name) {
                channels.insert((*name).to_string(), id.clone());
            }
        }
        Ok(())
    }

    /// Replaces the guild's application commands. Returns how many are registered.
    pub async fn register_commands(&self, commands: &[Value]) -> Result<usize> {
        let path = format!(
            "/applications/{}/guilds/{}/commands",
            self.options.application_id, self.options.guild_id
        );
        let registered: Vec<Value> = self
            .execute(|| Ok(self.request(Method::PUT, &path).json(commands)))
            .await?
            .json()
            .await?;
        Ok(registered.len())
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|e| format!("[Failed to read response body: {e}]"));
    Err(NotifyError::ApiError {
        service: "discord".to_string(),
        status: status.as_u16(),
        body: truncate_string(&body, MAX_ERROR_BODY),
    })
}

#[async_trait]
impl ChatSurface for DiscordSurface {
    async fn send_message(&self, channel: &str, message: &MessageData) -> Result<String> {
        let path = format!("/channels/{}/messages", self.channel_id(channel)?);
        let payload = serde_json::to_string(&MessagePayload::new(message))?;

        let resp = self
            .execute(|| {
                let req = self.request(Method::POST, &path);
                if message.files.is_empty() {
                    return Ok(req
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .body(payload.clone()));
                }
                let mut form =
                    reqwest::multipart::Form::new().text("payload_json", payload.clone());
                for (i, file) in message.files.iter().enumerate() {
                    let part = reqwest::multipart::Part::bytes(file.data.clone())
                        .file_name(file.name.clone());
                    form = form.part(format!("files[{i}]"), part);
                }
                Ok(req.multipart(form))
            })
            .await?;

        let posted: PostedMessage = resp.json().await?;
        Ok(posted.id)
    }

    async fn recent_messages(&self, channel: &str, limit: usize) -> Result<Vec<PostedMessage>> {
        let path = format!("/channels/{}/messages", self.channel_id(channel)?);
        let limit = limit.clamp(1, MAX_FETCH_LIMIT).to_string();
        let messages = self
            .execute(|| Ok(self.request(Method::GET, &path).query(&[("limit", &limit)])))
            .await?
            .json()
            .await?;
        Ok(messages)
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<()> {
        let path = format!(
            "/channels/{}/messages/{}",
            self.channel_id(channel)?,
            message_id
        );
        match self.execute(|| Ok(self.request(Method::DELETE, &path))).await {
            Ok(_) => Ok(()),
            // Already gone.
            Err(NotifyError::ApiError { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        message: &MessageData,
    ) -> Result<()> {
        let path = format!(
            "/channels/{}/messages/{}",
            self.channel_id(channel)?,
            message_id
        );
        let payload = serde_json::to_string(&MessagePayload::new(message))?;
        self.execute(|| {
            Ok(self
                .request(Method::PATCH, &path)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.clone()))
        })
        .await?;
        Ok(())
    }
}
