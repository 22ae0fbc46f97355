use serde::{Deserialize, Serialize};

/// A message to post on a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageData {
    pub content: String,
    pub embeds: Vec<Embed>,
    pub files: Vec<Attachment>,
    /// Allow `@everyone` in `content` to ping.
    pub mention_everyone: bool,
}

/// Rich embed. Serializes to the platform's embed JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Points the embed image at an attachment uploaded with the same message.
    pub fn with_attachment_image(mut self, filename: &str) -> Self {
        self.image = Some(EmbedImage {
            url: format!("attachment://{filename}"),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedImage {
    pub url: String,
}

/// A file uploaded alongside a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub data: Vec<u8>,
}

/// A message as it exists on the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

impl PostedMessage {
    /// Title of the first embed, if any.
    pub fn title(&self) -> Option<&str> {
        self.embeds.first().and_then(|e| e.title.as_deref())
    }
}
