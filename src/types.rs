//! Typed representations of the Discord API objects the bot touches.
//!
//! These mirror the Discord API docs so we can deserialize gateway events and
//! REST responses without touching `serde_json::Value` in the rest of the
//! codebase. Only the fields the fishing game reads are modelled; serde
//! ignores the rest.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Discord IDs are snowflakes transmitted as strings in JSON.
pub type Snowflake = String;

/// Returns `true` if `raw` looks like a snowflake (non-empty, all digits).
pub fn is_snowflake(raw: &str) -> bool {
    !raw.is_empty() && raw.len() <= 20 && raw.bytes().all(|b| b.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Gateway payload (the envelope that wraps every WS message)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayPayload {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub s: Option<u64>,
    pub t: Option<String>,
}

// ---------------------------------------------------------------------------
// User / member
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    pub global_name: Option<String>,
}

impl User {
    /// `Username#Discriminator` or just `Username` for the new username system.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some("0") | None => self.username.clone(),
            Some(disc) => format!("{}#{}", self.username, disc),
        }
    }
}

/// Guild member attached to an interaction invoked inside a guild.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildMember {
    pub user: Option<User>,
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    pub joined_at: Option<String>,
    /// Total permissions of the member in the channel, as a decimal string.
    pub permissions: Option<String>,
}

impl GuildMember {
    /// Parse the `permissions` bitset. Unknown bits are kept.
    pub fn permissions(&self) -> Permissions {
        self.permissions
            .as_deref()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Permissions::from_bits_retain)
            .unwrap_or_else(Permissions::empty)
    }
}

bitflags! {
    /// The subset of Discord permission bits the bot inspects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u64 {
        const ADMINISTRATOR = 1 << 3;
        const MANAGE_GUILD = 1 << 5;
    }
}

bitflags! {
    /// Message flags we set on interaction replies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MessageFlags: u32 {
        const EPHEMERAL = 1 << 6;
    }
}

// ---------------------------------------------------------------------------
// Embed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn timestamp(mut self, ts: impl Into<String>) -> Self {
        self.timestamp = Some(ts.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

// ---------------------------------------------------------------------------
// READY event payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyEvent {
    pub v: u8,
    pub user: User,
    pub session_id: String,
    pub resume_gateway_url: String,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub application: ReadyApplication,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyApplication {
    pub id: Snowflake,
    pub flags: Option<u64>,
}

// ---------------------------------------------------------------------------
// Interactions (slash commands)
// ---------------------------------------------------------------------------

/// Top-level interaction received via INTERACTION_CREATE.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Interaction {
    pub id: Snowflake,
    pub application_id: Snowflake,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub data: Option<InteractionData>,
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub member: Option<GuildMember>,
    pub user: Option<User>,
    pub token: String,
}

impl Interaction {
    /// The user who triggered the interaction. Guild interactions carry it
    /// on `member`, DMs on `user`.
    pub fn author(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum InteractionType {
    Ping = 1,
    ApplicationCommand = 2,
    MessageComponent = 3,
    ApplicationCommandAutocomplete = 4,
    ModalSubmit = 5,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionData {
    pub id: Option<Snowflake>,
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandDataOption>,
}

/// An option value supplied by the user when invoking a slash command.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandDataOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub options: Vec<CommandDataOption>,
    #[serde(default)]
    pub focused: bool,
}

impl CommandDataOption {
    /// The option value rendered as a string. Numbers are stringified so
    /// that a snowflake typed as INTEGER still reads back as an id.
    pub fn value_as_string(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Interaction responses (what we send back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: InteractionCallbackType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionCallbackData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum InteractionCallbackType {
    Pong = 1,
    ChannelMessageWithSource = 4,
    DeferredChannelMessageWithSource = 5,
    DeferredUpdateMessage = 6,
    UpdateMessage = 7,
    ApplicationCommandAutocompleteResult = 8,
    Modal = 9,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionCallbackData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
}

// ---------------------------------------------------------------------------
// Slash command registration payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Snowflake>,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ApplicationCommandOption>,
    /// 1 = CHAT_INPUT (slash), 2 = USER, 3 = MESSAGE
    #[serde(rename = "type", default = "default_command_type")]
    pub kind: u8,
    /// Permission bitset (decimal string) a member needs to see the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<String>,
}

fn default_command_type() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCommandOption {
    pub name: String,
    pub description: String,
    /// 1=SUB_COMMAND, 2=SUB_COMMAND_GROUP, 3=STRING, 4=INTEGER, 5=BOOLEAN,
    /// 6=USER, 7=CHANNEL, 8=ROLE, 9=MENTIONABLE, 10=NUMBER, 11=ATTACHMENT
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ApplicationCommandOptionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCommandOptionChoice {
    pub name: String,
    pub value: serde_json::Value,
}

/// Option type id for STRING options.
pub const OPTION_STRING: u8 = 3;

impl ApplicationCommand {
    /// A CHAT_INPUT command with no options.
    pub fn chat_input(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            kind: 1,
            default_member_permissions: None,
        }
    }

    /// Append a STRING option, optionally restricted to `choices`.
    pub fn string_option(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
        choices: &[&str],
    ) -> Self {
        self.options.push(ApplicationCommandOption {
            name: name.into(),
            description: description.into(),
            kind: OPTION_STRING,
            required,
            choices: choices
                .iter()
                .map(|c| ApplicationCommandOptionChoice {
                    name: (*c).to_string(),
                    value: serde_json::Value::String((*c).to_string()),
                })
                .collect(),
        });
        self
    }

    /// Hide the command from members lacking `perms` (server-side checks
    /// still apply).
    pub fn require_permissions(mut self, perms: Permissions) -> Self {
        self.default_member_permissions = Some(perms.bits().to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Rate-limit info parsed from response headers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub reset_after: Option<f64>,
    pub bucket: Option<String>,
    pub is_global: bool,
}
