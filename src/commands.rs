//! Slash-command routing for the fishing game.
//!
//! An [`Invocation`] (command name, caller, string options) is parsed into a
//! typed [`Command`], permission-checked, and executed against the injected
//! store and random source. Every outcome, including failures, becomes a
//! [`Reply`]; nothing here talks to Discord.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{error, info, warn};

use crate::progression;
use crate::reward::{self, Catch};
use crate::store::{PlayerRecord, PlayerStore, StoreError};
use crate::types::is_snowflake;

/// How many players `/leaderboard` shows.
pub const LEADERBOARD_SIZE: usize = 10;

/// Player-facing commands and their help text, in display order.
pub const PLAYER_COMMANDS: &[(&str, &str)] = &[
    ("fish", "Catch a random fish and earn rewards."),
    ("leaderboard", "View the leaderboard, sorted by 'money' or 'level'."),
    ("levels", "Check your current level and league."),
    ("money", "Check your current amount of money."),
    ("help", "List the player commands."),
];

/// Moderator-only commands and their help text.
pub const MODERATOR_COMMANDS: &[(&str, &str)] = &[
    ("reset-fisher", "Reset a player's money or level. Use 'money' or 'level' as the state."),
    ("delete-fisher", "Delete a player's data using their ID."),
    ("delete-all-fishers", "Delete all players' data."),
    ("modhelp", "List the moderator commands."),
];

// Embed colours.
const PURPLE: u32 = 0x9B59B6;
const BLUE: u32 = 0x3498DB;
const ORANGE: u32 = 0xE67E22;
const GREEN: u32 = 0x2ECC71;
const RED: u32 = 0xE74C3C;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Who sent a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub is_moderator: bool,
}

/// A command as received from the platform, before validation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub caller: Caller,
    pub options: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(name: impl Into<String>, caller: Caller) -> Self {
        Self {
            name: name.into(),
            caller,
            options: Vec::new(),
        }
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, name: &'static str) -> Result<&str, CommandError> {
        self.get(name).ok_or(CommandError::MissingArgument(name))
    }
}

/// Leaderboard ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Money,
    Level,
}

/// Which part of a record `/reset-fisher` zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetField {
    Money,
    Level,
}

/// Both `sort` and `state` accept the same two words.
fn parse_money_or_level(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "money" => Some(true),
        "level" | "levels" => Some(false),
        _ => None,
    }
}

impl FromStr for SortKey {
    type Err = CommandError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match parse_money_or_level(raw) {
            Some(true) => Ok(SortKey::Money),
            Some(false) => Ok(SortKey::Level),
            None => Err(CommandError::InvalidArgument(format!(
                "unknown sort `{raw}`, use `money` or `level`"
            ))),
        }
    }
}

impl FromStr for ResetField {
    type Err = CommandError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match parse_money_or_level(raw) {
            Some(true) => Ok(ResetField::Money),
            Some(false) => Ok(ResetField::Level),
            None => Err(CommandError::InvalidArgument(format!(
                "unknown state `{raw}`, use `money` or `level`"
            ))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Money => "money",
            SortKey::Level => "level",
        })
    }
}

impl fmt::Display for ResetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResetField::Money => "money",
            ResetField::Level => "level",
        })
    }
}

/// Accept a raw user id or a mention (`<@id>`, `<@!id>`).
pub fn parse_player_id(raw: &str) -> Result<String, CommandError> {
    let trimmed = raw.trim();
    let id = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.strip_prefix('!').unwrap_or(inner))
        .unwrap_or(trimmed);
    if is_snowflake(id) {
        Ok(id.to_string())
    } else {
        Err(CommandError::InvalidArgument(format!(
            "`{raw}` is not a player ID or mention"
        )))
    }
}

/// A validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fish,
    Leaderboard(SortKey),
    Levels,
    Money,
    Help,
    ModHelp,
    ResetFisher { player_id: String, field: ResetField },
    DeleteFisher { player_id: String },
    DeleteAllFishers,
}

impl Command {
    /// Whether the named command needs moderator tier. Checked before
    /// arguments are parsed.
    pub fn is_moderator_only(name: &str) -> bool {
        matches!(name, "reset-fisher" | "delete-fisher" | "delete-all-fishers")
    }

    pub fn parse(invocation: &Invocation) -> Result<Self, CommandError> {
        let command = match invocation.name.as_str() {
            "fish" => Command::Fish,
            "leaderboard" => {
                let sort = match invocation.get("sort") {
                    Some(raw) => raw.parse()?,
                    None => SortKey::Money,
                };
                Command::Leaderboard(sort)
            }
            "levels" => Command::Levels,
            "money" => Command::Money,
            "help" => Command::Help,
            "modhelp" => Command::ModHelp,
            "reset-fisher" => Command::ResetFisher {
                player_id: parse_player_id(invocation.require("player_id")?)?,
                field: invocation.require("state")?.parse()?,
            },
            "delete-fisher" => Command::DeleteFisher {
                player_id: parse_player_id(invocation.require("player_id")?)?,
            },
            "delete-all-fishers" => Command::DeleteAllFishers,
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("missing argument `{0}`")]
    MissingArgument(&'static str),
    #[error("`/{0}` is for moderators only")]
    PermissionDenied(String),
    #[error("no fisher with ID {0}")]
    NotFound(String),
    #[error("unknown command `/{0}`")]
    UnknownCommand(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The command never reached a handler (malformed interaction, crashed
    /// task).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// The user-visible reply for this error. Store failures are not
    /// described to the user.
    pub fn to_reply(&self) -> Reply {
        let (title, description) = match self {
            CommandError::InvalidArgument(_) | CommandError::MissingArgument(_) => {
                ("Invalid input", self.to_string())
            }
            CommandError::PermissionDenied(_) => ("Permission denied", self.to_string()),
            CommandError::NotFound(id) => (
                "Player not found",
                format!("No fisher with ID \"{id}\". Please check the player ID entered."),
            ),
            CommandError::UnknownCommand(_) => ("Unknown command", self.to_string()),
            CommandError::Store(_) => (
                "Something went wrong",
                "The fishing records are unavailable right now. Please try again later."
                    .to_string(),
            ),
            CommandError::Internal(_) => (
                "Something went wrong",
                "Your command could not be processed. Please try again later.".to_string(),
            ),
        };
        Reply::new(title, RED).description(description).ephemeral()
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A rendered command result. The Discord layer turns this into an embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<(String, String)>,
    pub color: u32,
    pub ephemeral: bool,
}

impl Reply {
    fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields: Vec::new(),
            color,
            ephemeral: false,
        }
    }

    fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

/// `1234567` -> `1,234,567`.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Order records for a leaderboard and keep the top [`LEADERBOARD_SIZE`].
///
/// Money: balance descending. Level: level descending, then experience
/// descending. Remaining ties go to the lower `player_id`.
pub fn rank(mut records: Vec<PlayerRecord>, sort: SortKey) -> Vec<PlayerRecord> {
    match sort {
        SortKey::Money => records.sort_by(|a, b| {
            b.money
                .cmp(&a.money)
                .then_with(|| a.player_id.cmp(&b.player_id))
        }),
        SortKey::Level => records.sort_by(|a, b| {
            b.level()
                .cmp(&a.level())
                .then_with(|| b.experience.cmp(&a.experience))
                .then_with(|| a.player_id.cmp(&b.player_id))
        }),
    }
    records.truncate(LEADERBOARD_SIZE);
    records
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// The game: a player store plus a random source, shared by every command.
pub struct Fishery<S, R = StdRng> {
    store: S,
    rng: Mutex<R>,
}

impl<S: PlayerStore> Fishery<S, StdRng> {
    /// Production constructor, seeding the RNG from OS entropy.
    pub fn with_entropy(store: S) -> Self {
        Self::new(store, StdRng::from_entropy())
    }
}

impl<S, R> Fishery<S, R>
where
    S: PlayerStore,
    R: RngCore + Send,
{
    pub fn new(store: S, rng: R) -> Self {
        Self {
            store,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run an invocation to completion. Never fails: errors become replies.
    pub fn dispatch(&self, invocation: &Invocation) -> Reply {
        info!(
            command = %invocation.name,
            caller = %invocation.caller.id,
            "dispatching command"
        );
        match self.run(invocation) {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    CommandError::Store(inner) => {
                        error!(command = %invocation.name, error = %inner, "store failure");
                    }
                    other => {
                        warn!(command = %invocation.name, error = %other, "command rejected");
                    }
                }
                e.to_reply()
            }
        }
    }

    fn run(&self, invocation: &Invocation) -> Result<Reply, CommandError> {
        if Command::is_moderator_only(&invocation.name) && !invocation.caller.is_moderator {
            return Err(CommandError::PermissionDenied(invocation.name.clone()));
        }

        match Command::parse(invocation)? {
            Command::Fish => self.fish(&invocation.caller),
            Command::Leaderboard(sort) => self.leaderboard(sort),
            Command::Levels => self.levels(&invocation.caller),
            Command::Money => self.money(&invocation.caller),
            Command::Help => Ok(help()),
            Command::ModHelp => Ok(mod_help()),
            Command::ResetFisher { player_id, field } => self.reset_fisher(&player_id, field),
            Command::DeleteFisher { player_id } => self.delete_fisher(&player_id),
            Command::DeleteAllFishers => self.delete_all_fishers(&invocation.caller),
        }
    }

    fn roll(&self, level: u32) -> Catch {
        // A panic mid-roll cannot leave the RNG in a bad state, so a
        // poisoned lock is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        reward::catch(&mut *rng, level)
    }

    fn fish(&self, caller: &Caller) -> Result<Reply, CommandError> {
        let (record, (previous_level, catch)) = self.store.update(&caller.id, |record| {
            let level = record.level();
            let catch = self.roll(level);
            record.money = record.money.saturating_add(catch.money);
            record.experience = record.experience.saturating_add(catch.experience);
            record.catches = record.catches.saturating_add(1);
            (level, catch)
        })?;

        info!(
            player_id = %caller.id,
            fish = catch.fish.name,
            rarity = %catch.rarity,
            money = catch.money,
            experience = catch.experience,
            "caught"
        );

        let mut reply = Reply::new("You've Caught:", catch.rarity.color()).field(
            format!("{}\n{}", catch.fish.name, catch.fish.description),
            format!(
                "Rarity : **{}**\nWeight : **{:.2} KG**\nGold Earned : **{}$**\nXP Earned : **{} XP**",
                catch.rarity,
                catch.weight_kg,
                thousands(catch.money),
                thousands(catch.experience),
            ),
        );
        let level = record.level();
        if level > previous_level {
            reply = reply.description(format!(
                "Level up! You are now **level {}** ({} league).",
                level,
                record.league()
            ));
        }
        Ok(reply)
    }

    fn leaderboard(&self, sort: SortKey) -> Result<Reply, CommandError> {
        let ranked = rank(self.store.list_all()?, sort);
        let lines: Vec<String> = ranked
            .iter()
            .enumerate()
            .map(|(i, r)| match sort {
                SortKey::Money => format!("{}. <@{}> - **{}$**", i + 1, r.player_id, thousands(r.money)),
                SortKey::Level => format!(
                    "{}. <@{}> - **Level {}** ({} XP)",
                    i + 1,
                    r.player_id,
                    r.level(),
                    thousands(r.experience)
                ),
            })
            .collect();
        let body = if lines.is_empty() {
            "No data available".to_string()
        } else {
            lines.join("\n")
        };
        let sort_label = match sort {
            SortKey::Money => "Money",
            SortKey::Level => "Level",
        };
        Ok(Reply::new("Leaderboard", PURPLE)
            .description(format!(
                "Here is the current leaderboard sorted by {sort_label}:"
            ))
            .field("Top Players", body))
    }

    fn levels(&self, caller: &Caller) -> Result<Reply, CommandError> {
        let record = self.store.get_or_create(&caller.id)?;
        let level = record.level();
        let next = match progression::next_level_at(level) {
            Some(at) => format!("{} XP", thousands(at.saturating_sub(record.experience))),
            None => "max level reached".to_string(),
        };
        Ok(Reply::new("Your Levels", PURPLE)
            .description(format!(
                "**Level :** {}\n**Levels XP :** {} XP\n**League :** {}\n**Next level in :** {}",
                level,
                thousands(record.experience),
                record.league(),
                next
            ))
            .ephemeral())
    }

    fn money(&self, caller: &Caller) -> Result<Reply, CommandError> {
        let record = self.store.get_or_create(&caller.id)?;
        Ok(Reply::new("Your Money in the Bank", PURPLE)
            .description(format!(
                "**Money :** {}$\n**Fish caught :** {}",
                thousands(record.money),
                thousands(record.catches)
            ))
            .ephemeral())
    }

    fn reset_fisher(&self, player_id: &str, field: ResetField) -> Result<Reply, CommandError> {
        let reset = self.store.update_existing(player_id, |record| match field {
            ResetField::Money => record.money = 0,
            ResetField::Level => record.experience = 0,
        })?;
        if reset.is_none() {
            return Err(CommandError::NotFound(player_id.to_string()));
        }
        info!(player_id, field = %field, "reset fisher");
        Ok(Reply::new(
            format!("Player with ID \"{player_id}\" {field} was reset successfully."),
            GREEN,
        )
        .ephemeral())
    }

    fn delete_fisher(&self, player_id: &str) -> Result<Reply, CommandError> {
        if !self.store.delete(player_id)? {
            return Err(CommandError::NotFound(player_id.to_string()));
        }
        info!(player_id, "deleted fisher");
        Ok(Reply::new(
            format!("Player with ID \"{player_id}\" has been deleted successfully."),
            GREEN,
        )
        .ephemeral())
    }

    fn delete_all_fishers(&self, caller: &Caller) -> Result<Reply, CommandError> {
        let removed = self.store.delete_all()?;
        warn!(moderator = %caller.id, removed, "deleted all fishers");
        Ok(Reply::new("All players data has been deleted successfully.", GREEN)
            .description(format!("Removed {removed} fisher record(s)."))
            .ephemeral())
    }
}

fn help() -> Reply {
    PLAYER_COMMANDS.iter().fold(
        Reply::new("Fishing Game Commands", BLUE)
            .description("Here is a list of available commands for regular users:")
            .ephemeral(),
        |reply, (name, text)| reply.field(format!("/{name}"), *text),
    )
}

fn mod_help() -> Reply {
    MODERATOR_COMMANDS.iter().fold(
        Reply::new("Moderator Commands", ORANGE)
            .description("Here is a list of available commands for moderators:")
            .ephemeral(),
        |reply, (name, text)| reply.field(format!("/{name}"), *text),
    )
}
