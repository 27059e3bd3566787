//! Discord-facing handlers.
//!
//! Translates gateway events into router calls and router replies back into
//! interaction responses. Game rules live in [`crate::commands`]; this module
//! only deals with the Discord wire shapes.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bot::{BotState, Context, Game};
use crate::commands::{
    Caller, CommandError, Invocation, Reply, MODERATOR_COMMANDS, PLAYER_COMMANDS,
};
use crate::config::{BotConfig, CommandScope};
use crate::http::{DiscordHttpClient, HttpError};
use crate::types::*;

// ---------------------------------------------------------------------------
// Slash command definitions
// ---------------------------------------------------------------------------

fn describe(name: &str) -> &'static str {
    PLAYER_COMMANDS
        .iter()
        .chain(MODERATOR_COMMANDS)
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
        .unwrap_or("")
}

/// Every command the bot registers. Moderator commands are hidden from
/// members without Manage Server; the router re-checks on every call.
pub fn slash_commands() -> Vec<ApplicationCommand> {
    let chat = |name: &str| ApplicationCommand::chat_input(name, describe(name));
    let state_choices = ["money", "level"];
    vec![
        chat("fish"),
        chat("leaderboard").string_option("sort", "Sort by money or level", false, &state_choices),
        chat("levels"),
        chat("money"),
        chat("help"),
        chat("modhelp"),
        chat("reset-fisher")
            .string_option("player_id", "The player's ID or mention", true, &[])
            .string_option("state", "What to reset", true, &state_choices)
            .require_permissions(Permissions::MANAGE_GUILD),
        chat("delete-fisher")
            .string_option("player_id", "The player's ID or mention", true, &[])
            .require_permissions(Permissions::MANAGE_GUILD),
        chat("delete-all-fishers").require_permissions(Permissions::MANAGE_GUILD),
    ]
}

// ---------------------------------------------------------------------------
// READY
// ---------------------------------------------------------------------------

/// Register slash commands once per application.
pub async fn on_ready(
    state: &mut BotState,
    http: &DiscordHttpClient,
    config: &BotConfig,
    ready: &ReadyEvent,
) {
    info!(user = %ready.user.tag(), guilds = ready.guilds.len(), "bot is ready!");
    let app_id = ready.application.id.clone();

    if state.commands_registered_for.as_deref() == Some(app_id.as_str()) {
        debug!("slash commands already registered this run");
        return;
    }
    match register_commands(http, config, &app_id).await {
        Ok(()) => state.commands_registered_for = Some(app_id),
        Err(e) => warn!(error = %e, "failed to register slash commands"),
    }
}

/// Register in the configured scope and clear the other one so commands
/// never show up twice.
async fn register_commands(
    http: &DiscordHttpClient,
    config: &BotConfig,
    app_id: &str,
) -> Result<(), HttpError> {
    let commands = slash_commands();
    match config.command_scope {
        CommandScope::Global => {
            let registered = http.bulk_overwrite_global_commands(app_id, &commands).await?;
            info!(count = registered.len(), "registered global slash commands");
            for guild_id in &config.dev_guild_ids {
                match http.bulk_overwrite_guild_commands(app_id, guild_id, &[]).await {
                    Ok(_) => debug!(guild_id = %guild_id, "cleared guild commands"),
                    Err(e) => warn!(guild_id = %guild_id, error = %e, "failed to clear guild commands"),
                }
            }
        }
        CommandScope::Guild => {
            for guild_id in &config.dev_guild_ids {
                let registered = http
                    .bulk_overwrite_guild_commands(app_id, guild_id, &commands)
                    .await?;
                info!(guild_id = %guild_id, count = registered.len(), "registered guild slash commands");
            }
            if let Err(e) = http.bulk_overwrite_global_commands(app_id, &[]).await {
                warn!(error = %e, "failed to clear global commands");
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// INTERACTION_CREATE
// ---------------------------------------------------------------------------

pub async fn on_interaction(ctx: &Context, interaction: Interaction) -> Result<(), HttpError> {
    let response = match interaction.kind {
        InteractionType::Ping => InteractionResponse {
            kind: InteractionCallbackType::Pong,
            data: None,
        },
        InteractionType::ApplicationCommand => {
            render(command_reply(&ctx.fishery, &ctx.moderator_role_ids, &interaction).await)
        }
        other => {
            debug!(kind = ?other, "ignoring interaction");
            return Ok(());
        }
    };

    ctx.http
        .create_interaction_response(&interaction.id, &interaction.token, &response)
        .await
}

/// Run a slash command and produce its reply. Malformed interactions and
/// crashed command tasks still get a generic error reply.
pub async fn command_reply(
    fishery: &Arc<Game>,
    moderator_role_ids: &[Snowflake],
    interaction: &Interaction,
) -> Reply {
    let Some(invocation) = invocation_from(interaction, moderator_role_ids) else {
        warn!(interaction_id = %interaction.id, "slash command without name or author");
        return CommandError::Internal("slash command without name or author".to_string())
            .to_reply();
    };
    let fishery = Arc::clone(fishery);
    // The store is synchronous; keep it off the reactor threads.
    match tokio::task::spawn_blocking(move || fishery.dispatch(&invocation)).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(interaction_id = %interaction.id, error = %e, "command task failed");
            CommandError::Internal(e.to_string()).to_reply()
        }
    }
}

/// Build a router invocation. `None` if the interaction has no command name
/// or no author.
pub fn invocation_from(interaction: &Interaction, moderator_role_ids: &[Snowflake]) -> Option<Invocation> {
    let data = interaction.data.as_ref()?;
    let name = data.name.clone()?;
    let author = interaction.author()?;

    let caller = Caller {
        id: author.id.clone(),
        is_moderator: is_moderator(interaction.member.as_ref(), moderator_role_ids),
    };
    let options = data
        .options
        .iter()
        .filter_map(|opt| Some((opt.name.clone(), opt.value_as_string()?)))
        .collect();

    Some(Invocation {
        name,
        caller,
        options,
    })
}

/// Administrators, members with Manage Server, and holders of a configured
/// moderator role. Outside a guild nobody is a moderator.
fn is_moderator(member: Option<&GuildMember>, moderator_role_ids: &[Snowflake]) -> bool {
    let Some(member) = member else {
        return false;
    };
    member
        .permissions()
        .intersects(Permissions::ADMINISTRATOR | Permissions::MANAGE_GUILD)
        || member.roles.iter().any(|r| moderator_role_ids.contains(r))
}

/// Render a router reply as an embed message.
pub fn render(reply: Reply) -> InteractionResponse {
    let mut embed = Embed::new()
        .title(reply.title)
        .color(reply.color)
        .timestamp(chrono::Utc::now().to_rfc3339());
    if let Some(description) = reply.description {
        embed = embed.description(description);
    }
    for (name, value) in reply.fields {
        embed = embed.field(name, value, false);
    }
    InteractionResponse {
        kind: InteractionCallbackType::ChannelMessageWithSource,
        data: Some(InteractionCallbackData {
            embeds: Some(vec![embed]),
            flags: reply.ephemeral.then(|| MessageFlags::EPHEMERAL.bits()),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Fishery;
    use crate::store::{PlayerStore, SqliteStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::HashSet;

    fn interaction(value: serde_json::Value) -> Interaction {
        serde_json::from_value(value).unwrap()
    }

    fn guild_command(name: &str, permissions: &str, roles: &[&str]) -> Interaction {
        interaction(json!({
            "id": "10", "application_id": "20", "type": 2, "token": "tok",
            "guild_id": "30", "channel_id": "40",
            "data": {
                "name": name,
                "options": [
                    { "name": "player_id", "type": 3, "value": "<@99>" },
                    { "name": "state", "type": 3, "value": "money" }
                ]
            },
            "member": {
                "user": { "id": "50", "username": "carol", "discriminator": "0",
                          "avatar": null, "global_name": null },
                "roles": roles,
                "permissions": permissions
            }
        }))
    }

    #[test]
    fn slash_command_names_are_unique() {
        let cmds = slash_commands();
        let names: HashSet<_> = cmds.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), cmds.len());
        assert_eq!(cmds.len(), PLAYER_COMMANDS.len() + MODERATOR_COMMANDS.len());
    }

    #[test]
    fn slash_commands_all_have_descriptions() {
        for cmd in slash_commands() {
            assert!(!cmd.description.is_empty(), "{} has no description", cmd.name);
            assert!(cmd.description.len() <= 100, "{} description too long", cmd.name);
        }
    }

    #[test]
    fn destructive_commands_need_manage_guild() {
        for cmd in slash_commands() {
            let gated = cmd.default_member_permissions.as_deref() == Some("32");
            let expected = matches!(
                cmd.name.as_str(),
                "reset-fisher" | "delete-fisher" | "delete-all-fishers"
            );
            assert_eq!(gated, expected, "{}", cmd.name);
        }
    }

    #[test]
    fn reset_fisher_has_required_options() {
        let cmds = slash_commands();
        let reset = cmds.iter().find(|c| c.name == "reset-fisher").unwrap();
        let names: Vec<_> = reset.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["player_id", "state"]);
        assert!(reset.options.iter().all(|o| o.required));
    }

    #[test]
    fn invocation_carries_options_and_author() {
        let inv = invocation_from(&guild_command("reset-fisher", "0", &[]), &[]).unwrap();
        assert_eq!(inv.name, "reset-fisher");
        assert_eq!(inv.caller.id, "50");
        assert!(!inv.caller.is_moderator);
        assert_eq!(
            inv.options,
            [
                ("player_id".to_string(), "<@99>".to_string()),
                ("state".to_string(), "money".to_string())
            ]
        );
    }

    #[test]
    fn moderator_by_permission_or_role() {
        // MANAGE_GUILD = 32, ADMINISTRATOR = 8
        for perms in ["32", "8"] {
            let inv = invocation_from(&guild_command("fish", perms, &[]), &[]).unwrap();
            assert!(inv.caller.is_moderator, "permissions {perms}");
        }
        let roles = vec!["777".to_string()];
        let inv = invocation_from(&guild_command("fish", "0", &["777"]), &roles).unwrap();
        assert!(inv.caller.is_moderator);
        let inv = invocation_from(&guild_command("fish", "0", &["778"]), &roles).unwrap();
        assert!(!inv.caller.is_moderator);
    }

    #[test]
    fn direct_message_callers_are_never_moderators() {
        let dm = interaction(json!({
            "id": "10", "application_id": "20", "type": 2, "token": "tok",
            "data": { "name": "delete-all-fishers" },
            "user": { "id": "50", "username": "carol", "discriminator": "0",
                      "avatar": null, "global_name": null }
        }));
        let inv = invocation_from(&dm, &[]).unwrap();
        assert_eq!(inv.caller.id, "50");
        assert!(!inv.caller.is_moderator);
    }

    #[test]
    fn missing_name_yields_no_invocation() {
        let bad = interaction(json!({
            "id": "10", "application_id": "20", "type": 2, "token": "tok",
            "data": { "options": [] },
            "user": { "id": "50", "username": "carol", "discriminator": "0",
                      "avatar": null, "global_name": null }
        }));
        assert!(invocation_from(&bad, &[]).is_none());
    }

    #[test]
    fn render_sets_ephemeral_flag_for_private_replies() {
        let fishery = Fishery::new(SqliteStore::in_memory().unwrap(), StdRng::seed_from_u64(3));
        let inv = invocation_from(&guild_command("money", "0", &[]), &[]).unwrap();
        let response = render(fishery.dispatch(&inv));

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], 4);
        assert_eq!(value["data"]["flags"], 64);
        assert_eq!(value["data"]["embeds"][0]["title"], "Your Money in the Bank");
    }

    #[test]
    fn render_public_reply_has_no_flags() {
        let fishery = Fishery::new(SqliteStore::in_memory().unwrap(), StdRng::seed_from_u64(3));
        let inv = invocation_from(&guild_command("fish", "0", &[]), &[]).unwrap();
        let response = render(fishery.dispatch(&inv));

        let value = serde_json::to_value(&response).unwrap();
        assert!(value["data"].get("flags").is_none());
        assert_eq!(value["data"]["embeds"][0]["fields"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn command_without_author_still_gets_an_error_reply() {
        let fishery = Arc::new(Fishery::new(
            SqliteStore::in_memory().unwrap(),
            StdRng::seed_from_u64(3),
        ));
        let orphan = interaction(json!({
            "id": "10", "application_id": "20", "type": 2, "token": "tok",
            "data": { "name": "fish" }
        }));

        let reply = command_reply(&fishery, &[], &orphan).await;
        assert_eq!(reply.title, "Something went wrong");
        let value = serde_json::to_value(render(reply)).unwrap();
        assert_eq!(value["type"], 4);
        assert_eq!(value["data"]["flags"], 64);
        assert!(fishery.store().list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn command_reply_runs_the_game() {
        let fishery = Arc::new(Fishery::new(
            SqliteStore::in_memory().unwrap(),
            StdRng::seed_from_u64(3),
        ));
        let reply = command_reply(&fishery, &[], &guild_command("fish", "0", &[])).await;
        assert_eq!(reply.title, "You've Caught:");
        assert_eq!(fishery.store().get("50").unwrap().unwrap().catches, 1);
    }

    #[test]
    fn non_moderator_destructive_call_renders_error() {
        let fishery = Fishery::new(SqliteStore::in_memory().unwrap(), StdRng::seed_from_u64(3));
        let inv = invocation_from(&guild_command("delete-all-fishers", "0", &[]), &[]).unwrap();
        let value = serde_json::to_value(render(fishery.dispatch(&inv))).unwrap();
        assert_eq!(value["data"]["embeds"][0]["title"], "Permission denied");
        assert_eq!(value["data"]["flags"], 64);
    }
}
