//! Chat-platform REST directory.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use rolesync_core::directory::{BotPermissions, GuildInfo, GuildMember, MemberEdit, NicknameEdit};
use rolesync_core::errors::DirectoryError;
use rolesync_core::ids::{GuildId, RoleId, UserId};
use rolesync_core::sources::MemberDirectory;

const ADMINISTRATOR: u64 = 1 << 3;
const MANAGE_NICKNAMES: u64 = 1 << 27;
const MANAGE_ROLES: u64 = 1 << 28;

/// Platform maximum for one member-list page.
const MAX_PAGE_SIZE: usize = 1000;

pub struct DiscordDirectory {
    client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: usize,
    bot_user: OnceCell<UserId>,
}

#[derive(Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct ApiMember {
    user: ApiUser,
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Deserialize)]
struct ApiRole {
    id: String,
    position: i64,
    #[serde(default)]
    permissions: String,
}

#[derive(Deserialize)]
struct ApiGuild {
    id: String,
    owner_id: String,
    #[serde(default)]
    roles: Vec<ApiRole>,
}

impl From<ApiMember> for GuildMember {
    fn from(m: ApiMember) -> Self {
        GuildMember {
            user_id: UserId::from_raw(m.user.id),
            username: m.user.username,
            display_name: m.user.global_name,
            nickname: m.nick,
            roles: m.roles.into_iter().map(RoleId::from_raw).collect(),
            bot: m.user.bot,
        }
    }
}

impl DiscordDirectory {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            page_size: MAX_PAGE_SIZE,
            bot_user: OnceCell::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, DirectoryError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::from_status(status.as_u16(), body));
        }
        response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    async fn bot_user_id(&self) -> Result<&UserId, DirectoryError> {
        self.bot_user
            .get_or_try_init(|| async {
                let me: ApiUser = self.get_json("/users/@me").await?;
                Ok(UserId::from_raw(me.id))
            })
            .await
    }
}

fn parse_permissions(raw: &str) -> u64 {
    raw.parse().unwrap_or(0)
}

/// Combine the guild's role table with the bot's own role list.
fn bot_permissions(guild: &ApiGuild, bot_roles: &[String]) -> BotPermissions {
    let mut bits = 0u64;
    let mut highest = 0i64;
    for role in &guild.roles {
        // The @everyone role shares the guild's id.
        let held = role.id == guild.id || bot_roles.iter().any(|r| r == &role.id);
        if held {
            bits |= parse_permissions(&role.permissions);
            highest = highest.max(role.position);
        }
    }
    let admin = bits & ADMINISTRATOR != 0;
    BotPermissions {
        manage_roles: admin || bits & MANAGE_ROLES != 0,
        manage_nicknames: admin || bits & MANAGE_NICKNAMES != 0,
        highest_role_position: highest,
    }
}

fn edit_body(edit: &MemberEdit) -> Value {
    let mut body = Map::new();
    if let Some(roles) = &edit.roles {
        let ids: Vec<Value> = roles.iter().map(|r| Value::from(r.as_str())).collect();
        body.insert("roles".into(), Value::Array(ids));
    }
    match &edit.nickname {
        NicknameEdit::Keep => {}
        NicknameEdit::Clear => {
            body.insert("nick".into(), Value::Null);
        }
        NicknameEdit::Set(name) => {
            body.insert("nick".into(), Value::from(name.as_str()));
        }
    }
    Value::Object(body)
}

#[async_trait]
impl MemberDirectory for DiscordDirectory {
    #[instrument(skip(self), fields(guild_id = %guild))]
    async fn guild(&self, guild: &GuildId) -> Result<GuildInfo, DirectoryError> {
        let info: ApiGuild = self.get_json(&format!("/guilds/{guild}")).await?;
        let bot_id = self.bot_user_id().await?;
        let bot: ApiMember = self
            .get_json(&format!("/guilds/{guild}/members/{bot_id}"))
            .await?;
        let permissions = bot_permissions(&info, &bot.roles);
        debug!(
            manage_roles = permissions.manage_roles,
            manage_nicknames = permissions.manage_nicknames,
            highest = permissions.highest_role_position,
            "resolved bot permissions"
        );
        let role_positions: HashMap<RoleId, i64> = info
            .roles
            .iter()
            .map(|r| (RoleId::from_raw(r.id.clone()), r.position))
            .collect();
        Ok(GuildInfo {
            id: guild.clone(),
            owner_id: UserId::from_raw(info.owner_id),
            bot: permissions,
            role_positions,
        })
    }

    #[instrument(skip(self), fields(guild_id = %guild))]
    async fn members(&self, guild: &GuildId) -> Result<Vec<GuildMember>, DirectoryError> {
        let mut out = Vec::new();
        let mut after = String::from("0");
        loop {
            let page: Vec<ApiMember> = self
                .get_json(&format!(
                    "/guilds/{guild}/members?limit={}&after={after}",
                    self.page_size
                ))
                .await?;
            let len = page.len();
            if let Some(last) = page.last() {
                after = last.user.id.clone();
            }
            out.extend(page.into_iter().map(GuildMember::from));
            if len < self.page_size {
                break;
            }
        }
        debug!(count = out.len(), "listed guild members");
        Ok(out)
    }

    #[instrument(skip(self), fields(guild_id = %guild, user_id = %user))]
    async fn member(
        &self,
        guild: &GuildId,
        user: &UserId,
    ) -> Result<Option<GuildMember>, DirectoryError> {
        match self
            .get_json::<ApiMember>(&format!("/guilds/{guild}/members/{user}"))
            .await
        {
            Ok(member) => Ok(Some(member.into())),
            Err(DirectoryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, edit), fields(guild_id = %guild, user_id = %user))]
    async fn edit_member(
        &self,
        guild: &GuildId,
        user: &UserId,
        edit: &MemberEdit,
    ) -> Result<(), DirectoryError> {
        if edit.is_noop() {
            return Ok(());
        }
        let response = self
            .request(reqwest::Method::PATCH, &format!("/guilds/{guild}/members/{user}"))
            .json(&edit_body(edit))
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DirectoryError::from_status(status.as_u16(), body))
    }
}
