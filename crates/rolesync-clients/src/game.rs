//! Game-data REST client.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use rolesync_core::errors::FetchError;
use rolesync_core::game::{ClanWar, GamePlayer, PlayerClan, WarState};
use rolesync_core::ids::{ClanTag, PlayerTag};
use rolesync_core::sources::GameClient;

pub struct GameApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GameApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, FetchError> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlayer {
    tag: String,
    name: String,
    town_hall_level: u32,
    town_hall_weapon_level: Option<u32>,
    builder_hall_level: Option<u32>,
    #[serde(default)]
    trophies: u32,
    league: Option<ApiId>,
    builder_base_league: Option<ApiId>,
    clan: Option<ApiClan>,
    role: Option<String>,
    #[serde(default)]
    heroes: Vec<ApiHero>,
}

#[derive(Deserialize)]
struct ApiId {
    id: u32,
}

#[derive(Deserialize)]
struct ApiClan {
    tag: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct ApiHero {
    level: u32,
    #[serde(default)]
    village: String,
}

#[derive(Deserialize)]
struct ApiWar {
    state: WarState,
    clan: Option<ApiWarClan>,
}

#[derive(Deserialize)]
struct ApiWarClan {
    tag: String,
    #[serde(default)]
    members: Vec<ApiWarMember>,
}

#[derive(Deserialize)]
struct ApiWarMember {
    tag: String,
}

impl From<ApiPlayer> for GamePlayer {
    fn from(p: ApiPlayer) -> Self {
        GamePlayer {
            tag: PlayerTag::new(&p.tag),
            name: p.name,
            town_hall_level: p.town_hall_level,
            town_hall_weapon_level: p.town_hall_weapon_level,
            builder_hall_level: p.builder_hall_level,
            trophies: p.trophies,
            league_id: p.league.map(|l| l.id),
            builder_league_id: p.builder_base_league.map(|l| l.id),
            clan: p.clan.map(|c| PlayerClan {
                tag: ClanTag::new(&c.tag),
                name: c.name,
            }),
            role: p.role,
            hero_levels: p
                .heroes
                .into_iter()
                .filter(|h| h.village.is_empty() || h.village == "home")
                .map(|h| h.level)
                .collect(),
        }
    }
}

#[async_trait]
impl GameClient for GameApiClient {
    #[instrument(skip(self), fields(tag = %tag))]
    async fn player(&self, tag: &PlayerTag) -> Result<Option<GamePlayer>, FetchError> {
        let response = self.get(&format!("/players/{}", tag.encoded())).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("player not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), body));
        }
        let player: ApiPlayer = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(Some(player.into()))
    }

    #[instrument(skip(self), fields(clan_tag = %clan))]
    async fn current_wars(&self, clan: &ClanTag) -> Result<Vec<ClanWar>, FetchError> {
        let response = self
            .get(&format!("/clans/{}/currentwar", clan.encoded()))
            .await?;
        let status = response.status();
        // Private war log or unknown clan: nothing to report.
        if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), body));
        }
        let war: ApiWar = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        if !war.state.is_active() {
            return Ok(Vec::new());
        }
        let Some(side) = war.clan else {
            return Ok(Vec::new());
        };
        Ok(vec![ClanWar {
            state: war.state,
            clan_tag: ClanTag::new(&side.tag),
            member_tags: side.members.iter().map(|m| PlayerTag::new(&m.tag)).collect(),
        }])
    }
}
