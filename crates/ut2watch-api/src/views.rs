//! JSON views of server status.
//!
//! Grouping and ordering are presentation policy and live only here:
//! groups by name, servers by number of listed players (most first) then
//! name, players by score (highest first) then name.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use ut2watch_state::{Registration, ServerId, ServerState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    pub groups: Vec<GroupView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupView {
    pub name: String,
    pub servers: Vec<ServerView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerView {
    pub id: ServerId,
    /// Server name, or the address while it has never answered.
    pub name: String,
    pub address: String,
    pub resolved_address: Option<String>,
    pub external_link: Option<String>,
    pub online: bool,
    pub map: String,
    pub player_count: PlayerCount,
    pub players: Vec<PlayerView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCount {
    pub current: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub name: String,
    pub score: i32,
    pub ping: u32,
}

/// Render one server. `state` is `None` until the engine first sees it.
pub fn render_server(registration: &Registration, state: Option<&ServerState>) -> ServerView {
    let mut view = ServerView {
        id: registration.id,
        name: registration.address.clone(),
        address: registration.address.clone(),
        resolved_address: state
            .and_then(|s| s.resolved_address)
            .map(|addr| addr.to_string()),
        external_link: registration.external_link.clone(),
        online: state.is_some_and(|s| s.online),
        map: String::new(),
        player_count: PlayerCount::default(),
        players: Vec::new(),
    };

    let Some(details) = state.filter(|s| s.online).and_then(|s| s.details.as_ref()) else {
        return view;
    };

    view.name = details.info.server_name.clone();
    view.map = details.info.map_name.clone();
    view.player_count = PlayerCount {
        current: details.info.current_players,
        max: details.info.max_players,
    };
    view.players = details
        .players
        .iter()
        .map(|p| PlayerView {
            name: p.name.clone(),
            score: p.score,
            ping: p.ping,
        })
        .collect();
    view.players
        .sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    view
}

/// Render the grouped status document from registry and state snapshots.
pub fn render_status(
    registrations: &[Registration],
    states: &HashMap<ServerId, ServerState>,
    include_offline: bool,
) -> StatusDocument {
    let mut groups: BTreeMap<&str, Vec<ServerView>> = BTreeMap::new();
    for registration in registrations {
        let view = render_server(registration, states.get(&registration.id));
        if !view.online && !include_offline {
            continue;
        }
        groups.entry(registration.group.as_str()).or_default().push(view);
    }

    let groups = groups
        .into_iter()
        .map(|(name, mut servers)| {
            servers.sort_by(|a, b| {
                b.players
                    .len()
                    .cmp(&a.players.len())
                    .then_with(|| a.name.cmp(&b.name))
            });
            GroupView {
                name: name.to_string(),
                servers,
            }
        })
        .collect();

    StatusDocument { groups }
}
