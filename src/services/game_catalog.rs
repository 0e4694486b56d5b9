//! Game references accepted when creating a lobby.

use std::{collections::HashSet, sync::Arc};

use uuid::Uuid;

/// External catalog of games lobbies can be opened for.
pub trait GameCatalog: Send + Sync {
    fn contains(&self, game_id: Uuid) -> bool;
}

/// Accepts every game id.
pub struct OpenCatalog;

impl GameCatalog for OpenCatalog {
    fn contains(&self, _game_id: Uuid) -> bool {
        true
    }
}

/// Fixed list of known games.
pub struct StaticCatalog {
    games: HashSet<Uuid>,
}

impl StaticCatalog {
    pub fn new(games: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            games: games.into_iter().collect(),
        }
    }
}

impl GameCatalog for StaticCatalog {
    fn contains(&self, game_id: Uuid) -> bool {
        self.games.contains(&game_id)
    }
}

/// Catalog matching the configured game list.
pub fn from_settings(games: Option<&[Uuid]>) -> Arc<dyn GameCatalog> {
    match games {
        Some(games) => Arc::new(StaticCatalog::new(games.iter().copied())),
        None => Arc::new(OpenCatalog),
    }
}
