//! Lobby mode aggregator
//!
//! Clients pick a game mode; the first pick locks the contested mode along
//! with its quorum and scene set. Once enough clients have picked the locked
//! mode the game starts, exactly once.

use crate::config::ModeRule;
use crate::world::{Entity, World};
use log::info;
use shared::{
    Broadcast, ClientId, EntityId, FieldSet, FieldUpdate, GameMode, LobbyFields, Role, SyncError,
    SyncResult,
};

#[derive(Debug)]
pub struct Lobby {
    pub id: EntityId,
    pub fields: LobbyFields,
    /// One pick per client, in the order clients first picked.
    picks: Vec<(ClientId, GameMode)>,
    scenes: Vec<u32>,
    started: bool,
}

impl Lobby {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            fields: LobbyFields::new(Role::Authority),
            picks: Vec::new(),
            scenes: Vec::new(),
            started: false,
        }
    }

    pub fn locked_mode(&self) -> Option<GameMode> {
        *self.fields.current_mode.get()
    }

    pub fn pick_count(&self) -> i32 {
        *self.fields.player_pick_count.get()
    }

    pub fn required_count(&self) -> i32 {
        *self.fields.required_count.get()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn pick_of(&self, client: ClientId) -> Option<GameMode> {
        self.picks
            .iter()
            .find(|(c, _)| *c == client)
            .map(|(_, mode)| *mode)
    }

    /// Records a pick. A client picking again replaces its earlier pick.
    pub fn record_pick(&mut self, client: ClientId, mode: GameMode, rule: ModeRule) -> SyncResult<()> {
        match self.picks.iter_mut().find(|(c, _)| *c == client) {
            Some(entry) => entry.1 = mode,
            None => self.picks.push((client, mode)),
        }

        if self.locked_mode().is_none() {
            info!(
                "Lobby locked to {:?}, {} players required",
                mode, rule.required_players
            );
            self.fields.current_mode.set(Some(mode))?;
            self.fields.required_count.set(rule.required_players as i32)?;
            self.scenes = rule.scenes;
        }
        Ok(())
    }

    pub fn remove_client(&mut self, client: ClientId) -> bool {
        let before = self.picks.len();
        self.picks.retain(|(c, _)| *c != client);
        self.picks.len() != before
    }

    fn locked_pickers(&self) -> impl Iterator<Item = ClientId> + '_ {
        let locked = self.locked_mode();
        self.picks
            .iter()
            .filter(move |(_, mode)| Some(*mode) == locked)
            .map(|(client, _)| *client)
    }

    /// Recounts picks of the locked mode. Returns the scene set to load when
    /// this recount is the one that reaches the quorum.
    pub fn recompute(&mut self) -> SyncResult<Option<Vec<u32>>> {
        if self.locked_mode().is_none() {
            return Ok(None);
        }

        let count = self.locked_pickers().count() as i32;
        self.fields.player_pick_count.set(count)?;

        if !self.started && count >= self.required_count() {
            self.started = true;
            return Ok(Some(self.scenes.clone()));
        }
        Ok(None)
    }

    /// Team index for `client`. Free-for-all has no teams; other modes
    /// alternate between two teams in pick order.
    pub fn team_of(&self, client: ClientId) -> Option<u32> {
        match self.locked_mode() {
            None | Some(GameMode::FreeForAll) => None,
            Some(_) => self
                .locked_pickers()
                .position(|c| c == client)
                .map(|index| index as u32 % 2),
        }
    }

    pub fn drain_updates(&mut self, out: &mut Vec<FieldUpdate>) {
        self.fields.drain_updates(self.id, out);
    }
}

impl World {
    pub fn pick_mode(&mut self, sender: ClientId, mode: GameMode) -> SyncResult<()> {
        let rule = self.config.mode_rule(mode);
        self.lobby.record_pick(sender, mode, rule)?;
        info!("Client {} picked {:?}", sender, mode);
        self.refresh_lobby()
    }

    /// Recounts picks, loads the scene set on the first quorum, and tells
    /// everyone where the lobby stands.
    pub fn refresh_lobby(&mut self) -> SyncResult<()> {
        let lobby_id = self.lobby.id;
        if let Some(scenes) = self.lobby.recompute()? {
            info!("Lobby quorum reached, loading scenes {:?}", scenes);
            for (index, scene) in scenes.into_iter().enumerate() {
                self.session.broadcast(
                    lobby_id,
                    Broadcast::LoadScene {
                        scene,
                        additive: index > 0,
                    },
                );
            }
        }

        self.session.broadcast(
            lobby_id,
            Broadcast::UpdateLobbyStatus {
                server_up: true,
                mode: self.lobby.locked_mode(),
                waiting: self.lobby.pick_count().max(0) as u32,
            },
        );
        Ok(())
    }

    /// Gives the sender a player once the game has started.
    pub fn request_spawn(&mut self, sender: ClientId, target: EntityId) -> SyncResult<Option<EntityId>> {
        match self.entities.get(&target) {
            Some(Entity::Lobby) => {}
            Some(_) => {
                return Err(SyncError::WrongEntityKind {
                    entity: target,
                    expected: "lobby",
                })
            }
            None => return Err(SyncError::StaleReference(target)),
        }

        if !self.lobby.is_started() || self.player_of(sender).is_some() {
            return Ok(None);
        }
        Ok(Some(self.spawn_player(sender)))
    }

    pub fn team_of(&self, client: ClientId) -> Option<u32> {
        self.lobby.team_of(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(required: u32) -> ModeRule {
        ModeRule {
            required_players: required,
            scenes: vec![1, 3],
        }
    }

    #[test]
    fn test_first_pick_locks_mode() {
        let mut lobby = Lobby::new(EntityId(1));
        lobby.record_pick(1, GameMode::Teams, rule(2)).unwrap();
        lobby.record_pick(2, GameMode::CaptureTheFlag, rule(4)).unwrap();

        assert_eq!(lobby.locked_mode(), Some(GameMode::Teams));
        assert_eq!(lobby.required_count(), 2);
        assert_eq!(lobby.recompute().unwrap(), None);
        assert_eq!(lobby.pick_count(), 1);
    }

    #[test]
    fn test_quorum_starts_once() {
        let mut lobby = Lobby::new(EntityId(1));
        lobby.record_pick(1, GameMode::Teams, rule(2)).unwrap();
        assert_eq!(lobby.recompute().unwrap(), None);

        lobby.record_pick(2, GameMode::Teams, rule(2)).unwrap();
        assert_eq!(lobby.recompute().unwrap(), Some(vec![1, 3]));
        assert!(lobby.is_started());

        lobby.record_pick(3, GameMode::Teams, rule(2)).unwrap();
        assert_eq!(lobby.recompute().unwrap(), None);
        assert_eq!(lobby.pick_count(), 3);

        assert!(lobby.remove_client(1));
        assert_eq!(lobby.recompute().unwrap(), None);
        assert_eq!(lobby.pick_count(), 2);
    }

    #[test]
    fn test_repick_replaces_and_disconnect_recounts() {
        let mut lobby = Lobby::new(EntityId(1));
        lobby.record_pick(1, GameMode::Teams, rule(3)).unwrap();
        lobby.record_pick(2, GameMode::Teams, rule(3)).unwrap();
        lobby.recompute().unwrap();
        assert_eq!(lobby.pick_count(), 2);

        lobby.record_pick(2, GameMode::FreeForAll, rule(2)).unwrap();
        lobby.recompute().unwrap();
        assert_eq!(lobby.pick_count(), 1);
        assert_eq!(lobby.pick_of(2), Some(GameMode::FreeForAll));

        assert!(lobby.remove_client(1));
        lobby.recompute().unwrap();
        assert_eq!(lobby.pick_count(), 0);
        assert!(!lobby.remove_client(1));
    }

    #[test]
    fn test_team_assignment() {
        let mut lobby = Lobby::new(EntityId(1));
        assert_eq!(lobby.team_of(1), None);

        lobby.record_pick(5, GameMode::Teams, rule(4)).unwrap();
        lobby.record_pick(6, GameMode::FreeForAll, rule(4)).unwrap();
        lobby.record_pick(7, GameMode::Teams, rule(4)).unwrap();
        lobby.record_pick(8, GameMode::Teams, rule(4)).unwrap();

        assert_eq!(lobby.team_of(5), Some(0));
        assert_eq!(lobby.team_of(7), Some(1));
        assert_eq!(lobby.team_of(8), Some(0));
        assert_eq!(lobby.team_of(6), None);
    }

    #[test]
    fn test_free_for_all_has_no_teams() {
        let mut lobby = Lobby::new(EntityId(1));
        lobby.record_pick(1, GameMode::FreeForAll, rule(2)).unwrap();
        assert_eq!(lobby.team_of(1), None);
    }
}
