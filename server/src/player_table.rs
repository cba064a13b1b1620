use crate::config::SpawnBounds;
use log::info;
use rand::Rng;
use shared::{Character, ConnectionId, Player};
use std::collections::HashMap;

/// Per-room player records, keyed by owning connection
#[derive(Debug)]
pub struct PlayerTable {
    rooms: HashMap<String, HashMap<ConnectionId, Player>>,
    bounds: SpawnBounds,
    palette_size: u32,
}

impl PlayerTable {
    pub fn new(bounds: SpawnBounds, palette_size: u32) -> Self {
        Self {
            rooms: HashMap::new(),
            bounds,
            palette_size,
        }
    }

    /// Spawns a player at a random spot inside the configured bounds
    ///
    /// The character is picked from the palette by how many players the
    /// room already holds, so consecutive joiners get different sprites.
    pub fn create(&mut self, room: &str, id: ConnectionId) -> Player {
        let players = self.rooms.entry(room.to_string()).or_default();
        let character = Character::from_occupancy(players.len(), self.palette_size);

        let mut rng = rand::thread_rng();
        let x = rng.gen_range(self.bounds.min_x..=self.bounds.max_x);
        let y = rng.gen_range(self.bounds.min_y..=self.bounds.max_y);

        let player = Player::new(id, x, y, character, room);
        info!(
            "Added player {} to {} at ({:.0}, {:.0}) as {}",
            id, room, x, y, character
        );
        players.insert(id, player.clone());
        player
    }

    /// Last write wins; events for unknown players are ignored
    pub fn update(&mut self, room: &str, id: ConnectionId, x: f64, y: f64) -> Option<&Player> {
        let player = self.rooms.get_mut(room)?.get_mut(&id)?;
        player.x = x;
        player.y = y;
        Some(&*player)
    }

    pub fn remove(&mut self, room: &str, id: ConnectionId) -> Option<Player> {
        let players = self.rooms.get_mut(room)?;
        let removed = players.remove(&id);
        if players.is_empty() {
            self.rooms.remove(room);
        }
        if removed.is_some() {
            info!("Removed player {} from {}", id, room);
        }
        removed
    }

    pub fn get(&self, room: &str, id: &ConnectionId) -> Option<&Player> {
        self.rooms.get(room)?.get(id)
    }

    pub fn list_all(&self, room: &str) -> Vec<Player> {
        self.rooms
            .get(room)
            .map(|players| players.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, HashMap::len)
    }

    /// Players tracked across every room
    pub fn total(&self) -> usize {
        self.rooms.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn table() -> PlayerTable {
        PlayerTable::new(SpawnBounds::default(), 5)
    }

    #[test]
    fn test_create_spawns_inside_bounds() {
        let mut table = table();
        let bounds = SpawnBounds::default();

        for _ in 0..50 {
            let player = table.create("lobby", ConnectionId::new());
            assert!(bounds.contains(player.x, player.y));
            assert_eq!(player.room, "lobby");
        }
        assert_eq!(table.len("lobby"), 50);
    }

    #[test]
    fn test_create_with_degenerate_bounds() {
        let bounds = SpawnBounds {
            min_x: 10.0,
            max_x: 10.0,
            min_y: 20.0,
            max_y: 20.0,
        };
        let mut table = PlayerTable::new(bounds, 5);

        let player = table.create("lobby", ConnectionId::new());
        assert_approx_eq!(player.x, 10.0);
        assert_approx_eq!(player.y, 20.0);
    }

    #[test]
    fn test_character_round_robin_per_room() {
        let mut table = PlayerTable::new(SpawnBounds::default(), 3);

        let tags: Vec<u32> = (0..4)
            .map(|_| table.create("lobby", ConnectionId::new()).character.index())
            .collect();
        assert_eq!(tags, vec![1, 2, 3, 1]);

        // A different room starts its own rotation
        let other = table.create("other", ConnectionId::new());
        assert_eq!(other.character.index(), 1);
    }

    #[test]
    fn test_update_existing_player() {
        let mut table = table();
        let id = ConnectionId::new();
        table.create("lobby", id);

        let updated = table.update("lobby", id, 500.0, 420.0).unwrap();
        assert_approx_eq!(updated.x, 500.0);
        assert_approx_eq!(updated.y, 420.0);

        // No distance or speed validation
        table.update("lobby", id, -9000.0, 1e6);
        let player = table.get("lobby", &id).unwrap();
        assert_approx_eq!(player.x, -9000.0);
    }

    #[test]
    fn test_update_missing_player_is_noop() {
        let mut table = table();
        let id = ConnectionId::new();

        assert!(table.update("lobby", id, 1.0, 1.0).is_none());
        assert_eq!(table.total(), 0);

        table.create("lobby", id);
        assert!(table.update("elsewhere", id, 1.0, 1.0).is_none());
    }

    #[test]
    fn test_remove_returns_record() {
        let mut table = table();
        let id = ConnectionId::new();
        let created = table.create("lobby", id);

        let removed = table.remove("lobby", id).unwrap();
        assert_eq!(removed, created);
        assert!(table.remove("lobby", id).is_none());
        assert_eq!(table.len("lobby"), 0);
        assert!(table.list_all("lobby").is_empty());
    }

    #[test]
    fn test_total_counts_all_rooms() {
        let mut table = table();
        table.create("a", ConnectionId::new());
        table.create("a", ConnectionId::new());
        table.create("b", ConnectionId::new());

        assert_eq!(table.total(), 3);
        assert_eq!(table.list_all("a").len(), 2);
        assert_eq!(table.list_all("b").len(), 1);
    }
}
