//! Maze state and rules.

use rand::Rng;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tandem_core::{ActionKind, Direction, GameState, PlayerInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell in `direction`, if it lies on a `size` board.
    fn step(self, direction: Direction, size: usize) -> Option<Self> {
        let Cell { x, y } = self;
        let (x, y) = match direction {
            Direction::Up => (x, y.checked_sub(1)?),
            Direction::Down => (x, y + 1),
            Direction::Left => (x.checked_sub(1)?, y),
            Direction::Right => (x + 1, y),
        };
        (x < size && y < size).then_some(Self { x, y })
    }
}

/// A player on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub at: Cell,
    pub treasures: u32,
}

impl Player {
    pub fn new(name: String, at: Cell) -> Self {
        Self {
            name,
            at,
            treasures: 0,
        }
    }
}

/// A square board with players hunting treasures.
///
/// The board keeps `treasure_target` treasures on free cells: every
/// collected treasure respawns somewhere else while there is room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maze {
    size: usize,
    treasure_target: usize,
    treasures: Vec<Cell>,
    players: BTreeMap<String, Player>,
}

impl Maze {
    pub fn new(size: usize, treasure_target: usize) -> Self {
        let mut maze = Self {
            size: size.max(1),
            treasure_target,
            treasures: Vec::new(),
            players: BTreeMap::new(),
        };
        for _ in 0..treasure_target {
            maze.spawn_treasure();
        }
        maze
    }

    pub fn treasures(&self) -> &[Cell] {
        &self.treasures
    }

    pub fn players(&self) -> &BTreeMap<String, Player> {
        &self.players
    }

    fn occupied(&self, cell: Cell) -> bool {
        self.treasures.contains(&cell) || self.players.values().any(|p| p.at == cell)
    }

    fn free_cell(&self) -> Option<Cell> {
        let size = self.size;
        (0..size * size)
            .map(|i| Cell::new(i % size, i / size))
            .filter(|cell| !self.occupied(*cell))
            .choose(&mut rand::thread_rng())
    }

    fn spawn_treasure(&mut self) {
        if let Some(cell) = self.free_cell() {
            self.treasures.push(cell);
        }
    }

    /// Place a player at `at`, replacing any player with the same id.
    pub fn add_player_at(&mut self, id: &str, name: String, at: Cell) {
        self.players.insert(id.to_string(), Player::new(name, at));
    }

    pub fn place_treasure(&mut self, at: Cell) {
        if !self.occupied(at) {
            self.treasures.push(at);
        }
    }

    /// Move a player one cell. Walls and other players block the move;
    /// stepping on a treasure collects it.
    pub fn move_player(&mut self, id: &str, direction: Direction) {
        let size = self.size;
        let Some(from) = self.players.get(id).map(|p| p.at) else {
            return;
        };
        let Some(to) = from.step(direction, size) else {
            return;
        };
        if self.players.values().any(|p| p.at == to) {
            return;
        }

        let found = self.treasures.iter().position(|t| *t == to);
        if let Some(player) = self.players.get_mut(id) {
            player.at = to;
            if let Some(index) = found {
                self.treasures.swap_remove(index);
                player.treasures += 1;
                tracing::info!("{} found a treasure at ({}, {})", player.name, to.x, to.y);
            }
        }
        if found.is_some() && self.treasures.len() < self.treasure_target {
            self.spawn_treasure();
        }
    }

    /// The board as text: `*` for treasures, the first letter of a player's
    /// name for players, followed by the scores.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for y in 0..self.size {
            for x in 0..self.size {
                let cell = Cell::new(x, y);
                let glyph = match self.players.values().find(|p| p.at == cell) {
                    Some(player) => player.name.chars().next().unwrap_or('@'),
                    None if self.treasures.contains(&cell) => '*',
                    None => '.',
                };
                out.push(glyph);
                out.push(' ');
            }
            out.push('\n');
        }
        for player in self.players.values() {
            out.push_str(&format!("{:<12} {}\n", player.name, player.treasures));
        }
        out
    }
}

impl GameState for Maze {
    fn add_participant(&mut self, id: &str, player: PlayerInfo) {
        // A full board stacks newcomers on a random cell.
        let at = self.free_cell().unwrap_or_else(|| {
            let mut rng = rand::thread_rng();
            Cell::new(rng.gen_range(0..self.size), rng.gen_range(0..self.size))
        });
        self.add_player_at(id, player.name, at);
    }

    fn remove_participant(&mut self, id: &str) {
        self.players.remove(id);
    }

    fn apply(&mut self, actor_id: &str, action: ActionKind) {
        if let ActionKind::Move { direction } = action {
            self.move_player(actor_id, direction);
        }
    }

    fn participant_count(&self) -> usize {
        self.players.len()
    }
}
