use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::analytics::outcome::Outcome;
use crate::types::{Color, GameRecord, OutcomeCounts};

/// How many openings `top_openings` returns when the caller has no preference.
pub const DEFAULT_TOP_OPENINGS: usize = 10;

// ---------------------------------------------------------------------------
// MoveTree: flat arena of prefix nodes
// ---------------------------------------------------------------------------

/// Index of a node inside `MoveTree::nodes`. The root is always `NodeId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MoveTreeNode {
    /// Number of moves in this node's prefix.
    pub depth: usize,
    /// Games whose sequence is at least `depth` long and agrees on the prefix.
    pub match_count: u32,
    /// Outcomes of games that end exactly at this prefix.
    pub terminal: OutcomeCounts,
    /// Outcomes of every game passing through this node, terminal ones included.
    pub subtree: OutcomeCounts,
    /// Ingestion ids of the games counted in `terminal`.
    pub terminal_games: Vec<usize>,
    /// Next move token → child. Ordered so serialized trees are stable.
    pub children: BTreeMap<String, NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveTree {
    nodes: Vec<MoveTreeNode>,
}

impl MoveTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![MoveTreeNode::default()],
        }
    }

    pub fn root(&self) -> &MoveTreeNode {
        &self.nodes[NodeId::ROOT.0]
    }

    pub fn node(&self, id: NodeId) -> Option<&MoveTreeNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().match_count == 0
    }

    /// Walks `prefix` from the root. None if some move was never played there.
    pub fn find(&self, prefix: &[String]) -> Option<NodeId> {
        let mut id = NodeId::ROOT;
        for mv in prefix {
            id = *self.nodes[id.0].children.get(mv)?;
        }
        Some(id)
    }

    /// Adds one game: every node on the path gains a match and the game's
    /// outcome; the last node also records it as terminal.
    fn insert(&mut self, moves: &[String], outcome: Outcome, game_id: usize) {
        let mut id = NodeId::ROOT;
        self.visit(id, outcome);

        for mv in moves {
            let next = self.nodes[id.0].children.get(mv).copied();
            id = match next {
                Some(child) => child,
                None => {
                    let child = NodeId(self.nodes.len());
                    let depth = self.nodes[id.0].depth + 1;
                    self.nodes.push(MoveTreeNode {
                        depth,
                        ..MoveTreeNode::default()
                    });
                    self.nodes[id.0].children.insert(mv.clone(), child);
                    child
                }
            };
            self.visit(id, outcome);
        }

        let node = &mut self.nodes[id.0];
        node.terminal.record(outcome);
        node.terminal_games.push(game_id);
    }

    fn visit(&mut self, id: NodeId, outcome: Outcome) {
        let node = &mut self.nodes[id.0];
        node.match_count += 1;
        node.subtree.record(outcome);
    }

    /// Ids of every game terminating at or below `id`, ascending.
    fn subtree_games(&self, id: NodeId) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            out.extend_from_slice(&node.terminal_games);
            stack.extend(node.children.values().copied());
        }
        out.sort_unstable();
        out
    }
}

impl Default for MoveTree {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Opening rollups
// ---------------------------------------------------------------------------

/// Aggregate results for one normalized opening name.
#[derive(Debug, Clone, Serialize)]
pub struct OpeningRollup {
    pub name: String,
    #[serde(flatten)]
    pub stats: OutcomeCounts,
    /// Color the subject most often had in this opening; ties keep the
    /// color of the first game seen.
    pub color: Color,
    #[serde(skip)]
    white_games: u32,
    #[serde(skip)]
    black_games: u32,
    #[serde(skip)]
    first_color: Color,
}

impl OpeningRollup {
    fn new(name: String, first_color: Color) -> Self {
        Self {
            name,
            stats: OutcomeCounts::default(),
            color: first_color,
            white_games: 0,
            black_games: 0,
            first_color,
        }
    }

    fn record(&mut self, color: Color, outcome: Outcome) {
        self.stats.record(outcome);
        match color {
            Color::White => self.white_games += 1,
            Color::Black => self.black_games += 1,
        }
        self.color = if self.white_games > self.black_games {
            Color::White
        } else if self.black_games > self.white_games {
            Color::Black
        } else {
            self.first_color
        };
    }
}

/// `"Sicilian Defense: Najdorf Variation, 6.Be3"` → `"Sicilian Defense"`.
/// Returns None when nothing is left after trimming.
pub fn normalize_opening_name(raw: &str) -> Option<String> {
    let head = raw.split([':', ',']).next().unwrap_or(raw).trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

// ---------------------------------------------------------------------------
// OpeningIndex
// ---------------------------------------------------------------------------

/// One candidate continuation after a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateMove {
    #[serde(rename = "move")]
    pub mv: String,
    #[serde(flatten)]
    pub stats: OutcomeCounts,
}

#[derive(Debug, Serialize)]
pub struct PrefixQuery<'a> {
    pub candidate_moves: Vec<CandidateMove>,
    pub matching_games: Vec<&'a GameRecord>,
    /// Matching games whose sequence ends exactly at the prefix.
    pub terminal_count: u32,
}

/// Move-prefix tree plus per-opening rollups over a batch of games.
///
/// Ingestion never deduplicates: feeding the same games twice doubles every
/// count.
#[derive(Debug, Clone, Default)]
pub struct OpeningIndex {
    games: Vec<GameRecord>,
    tree: MoveTree,
    rollups: HashMap<String, OpeningRollup>,
}

impl OpeningIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(games: &[GameRecord]) -> Self {
        let mut index = Self::new();
        index.ingest(games);
        index
    }

    pub fn ingest(&mut self, games: &[GameRecord]) {
        for game in games {
            let outcome = game.outcome();
            let game_id = self.games.len();

            if !game.moves.is_empty() {
                self.tree.insert(&game.moves, outcome, game_id);
            }

            if let Some(name) = game.opening.as_deref().and_then(normalize_opening_name) {
                self.rollups
                    .entry(name.clone())
                    .or_insert_with(|| OpeningRollup::new(name, game.subject_color))
                    .record(game.subject_color, outcome);
            }

            self.games.push(game.clone());
        }
    }

    pub fn tree(&self) -> &MoveTree {
        &self.tree
    }

    pub fn rollups(&self) -> &HashMap<String, OpeningRollup> {
        &self.rollups
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Continuations and matching games after `prefix`. An unknown prefix
    /// yields an empty result.
    pub fn query_prefix(&self, prefix: &[String]) -> PrefixQuery<'_> {
        let Some(id) = self.tree.find(prefix) else {
            return PrefixQuery {
                candidate_moves: Vec::new(),
                matching_games: Vec::new(),
                terminal_count: 0,
            };
        };
        let node = &self.tree.nodes[id.0];

        let mut candidate_moves: Vec<CandidateMove> = node
            .children
            .iter()
            .map(|(mv, child)| CandidateMove {
                mv: mv.clone(),
                stats: self.tree.nodes[child.0].subtree,
            })
            .collect();
        candidate_moves.sort_by(|a, b| {
            b.stats
                .total()
                .cmp(&a.stats.total())
                .then_with(|| a.mv.as_bytes().cmp(b.mv.as_bytes()))
        });

        let matching_games = self
            .tree
            .subtree_games(id)
            .into_iter()
            .map(|game_id| &self.games[game_id])
            .collect();

        PrefixQuery {
            candidate_moves,
            matching_games,
            terminal_count: node.terminal.total(),
        }
    }

    /// Most played openings, by total then name.
    pub fn top_openings(&self, n: usize) -> Vec<&OpeningRollup> {
        let mut sorted: Vec<&OpeningRollup> = self.rollups.values().collect();
        sorted.sort_by(|a, b| {
            b.stats
                .total()
                .cmp(&a.stats.total())
                .then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
        });
        sorted.truncate(n);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{game, moves};

    fn scenario() -> Vec<GameRecord> {
        vec![
            game(&["e4", "e5"], "win", Color::White, None),
            game(&["e4", "c5"], "resigned", Color::White, None),
            game(&["d4"], "agreed", Color::Black, None),
        ]
    }

    #[test]
    fn candidate_moves_tie_break_lexicographically() {
        let index = OpeningIndex::build(&scenario());
        let q = index.query_prefix(&moves(&["e4"]));

        assert_eq!(q.candidate_moves.len(), 2);
        assert_eq!(q.candidate_moves[0].mv, "c5");
        assert_eq!(q.candidate_moves[0].stats.losses(), 1);
        assert_eq!(q.candidate_moves[0].stats.total(), 1);
        assert_eq!(q.candidate_moves[1].mv, "e5");
        assert_eq!(q.candidate_moves[1].stats.wins(), 1);
        assert_eq!(q.candidate_moves[1].stats.total(), 1);
        assert_eq!(q.matching_games.len(), 2);
        assert_eq!(q.terminal_count, 0);
    }

    #[test]
    fn empty_prefix_matches_every_game_in_order() {
        let games = scenario();
        let index = OpeningIndex::build(&games);
        let q = index.query_prefix(&[]);

        let got: Vec<_> = q.matching_games.iter().map(|g| g.moves.clone()).collect();
        let expected: Vec<_> = games.iter().map(|g| g.moves.clone()).collect();
        assert_eq!(got, expected);

        // e4 (2 games) sorts ahead of d4 (1 game)
        assert_eq!(q.candidate_moves[0].mv, "e4");
        assert_eq!(q.candidate_moves[0].stats.total(), 2);
        assert_eq!(q.candidate_moves[1].mv, "d4");
        assert_eq!(q.candidate_moves[1].stats.draws(), 1);
    }

    #[test]
    fn terminal_games_close_the_count_identity() {
        let games = vec![
            game(&["e4"], "win", Color::White, None),
            game(&["e4", "e5"], "timeout", Color::White, None),
            game(&["e4", "e5", "Nf3"], "win", Color::Black, None),
            game(&["e4", "c5"], "stalemate", Color::Black, None),
            game(&["e4", "e5"], "win", Color::Black, None),
        ];
        let index = OpeningIndex::build(&games);

        for prefix in [vec![], moves(&["e4"]), moves(&["e4", "e5"]), moves(&["e4", "e5", "Nf3"])] {
            let q = index.query_prefix(&prefix);
            let candidate_sum: u32 = q.candidate_moves.iter().map(|c| c.stats.total()).sum();
            let terminal = q
                .matching_games
                .iter()
                .filter(|g| g.moves.len() == prefix.len())
                .count() as u32;
            assert_eq!(terminal, q.terminal_count, "prefix={prefix:?}");
            assert_eq!(
                candidate_sum + q.terminal_count,
                q.matching_games.len() as u32,
                "prefix={prefix:?}"
            );
        }

        let e4 = index.tree().find(&moves(&["e4"])).unwrap();
        let node = index.tree().node(e4).unwrap();
        assert_eq!(node.match_count, 5);
        assert_eq!(node.terminal.total(), 1);
        let child_sum: u32 = node
            .children
            .values()
            .map(|c| index.tree().node(*c).unwrap().match_count)
            .sum();
        assert_eq!(child_sum, 4);
    }

    #[test]
    fn prefix_longer_than_any_game_is_empty() {
        let index = OpeningIndex::build(&scenario());
        let q = index.query_prefix(&moves(&["e4", "e5", "Nf3", "Nc6"]));
        assert!(q.candidate_moves.is_empty());
        assert!(q.matching_games.is_empty());

        let q = index.query_prefix(&moves(&["h4"]));
        assert!(q.candidate_moves.is_empty());
        assert!(q.matching_games.is_empty());
    }

    #[test]
    fn ingesting_twice_doubles_everything() {
        let games = vec![
            game(&["e4", "e5"], "win", Color::White, Some("King's Pawn Opening")),
            game(&["d4"], "checkmated", Color::Black, Some("Queen's Pawn Opening: Zukertort")),
        ];
        let mut index = OpeningIndex::new();
        index.ingest(&games);
        let once_root = index.tree().root().match_count;
        let once_e4 = index.query_prefix(&moves(&["e4"])).candidate_moves[0].stats;
        index.ingest(&games);

        assert_eq!(index.tree().root().match_count, once_root * 2);
        let twice_e4 = index.query_prefix(&moves(&["e4"])).candidate_moves[0].stats;
        assert_eq!(twice_e4.wins(), once_e4.wins() * 2);
        assert_eq!(twice_e4.total(), once_e4.total() * 2);
        assert_eq!(index.query_prefix(&[]).matching_games.len(), 4);
        assert_eq!(index.rollups()["Queen's Pawn Opening"].stats.total(), 2);
        assert_eq!(index.rollups()["Queen's Pawn Opening"].stats.losses(), 2);
    }

    #[test]
    fn games_without_moves_only_feed_rollups() {
        let games = vec![
            game(&[], "win", Color::White, Some("Scandinavian Defense")),
            game(&["e4", "d5"], "win", Color::White, Some("Scandinavian Defense: Mieses")),
        ];
        let index = OpeningIndex::build(&games);
        assert_eq!(index.tree().root().match_count, 1);
        assert_eq!(index.query_prefix(&[]).matching_games.len(), 1);
        assert_eq!(index.rollups()["Scandinavian Defense"].stats.total(), 2);
    }

    #[test]
    fn opening_names_are_normalized() {
        assert_eq!(
            normalize_opening_name("Sicilian Defense: Najdorf Variation, 6.Be3").as_deref(),
            Some("Sicilian Defense")
        );
        assert_eq!(
            normalize_opening_name("Italian Game, Two Knights").as_deref(),
            Some("Italian Game")
        );
        assert_eq!(normalize_opening_name("  Bird Opening ").as_deref(), Some("Bird Opening"));
        assert_eq!(normalize_opening_name(": nothing"), None);
        assert_eq!(normalize_opening_name(""), None);
    }

    #[test]
    fn top_openings_sort_by_total_then_name() {
        let games = vec![
            game(&["e4"], "win", Color::White, Some("Caro-Kann Defense")),
            game(&["e4"], "win", Color::White, Some("Alekhine Defense")),
            game(&["d4"], "win", Color::White, Some("Queen's Gambit: Declined")),
            game(&["d4"], "resigned", Color::Black, Some("Queen's Gambit Accepted")),
            game(&["d4"], "win", Color::Black, Some("Queen's Gambit, Exchange")),
        ];
        let index = OpeningIndex::build(&games);

        let top = index.top_openings(DEFAULT_TOP_OPENINGS);
        let names: Vec<_> = top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            ["Queen's Gambit", "Alekhine Defense", "Caro-Kann Defense", "Queen's Gambit Accepted"]
        );
        assert_eq!(top[0].stats.total(), 2);
        assert_eq!(index.top_openings(1).len(), 1);

        let tagged = games.iter().filter(|g| g.opening.is_some()).count() as u32;
        let sum: u32 = top.iter().map(|r| r.stats.total()).sum();
        assert!(sum <= tagged);
    }

    #[test]
    fn rollup_color_follows_majority_then_first_seen() {
        let games = vec![
            game(&["e4"], "win", Color::Black, Some("Ruy Lopez")),
            game(&["e4"], "win", Color::White, Some("Ruy Lopez")),
            game(&["e4"], "win", Color::White, Some("Vienna Game")),
            game(&["e4"], "win", Color::Black, Some("Vienna Game")),
            game(&["e4"], "win", Color::Black, Some("Vienna Game")),
        ];
        let index = OpeningIndex::build(&games);
        assert_eq!(index.rollups()["Ruy Lopez"].color, Color::Black);
        assert_eq!(index.rollups()["Vienna Game"].color, Color::Black);
    }

    #[test]
    fn empty_input_builds_empty_index() {
        let index = OpeningIndex::build(&[]);
        assert!(index.tree().is_empty());
        assert_eq!(index.tree().len(), 1);
        assert!(index.top_openings(10).is_empty());
        let q = index.query_prefix(&[]);
        assert!(q.candidate_moves.is_empty());
        assert!(q.matching_games.is_empty());
    }

    #[test]
    fn tree_serializes_as_flat_node_table() {
        let index = OpeningIndex::build(&scenario());
        let v = serde_json::to_value(index.tree()).unwrap();
        let nodes = v["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), index.tree().len());
        assert_eq!(nodes[0]["match_count"], 3);
        let e4 = nodes[0]["children"]["e4"].as_u64().unwrap() as usize;
        assert_eq!(nodes[e4]["depth"], 1);
        assert_eq!(nodes[e4]["subtree"]["total"], 2);
    }

    #[test]
    fn candidate_move_serializes_with_move_key() {
        let index = OpeningIndex::build(&scenario());
        let q = index.query_prefix(&moves(&["e4"]));
        let v = serde_json::to_value(&q.candidate_moves[0]).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"move": "c5", "wins": 0, "losses": 1, "draws": 0, "total": 1})
        );
    }
}
