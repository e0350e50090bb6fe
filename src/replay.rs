//! PGN move replay behind a narrow "text in, SAN tokens out" capability.
//!
//! Aggregation code only sees `MoveReplay`; `PgnReplay` is the concrete
//! engine, validating every move against a `shakmaty` position.

use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use shakmaty::{fen::Fen, CastlingMode, Chess};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("no game found in PGN")]
    NoGame,

    #[error("PGN read error: {0}")]
    Read(String),

    #[error("invalid FEN tag: {0}")]
    InvalidFen(String),

    #[error("illegal move at ply {ply}: {san} ({reason})")]
    IllegalMove {
        ply: usize,
        san: String,
        reason: String,
    },
}

/// Mainline of one game plus the headers the analytics care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayedGame {
    pub moves: Vec<String>,
    /// Raw `Opening` tag, unescaped.
    pub opening: Option<String>,
}

/// Turns PGN-like text into an ordered list of move tokens.
pub trait MoveReplay: Send + Sync {
    fn replay(&self, pgn: &str) -> Result<ReplayedGame, ReplayError>;
}

/// Mainline replay of the first game in a PGN blob. Variations are skipped
/// and a `FEN` tag sets the starting position.
///
/// Tokens are normalized SAN with check/mate suffixes (`Nf3`, `Bxf7+`, `Qxf7#`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PgnReplay;

impl PgnReplay {
    pub fn new() -> Self {
        Self
    }
}

impl MoveReplay for PgnReplay {
    fn replay(&self, pgn: &str) -> Result<ReplayedGame, ReplayError> {
        let mut reader = BufferedReader::new_cursor(pgn.as_bytes());
        let mut visitor = MainlineVisitor::default();
        match reader.read_game(&mut visitor) {
            Ok(Some(result)) => result,
            Ok(None) => Err(ReplayError::NoGame),
            Err(e) => Err(ReplayError::Read(e.to_string())),
        }
    }
}

/// Per-game state. The first error sticks and every later callback is a no-op.
#[derive(Default)]
struct MainlineVisitor {
    pos: Chess,
    moves: Vec<String>,
    fen: Option<String>,
    opening: Option<String>,
    error: Option<ReplayError>,
}

fn header_text(value: RawHeader<'_>) -> String {
    String::from_utf8_lossy(&value.decode()).into_owned()
}

impl Visitor for MainlineVisitor {
    type Result = Result<ReplayedGame, ReplayError>;

    fn begin_game(&mut self) {
        *self = Self::default();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        if key.eq_ignore_ascii_case(b"FEN") {
            self.fen = Some(header_text(value));
        } else if key == b"Opening" {
            self.opening = Some(header_text(value));
        }
    }

    fn end_headers(&mut self) -> Skip {
        let Some(fen) = self.fen.as_deref() else {
            return Skip(false);
        };
        let parsed = fen
            .parse::<Fen>()
            .map_err(|e| e.to_string())
            .and_then(|fen| {
                fen.into_position::<Chess>(CastlingMode::Standard)
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(pos) => {
                self.pos = pos;
                Skip(false)
            }
            Err(e) => {
                self.error = Some(ReplayError::InvalidFen(e));
                Skip(true)
            }
        }
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.error.is_some() {
            return;
        }
        match san_plus.san.to_move(&self.pos) {
            Ok(m) => {
                let normalized = SanPlus::from_move_and_play_unchecked(&mut self.pos, &m);
                self.moves.push(normalized.to_string());
            }
            Err(e) => {
                self.error = Some(ReplayError::IllegalMove {
                    ply: self.moves.len() + 1,
                    san: san_plus.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        Ok(ReplayedGame {
            moves: std::mem::take(&mut self.moves),
            opening: self.opening.take(),
        })
    }
}
