//! Unit model definitions: the piece hierarchy and the selection box.

use serde::{Deserialize, Serialize};

use crate::math::{SimScalar, SimVector};

/// One named piece of a unit model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceDefinition {
    /// Piece name as referenced by scripts.
    pub name: String,
    /// Parent piece, `None` for the root.
    #[serde(default)]
    pub parent: Option<String>,
    /// Offset from the parent piece.
    #[serde(default)]
    pub origin: SimVector,
}

/// Pieces plus the collision volume of a unit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitModelDefinition {
    /// Model name, matching `UnitDefinition::object_name`.
    pub name: String,
    /// Pieces in script order.
    pub pieces: Vec<PieceDefinition>,
    /// Selection box minimum corner relative to the unit position.
    pub selection_min: SimVector,
    /// Selection box maximum corner relative to the unit position.
    pub selection_max: SimVector,
}

impl UnitModelDefinition {
    /// A single-piece model with a cube selection box of the given half size.
    #[must_use]
    pub fn simple(name: &str, half_size: SimScalar) -> Self {
        Self {
            name: name.to_string(),
            pieces: vec![PieceDefinition {
                name: "base".to_string(),
                parent: None,
                origin: SimVector::ZERO,
            }],
            selection_min: SimVector::new(-half_size, SimScalar::ZERO, -half_size),
            selection_max: SimVector::new(half_size, half_size + half_size, half_size),
        }
    }

    /// Index of a piece by name, case-insensitive.
    #[must_use]
    pub fn piece_index(&self, name: &str) -> Option<usize> {
        self.pieces
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Offset of a piece from the unit origin in its rest pose.
    #[must_use]
    pub fn piece_rest_offset(&self, index: usize) -> SimVector {
        let mut offset = SimVector::ZERO;
        let mut current = self.pieces.get(index);
        // Bounded by the piece count so a malformed cycle cannot loop forever.
        for _ in 0..self.pieces.len() {
            let Some(piece) = current else { break };
            offset += piece.origin;
            current = piece
                .parent
                .as_deref()
                .and_then(|parent| self.piece_index(parent))
                .and_then(|i| self.pieces.get(i));
        }
        offset
    }
}
