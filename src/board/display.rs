use shakmaty::{File, Rank, Square};

use super::Board;

impl Board {
    /// Renders the position as an 8x8 character grid, rank 8 first: rank
    /// numbers down the left edge, file letters underneath, dots for empty
    /// squares.
    pub fn to_ascii(&self) -> String {
        let mut lines: Vec<String> = (0..8u32)
            .rev()
            .map(|rank| {
                let cells: Vec<String> = (0..8u32)
                    .map(|file| {
                        let square = Square::from_coords(File::new(file), Rank::new(rank));
                        match self.piece_at(square) {
                            Some(piece) => piece.char().to_string(),
                            None => ".".to_string(),
                        }
                    })
                    .collect();
                format!("{}  {}", rank + 1, cells.join(" "))
            })
            .collect();
        lines.push("   a b c d e f g h".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::super::Board;

    #[test]
    fn test_ascii_render_of_starting_position() {
        let rendered = Board::starting_position().to_ascii();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "8  r n b q k b n r");
        assert_eq!(lines[2], "6  . . . . . . . .");
        assert_eq!(lines[7], "1  R N B Q K B N R");
        assert_eq!(lines[8], "   a b c d e f g h");
    }
}
