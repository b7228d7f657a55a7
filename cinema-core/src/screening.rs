use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult};
use crate::seat::SeatId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screening {
    pub id: String,
    pub movie_id: String,
    pub movie_name: String,
    pub screen_at: DateTime<Utc>,
    pub rows: u32,
    pub cols: u32,
    pub created_at: DateTime<Utc>,
}

impl Screening {
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row < self.rows && col < self.cols
    }

    /// Builds the seat key after checking it lies inside the grid.
    pub fn seat(&self, row: u32, col: u32) -> BookingResult<SeatId> {
        if !self.contains(row, col) {
            return Err(BookingError::Validation(format!(
                "seat ({}, {}) outside {}x{} grid",
                row, col, self.rows, self.cols
            )));
        }
        Ok(SeatId::new(self.id.clone(), row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screening(rows: u32, cols: u32) -> Screening {
        Screening {
            id: "scr".into(),
            movie_id: "m".into(),
            movie_name: "Movie".into(),
            screen_at: Utc::now(),
            rows,
            cols,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_grid_bounds() {
        let s = screening(5, 8);
        assert!(s.seat(0, 0).is_ok());
        assert_eq!(s.seat(4, 7).unwrap(), SeatId::new("scr", 4, 7));
        assert!(matches!(s.seat(5, 0), Err(BookingError::Validation(_))));
        assert!(matches!(s.seat(0, 8), Err(BookingError::Validation(_))));
    }
}
