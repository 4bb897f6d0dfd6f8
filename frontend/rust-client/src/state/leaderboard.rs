use serde::Serialize;

use crate::models::codebattle::{LeaderboardEntry, League};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub league: League,
    pub entry: LeaderboardEntry,
}

/// Orders players by rating, highest first. The sort is stable, so equal
/// ratings keep the order the server sent them in and repeated calls with
/// the same input give the same output.
pub fn rank_leaderboard(mut entries: Vec<LeaderboardEntry>) -> Vec<RankedEntry> {
    entries.sort_by(|a, b| b.rating.cmp(&a.rating));
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankedEntry {
            rank: i + 1,
            league: entry
                .league
                .unwrap_or_else(|| League::from_rating(entry.rating)),
            entry,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: i64, rating: i32) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id,
            username: format!("user{}", user_id),
            rating,
            league: None,
            wins: 0,
            losses: 0,
        }
    }

    #[test]
    fn test_orders_by_rating_desc() {
        let ranked = rank_leaderboard(vec![entry(1, 900), entry(2, 1500), entry(3, 1200)]);
        let ids: Vec<i64> = ranked.iter().map(|r| r.entry.user_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].league, League::Platinum);
        assert_eq!(ranked[2].league, League::Bronze);
    }

    #[test]
    fn test_equal_ratings_are_stable() {
        let input = vec![
            entry(5, 1300),
            entry(2, 1300),
            entry(9, 1400),
            entry(1, 1300),
        ];

        let first = rank_leaderboard(input.clone());
        for _ in 0..10 {
            assert_eq!(rank_leaderboard(input.clone()), first);
        }

        let ids: Vec<i64> = first.iter().map(|r| r.entry.user_id).collect();
        assert_eq!(ids, vec![9, 5, 2, 1]);
    }
}
