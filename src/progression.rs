//! Level and league rules.
//!
//! Pure functions over fixed threshold tables. Levels are derived from total
//! experience on every read; nothing here is stored.

use std::fmt;

/// Minimum experience for each level, starting at level 1.
const LEVEL_THRESHOLDS: [u64; 25] = [
    0, 1, 250, 500, 1_000, 2_000, 3_000, 4_000, 5_000, 7_500, 10_000, 12_500, 15_000, 17_500,
    20_000, 25_000, 30_000, 35_000, 40_000, 45_000, 50_000, 60_000, 70_000, 85_000, 100_000,
];

/// Highest reachable level.
pub const MAX_LEVEL: u32 = LEVEL_THRESHOLDS.len() as u32;

/// Display tier derived from level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum League {
    Unranked,
    Minnow,
    Guppy,
    Pond,
    River,
    Lake,
    Stream,
    Bay,
    Ocean,
    DeepSea,
    Trophy,
    Champion,
    Legendary,
}

/// Minimum level for each league, ascending.
const LEAGUES: [(u32, League); 13] = [
    (1, League::Unranked),
    (2, League::Minnow),
    (5, League::Guppy),
    (7, League::Pond),
    (9, League::River),
    (11, League::Lake),
    (13, League::Stream),
    (15, League::Bay),
    (17, League::Ocean),
    (19, League::DeepSea),
    (21, League::Trophy),
    (23, League::Champion),
    (25, League::Legendary),
];

impl League {
    pub fn label(self) -> &'static str {
        match self {
            League::Unranked => "Unranked",
            League::Minnow => "Minnow",
            League::Guppy => "Guppy",
            League::Pond => "Pond",
            League::River => "River",
            League::Lake => "Lake",
            League::Stream => "Stream",
            League::Bay => "Bay",
            League::Ocean => "Ocean",
            League::DeepSea => "Deep Sea",
            League::Trophy => "Trophy",
            League::Champion => "Champion",
            League::Legendary => "Legendary",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Level reached with `experience` total XP. Always in `1..=MAX_LEVEL`.
pub fn level_for(experience: u64) -> u32 {
    // Thresholds are sorted, so the count of thresholds <= experience is the level.
    LEVEL_THRESHOLDS.partition_point(|&min| min <= experience) as u32
}

/// League for a level. Levels below 1 are treated as 1.
pub fn league_for(level: u32) -> League {
    LEAGUES
        .iter()
        .rev()
        .find(|(min, _)| level >= *min)
        .map(|(_, league)| *league)
        .unwrap_or(League::Unranked)
}

/// Experience needed to reach the level after `level`, or `None` at the cap.
pub fn next_level_at(level: u32) -> Option<u64> {
    LEVEL_THRESHOLDS.get(level as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_player_is_level_one_unranked() {
        assert_eq!(level_for(0), 1);
        assert_eq!(league_for(level_for(0)), League::Unranked);
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(level_for(1), 2);
        assert_eq!(level_for(249), 2);
        assert_eq!(level_for(250), 3);
        assert_eq!(level_for(99_999), 24);
        assert_eq!(level_for(100_000), MAX_LEVEL);
        assert_eq!(level_for(u64::MAX), MAX_LEVEL);
    }

    #[test]
    fn level_is_monotonic_in_experience() {
        let mut previous = level_for(0);
        for xp in (0..120_000u64).step_by(37) {
            let level = level_for(xp);
            assert!(level >= previous, "level dropped at {xp} xp");
            previous = level;
        }
    }

    #[test]
    fn thresholds_strictly_increase() {
        assert!(LEVEL_THRESHOLDS.windows(2).all(|w| w[0] < w[1]));
        assert!(LEAGUES.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
    }

    #[test]
    fn leagues_follow_experience_boundaries() {
        let cases = [
            (0, League::Unranked),
            (1, League::Minnow),
            (999, League::Minnow),
            (1_000, League::Guppy),
            (2_999, League::Guppy),
            (3_000, League::Pond),
            (5_000, League::River),
            (10_000, League::Lake),
            (15_000, League::Stream),
            (20_000, League::Bay),
            (30_000, League::Ocean),
            (40_000, League::DeepSea),
            (50_000, League::Trophy),
            (70_000, League::Champion),
            (99_999, League::Champion),
            (100_000, League::Legendary),
        ];
        for (xp, league) in cases {
            assert_eq!(league_for(level_for(xp)), league, "wrong league at {xp} xp");
        }
    }

    #[test]
    fn league_for_level_zero_is_unranked() {
        assert_eq!(league_for(0), League::Unranked);
    }

    #[test]
    fn next_level_reports_threshold_until_cap() {
        assert_eq!(next_level_at(1), Some(1));
        assert_eq!(next_level_at(2), Some(250));
        assert_eq!(next_level_at(MAX_LEVEL - 1), Some(100_000));
        assert_eq!(next_level_at(MAX_LEVEL), None);
    }

    #[test]
    fn league_labels() {
        assert_eq!(League::DeepSea.to_string(), "Deep Sea");
        assert_eq!(League::Legendary.label(), "Legendary");
    }
}
