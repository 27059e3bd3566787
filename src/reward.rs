//! Catch generation.
//!
//! A catch draws a rarity from the tiers unlocked at the player's level
//! (weighted), then a fish uniformly from that tier, then money, experience
//! and weight from the tier's fixed ranges. The random source is always
//! passed in so callers control seeding.

use std::fmt;
use std::ops::RangeInclusive;

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;

/// Rarity tier of a catch, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rarity {
    Trash,
    Common,
    Uncommon,
    Rare,
    Epic,
    Supreme,
    Mythical,
    Legendary,
}

/// Per-tier draw weight (per mille), unlock level and reward ranges.
#[derive(Debug, Clone)]
pub struct TierSpec {
    pub rarity: Rarity,
    pub weight: u32,
    pub min_level: u32,
    pub money: RangeInclusive<u64>,
    pub experience: RangeInclusive<u64>,
    pub weight_kg: RangeInclusive<f64>,
}

impl Rarity {
    pub const ALL: [Rarity; 8] = [
        Rarity::Trash,
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Supreme,
        Rarity::Mythical,
        Rarity::Legendary,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Rarity::Trash => "Trash",
            Rarity::Common => "Common",
            Rarity::Uncommon => "Uncommon",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Supreme => "Supreme",
            Rarity::Mythical => "Mythical",
            Rarity::Legendary => "Legendary",
        }
    }

    pub fn spec(self) -> TierSpec {
        let (weight, min_level, money, experience, weight_kg) = match self {
            Rarity::Trash => (239, 1, 1..=9, 0..=0, 0.1..=0.9),
            Rarity::Common => (250, 1, 10..=50, 50..=100, 1.0..=5.0),
            Rarity::Uncommon => (200, 1, 51..=150, 101..=250, 5.1..=10.0),
            Rarity::Rare => (100, 3, 151..=500, 251..=500, 10.1..=20.0),
            Rarity::Epic => (80, 5, 501..=1_500, 501..=1_000, 20.1..=30.0),
            Rarity::Supreme => (80, 9, 1_501..=3_000, 1_001..=2_000, 30.1..=40.0),
            Rarity::Mythical => (50, 13, 3_001..=5_000, 2_001..=3_500, 40.1..=50.0),
            Rarity::Legendary => (1, 17, 5_001..=10_000, 3_501..=5_000, 50.1..=60.0),
        };
        TierSpec {
            rarity: self,
            weight,
            min_level,
            money,
            experience,
            weight_kg,
        }
    }

    /// Whether a player at `level` can draw this tier.
    pub fn unlocked_at(self, level: u32) -> bool {
        level >= self.spec().min_level
    }

    /// The fish that can be caught in this tier.
    pub fn fish(self) -> &'static [Fish] {
        match self {
            Rarity::Trash => TRASH,
            Rarity::Common => COMMON,
            Rarity::Uncommon => UNCOMMON,
            Rarity::Rare => RARE,
            Rarity::Epic => EPIC,
            Rarity::Supreme => SUPREME,
            Rarity::Mythical => MYTHICAL,
            Rarity::Legendary => LEGENDARY,
        }
    }

    /// Embed accent colour for this tier.
    pub fn color(self) -> u32 {
        match self {
            Rarity::Trash => 0x7F8C8D,
            Rarity::Common => 0x9B59B6,
            Rarity::Uncommon => 0x2ECC71,
            Rarity::Rare => 0x3498DB,
            Rarity::Epic => 0x8E44AD,
            Rarity::Supreme => 0xE67E22,
            Rarity::Mythical => 0xE91E63,
            Rarity::Legendary => 0xF1C40F,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A catchable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fish {
    pub name: &'static str,
    pub description: &'static str,
}

const fn fish(name: &'static str, description: &'static str) -> Fish {
    Fish { name, description }
}

/// The outcome of one `/fish`.
#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub fish: Fish,
    pub rarity: Rarity,
    pub weight_kg: f64,
    pub money: u64,
    pub experience: u64,
}

/// Draw a catch for a player at `level`.
pub fn catch<R: Rng + ?Sized>(rng: &mut R, level: u32) -> Catch {
    let level = level.max(1);
    let tiers: Vec<TierSpec> = Rarity::ALL
        .iter()
        .filter(|r| r.unlocked_at(level))
        .map(|r| r.spec())
        .collect();

    // Trash and Common unlock at level 1, so `tiers` is never empty.
    let rarity = match WeightedIndex::new(tiers.iter().map(|t| t.weight)) {
        Ok(dist) => tiers[dist.sample(rng)].rarity,
        Err(_) => Rarity::Trash,
    };
    let spec = rarity.spec();

    let fish = *rarity.fish().choose(rng).unwrap_or(&TRASH[0]);

    let weight_kg = round_to_hundredths(rng.gen_range(spec.weight_kg.clone()));

    Catch {
        fish,
        rarity,
        weight_kg,
        money: rng.gen_range(spec.money),
        experience: rng.gen_range(spec.experience),
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Catch tables
// ---------------------------------------------------------------------------

const TRASH: &[Fish] = &[
    fish("Plastic Bag", "A discarded plastic bag floating in the water."),
    fish("Old Shoe", "An old, worn-out shoe that's been thrown into the water."),
    fish("Broken Bottle", "A shattered glass bottle, lost and forgotten."),
    fish("Rusty Can", "A rusty can, once holding something edible."),
    fish("Fishing Line", "A tangled mess of old fishing line."),
    fish("Wooden Plank", "A piece of driftwood, worn smooth by the water."),
    fish("Empty Can", "An empty can, discarded and forgotten."),
    fish("Discarded Net", "An old fishing net, tangled and useless."),
    fish("Torn Bag", "A bag ripped apart and left to float."),
    fish("Worn Tire", "A worn-out tire, floating aimlessly."),
];

const COMMON: &[Fish] = &[
    fish("Goldfish", "A small, shiny goldfish. Commonly found in ponds."),
    fish("Bluegill", "A small panfish with a blueish tint, found in freshwater lakes."),
    fish("Sunfish", "A small, colorful fish often found in ponds and lakes."),
    fish("Perch", "A striped fish found in lakes and rivers."),
    fish("Tilapia", "A freshwater fish known for its mild flavor."),
    fish("Carp", "A large fish found in many rivers and ponds."),
    fish("Bass", "A popular sport fish found in lakes and rivers."),
    fish("Trout", "A common fish found in clear, cold streams and rivers."),
    fish("Minnow", "A tiny silver fish darting around the shallows."),
    fish("Pike", "A long, predatory fish found in freshwater lakes."),
];

const UNCOMMON: &[Fish] = &[
    fish("Catfish", "A large fish with a whiskery face. Often found in rivers."),
    fish("Largemouth Bass", "A predatory fish known for its large mouth and fighting spirit."),
    fish("Walleye", "A freshwater fish with large eyes, known for its sharp teeth."),
    fish("Smallmouth Bass", "A fish known for its fighting ability and small mouth."),
    fish("Northern Pike", "A predatory fish with sharp teeth and a long body."),
    fish("Paddlefish", "A fish known for its long, paddle-like snout."),
    fish("Muskellunge", "A large, elusive predator found in North American lakes."),
    fish("Steelhead Trout", "A migratory fish known for its strength and fighting ability."),
    fish("Sauger", "A close relative of the walleye, found in rivers and lakes."),
    fish("Lake Sturgeon", "A prehistoric fish known for its bony plates and long lifespan."),
];

const RARE: &[Fish] = &[
    fish("Rainbow Trout", "A colorful trout with vibrant stripes. A rare catch in clear lakes."),
    fish("Arapaima", "A giant fish native to the Amazon River, known for its size."),
    fish("Tiger Trout", "A hybrid trout known for its striking pattern."),
    fish("Golden Dorado", "A powerful predator with a golden sheen."),
    fish("Grouper", "A large fish with a robust body, found in tropical waters."),
    fish("Rohu", "A large freshwater fish native to South Asia."),
    fish("Napoleon Wrasse", "A large, colorful fish found in the Indo-Pacific region."),
    fish("Red Drum", "A prized fish known for its distinctive red coloration."),
    fish("Swordfish", "A large fish known for its long, sword-like bill."),
    fish("Bluefin Tuna", "A large, fast tuna known for its blue coloration and high value."),
];

const EPIC: &[Fish] = &[
    fish("Goliath Grouper", "A massive, intimidating fish. Known for its strength and size."),
    fish("Manta Ray", "A large, graceful ray known for its wide wingspan."),
    fish("Giant Squid", "A colossal squid known for its size and elusive nature."),
    fish("Koi Fish", "A large ornamental fish known for its vibrant colors and patterns."),
    fish("Great White Shark", "A formidable predator known for its size and power."),
    fish("Orca", "A powerful marine mammal known for its intelligence and hunting skills."),
    fish("Hammerhead Shark", "A shark known for its distinctive hammer-shaped head."),
    fish("Beluga Sturgeon", "A rare sturgeon known for its large size and valuable caviar."),
    fish("Blue Marlin", "A large, fast fish known for its impressive bill and fighting ability."),
    fish("Megalodon Tooth", "A fossilized tooth from the ancient and massive Megalodon shark."),
];

const SUPREME: &[Fish] = &[
    fish("BoomFish", "BadaBOOOM."),
    fish("Electra", "A mythical fish said to harness the power of lightning."),
    fish("Inferno Fish", "A fish that supposedly burns with the fire of a thousand suns."),
    fish("Frost Dragon Fish", "A fish from the icy realms, known for its freezing breath."),
    fish("Celestial Koi", "A koi with scales that sparkle like the night sky."),
    fish("Tornado Fish", "A fish said to create whirlwinds in the water."),
    fish("Vortex Eel", "An eel known for its ability to create whirlpools."),
    fish("Phantom Ray", "A ray that appears and disappears like a ghost."),
    fish("Storm Shark", "A shark known to accompany thunderstorms."),
    fish("Phoenix Fish", "A mythical fish said to rise from the ashes."),
];

const MYTHICAL: &[Fish] = &[
    fish("Diamond Fish", "That is pricy."),
    fish("Leviathan", "A colossal sea creature from ancient legends."),
    fish("Kraken", "A giant squid-like creature feared by sailors."),
    fish("Hydra", "A multi-headed serpent with regenerative abilities."),
    fish("Triton's Trident Fish", "A fish said to be blessed by the god of the sea."),
    fish("Mermaid's Tear", "A gem said to be the tear of a mermaid, found in the sea."),
    fish("Eldritch Whale", "A whale from deep, dark corners of the ocean."),
    fish("Abyssal Fish", "A fish from the deepest, darkest depths of the sea."),
    fish("Celestial Jellyfish", "A glowing jellyfish said to be a gift from the stars."),
    fish("Astral Shark", "A shark with a celestial pattern across its body."),
];

const LEGENDARY: &[Fish] = &[
    fish("Dragonfish", "A fish with scales that shimmer like a dragon's. Extremely rare and valuable."),
    fish("Elder Kraken", "A legendary sea monster known for its immense size and power."),
    fish("Poseidon's Trident", "A powerful trident said to be wielded by the god of the sea."),
    fish("Sunfire Phoenix Fish", "A fish that rises from the ashes, said to bring good fortune."),
    fish("Primordial Leviathan", "An ancient sea creature of immense size and strength."),
    fish("Golden Sea Serpent", "A rare and majestic sea serpent covered in golden scales."),
    fish("Eldritch Kraken", "A monstrous kraken from the darkest depths of the ocean."),
    fish("Celestial Dragonfish", "A dragonfish with celestial powers and a mythical aura."),
    fish("Titanic Shark", "An enormous shark that rules the oceans with unmatched strength."),
    fish("Mystic Mermaid", "A mermaid with unparalleled beauty and magical abilities."),
];

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn weights_sum_to_one_thousand() {
        let total: u32 = Rarity::ALL.iter().map(|r| r.spec().weight).sum();
        assert_eq!(total, 1_000);
    }

    #[test]
    fn every_tier_has_ten_unique_fish() {
        let mut names = HashSet::new();
        for rarity in Rarity::ALL {
            assert_eq!(rarity.fish().len(), 10, "{rarity} table size");
            for f in rarity.fish() {
                assert!(names.insert(f.name), "duplicate fish name {}", f.name);
                assert!(!f.description.is_empty());
            }
        }
    }

    #[test]
    fn low_levels_only_unlock_basic_tiers() {
        assert!(Rarity::Trash.unlocked_at(1));
        assert!(Rarity::Common.unlocked_at(1));
        assert!(Rarity::Uncommon.unlocked_at(1));
        assert!(!Rarity::Rare.unlocked_at(2));
        assert!(Rarity::Rare.unlocked_at(3));
        assert!(!Rarity::Legendary.unlocked_at(16));
        assert!(Rarity::Legendary.unlocked_at(17));
    }

    #[test]
    fn catches_stay_within_tier_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for level in [0, 1, 3, 5, 9, 13, 17, 25] {
            for _ in 0..500 {
                let c = catch(&mut rng, level);
                let spec = c.rarity.spec();
                assert!(spec.money.contains(&c.money), "{:?}", c);
                assert!(spec.experience.contains(&c.experience), "{:?}", c);
                assert!(
                    c.weight_kg >= *spec.weight_kg.start() && c.weight_kg <= *spec.weight_kg.end(),
                    "{:?}",
                    c
                );
                assert!(c.rarity.fish().contains(&c.fish));
            }
        }
    }

    #[test]
    fn locked_tiers_are_never_drawn() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..2_000 {
            let c = catch(&mut rng, 1);
            assert!(c.rarity <= Rarity::Uncommon, "drew {} at level 1", c.rarity);
        }
    }

    #[test]
    fn high_levels_can_draw_rare_tiers() {
        let mut rng = StdRng::seed_from_u64(3);
        let seen: HashSet<Rarity> = (0..5_000).map(|_| catch(&mut rng, 25).rarity).collect();
        assert!(seen.contains(&Rarity::Mythical));
        assert!(seen.contains(&Rarity::Epic));
    }

    #[test]
    fn same_seed_same_catch() {
        let a = catch(&mut StdRng::seed_from_u64(99), 10);
        let b = catch(&mut StdRng::seed_from_u64(99), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn weight_is_rounded_to_hundredths() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let c = catch(&mut rng, 5);
            let scaled = c.weight_kg * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-6);
        }
    }
}
