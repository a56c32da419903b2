//! Random room names.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "dapper", "eager", "fuzzy", "gentle", "hazy", "jolly", "keen",
    "lively", "mellow", "nimble", "quiet", "rapid", "sunny", "tidy", "vivid", "witty", "zesty",
];

const NOUNS: &[&str] = &[
    "badger", "comet", "delta", "falcon", "garden", "harbor", "island", "lantern", "meadow",
    "nebula", "otter", "pepper", "quartz", "river", "summit", "tiger", "valley", "willow",
];

/// Generate a name like `quiet-otter-482`.
pub fn generate_room_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("room");
    let number: u16 = rng.gen_range(100..1000);
    format!("{adjective}-{noun}-{number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_shape() {
        for _ in 0..50 {
            let name = generate_room_name();
            let parts: Vec<&str> = name.split('-').collect();
            assert_eq!(parts.len(), 3, "unexpected name {name}");
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(NOUNS.contains(&parts[1]));

            let number: u16 = parts[2].parse().unwrap();
            assert!((100..1000).contains(&number));
        }
    }
}
