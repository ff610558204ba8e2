//! Random display names for registry sign-up: `<Adjective><Noun><0..999>`.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "Happy", "Lucky", "Sunny", "Clever", "Swift", "Brave", "Bright", "Cool", "Wild", "Calm",
];

const NOUNS: &[&str] = &[
    "Tiger", "Eagle", "Dolphin", "Falcon", "Wolf", "Bear", "Lion", "Hawk", "Fox", "Owl",
];

pub fn random_display_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Happy");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Owl");
    let number: u16 = rng.gen_range(0..1000);
    format!("{adjective}{noun}{number}")
}
