// Dice alphabet and payout rules.

/// Number of dice rolled per round.
pub const DICE_COUNT: usize = 6;

/// The six faces of a Langur Burja die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Diamonds,
    Clubs,
    Hearts,
    Spades,
    Crown,
    Flag,
}

impl Symbol {
    pub const ALL: [Symbol; 6] = [
        Symbol::Diamonds,
        Symbol::Clubs,
        Symbol::Hearts,
        Symbol::Spades,
        Symbol::Crown,
        Symbol::Flag,
    ];

    /// Canonical wire/log name for the symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::Diamonds => "DIAMONDS",
            Symbol::Clubs => "CLUBS",
            Symbol::Hearts => "HEARTS",
            Symbol::Spades => "SPADES",
            Symbol::Crown => "CROWN",
            Symbol::Flag => "FLAG",
        }
    }
}

/// Counts how many dice in the roll show the given symbol.
pub fn count_matches(dice: &[Symbol; DICE_COUNT], symbol: Symbol) -> u32 {
    dice.iter().filter(|&&d| d == symbol).count() as u32
}

/// Total returned to the bettor for a matching roll: stake plus stake per die.
///
/// `count` ranges 0..=6, so the multiplier is 1..=7 and a six-of-a-kind match
/// pays seven times the stake.
pub fn payout_cents(stake_cents: i64, count: u32) -> i64 {
    stake_cents * (1 + i64::from(count))
}
