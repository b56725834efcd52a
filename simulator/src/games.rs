//! Outcome generation for the simulated games.

use rand::Rng;
use sweeps_types::{DiceDirection, GameRoundOutcome, SLOT_REELS, SLOT_SYMBOLS};

/// Three-of-a-kind multiplier per slot symbol index.
pub const SLOT_PAYOUTS: [f64; SLOT_SYMBOLS.len()] = [2.0, 3.0, 4.0, 5.0, 10.0, 20.0, 50.0];

/// Dice payouts are `bet * DICE_EDGE / chance`.
pub const DICE_EDGE: f64 = 99.0;

/// Probability that a ticket reveals a win.
pub const TICKET_WIN_CHANCE: f64 = 0.3;

/// Ticket prize as a multiple of its price, with relative weight.
pub const TICKET_PRIZES: [(f64, u32); 4] = [(1.0, 50), (2.0, 30), (5.0, 15), (10.0, 5)];

/// Symbols printed under a ticket's foil.
const TICKET_SYMBOLS: usize = 9;

/// Round to whole cents.
pub fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn settle(bet: f64, multiplier: Option<f64>) -> GameRoundOutcome {
    match multiplier {
        Some(multiplier) => GameRoundOutcome::win(cents(bet * multiplier)),
        None => GameRoundOutcome::loss(),
    }
}

/// Payout multiplier for a set of reel indices.
pub fn slot_multiplier(reels: &[u8]) -> Option<f64> {
    let first = *reels.first()?;
    if reels.iter().all(|&r| r == first) {
        SLOT_PAYOUTS.get(first as usize).copied()
    } else {
        None
    }
}

pub fn spin<R: Rng>(rng: &mut R, bet: f64) -> GameRoundOutcome {
    let reels: Vec<u8> = (0..SLOT_REELS)
        .map(|_| rng.gen_range(0..SLOT_SYMBOLS.len() as u8))
        .collect();
    let mut outcome = settle(bet, slot_multiplier(&reels));
    outcome.reels = Some(reels);
    outcome
}

/// Win probability in percent for a dice bet, if the bet is playable.
pub fn dice_chance(target: f64, direction: DiceDirection) -> Option<f64> {
    let chance = match direction {
        DiceDirection::Over => 100.0 - target,
        DiceDirection::Under => target,
    };
    (chance > 0.0 && chance < 100.0).then_some(chance)
}

/// Roll in `0.0..100.0` with one decimal.
pub fn roll<R: Rng>(
    rng: &mut R,
    bet: f64,
    target: f64,
    direction: DiceDirection,
) -> Option<GameRoundOutcome> {
    let chance = dice_chance(target, direction)?;
    let value = rng.gen_range(0..1000u32) as f64 / 10.0;
    Some(dice_outcome(value, bet, target, direction, chance))
}

pub fn dice_outcome(
    value: f64,
    bet: f64,
    target: f64,
    direction: DiceDirection,
    chance: f64,
) -> GameRoundOutcome {
    let multiplier = direction
        .wins(value, target)
        .then(|| DICE_EDGE / chance);
    let mut outcome = settle(bet, multiplier);
    outcome.roll = Some(value);
    outcome
}

/// Even-money style wager for games without dedicated logic.
pub fn coin<R: Rng>(rng: &mut R, bet: f64) -> GameRoundOutcome {
    settle(bet, rng.gen_bool(0.49).then_some(2.0))
}

/// Draw the fixed outcome of a ticket at reveal.
pub fn ticket<R: Rng>(rng: &mut R, price: f64) -> GameRoundOutcome {
    let winning_symbol = rng.gen_range(0..SLOT_SYMBOLS.len() as u8);
    let mut symbols: Vec<u8> = Vec::with_capacity(TICKET_SYMBOLS);
    let multiplier = if rng.gen_bool(TICKET_WIN_CHANCE) {
        symbols.extend([winning_symbol; 3]);
        let total: u32 = TICKET_PRIZES.iter().map(|(_, weight)| weight).sum();
        let mut pick = rng.gen_range(0..total);
        TICKET_PRIZES.iter().find_map(|&(multiplier, weight)| {
            if pick < weight {
                Some(multiplier)
            } else {
                pick -= weight;
                None
            }
        })
    } else {
        None
    };

    // Fill so that no other symbol appears three times
    let mut counts = [0u8; SLOT_SYMBOLS.len()];
    for &s in &symbols {
        counts[s as usize] += 1;
    }
    while symbols.len() < TICKET_SYMBOLS {
        let s = rng.gen_range(0..SLOT_SYMBOLS.len() as u8);
        if counts[s as usize] < 2 {
            counts[s as usize] += 1;
            symbols.push(s);
        }
    }

    let mut outcome = settle(price, multiplier);
    outcome.symbols = Some(symbols);
    outcome
}
