//! Points for a scoring guess.

use rebus_protocol::MatchKind;

/// Points for a correct guess at the very start of a round.
pub const MAX_POINTS: u32 = 1000;

/// Points a correct guess is worth no matter how late it lands.
pub const MIN_POINTS: u32 = 50;

/// Share of the time-based points a partial guess earns before the
/// similarity multiplier.
const PARTIAL_FACTOR: f64 = 0.5;

/// Points earned by a guess with `remaining` of `total` seconds left.
///
/// `base = max(round(1000 × remaining / total), 50)`; a correct guess
/// earns `base`, a partial guess `round(base × 0.5 × similarity)`, and a
/// wrong guess nothing. The floor is applied before the partial
/// multiplier, so a late partial can fall below 50.
///
/// ```
/// use rebus_protocol::MatchKind;
/// use rebus_room::score;
///
/// assert_eq!(score(21.0, 30.0, MatchKind::Correct, 1.0), 700);
/// assert_eq!(score(0.0, 30.0, MatchKind::Correct, 1.0), 50);
/// ```
pub fn score(remaining: f64, total: f64, kind: MatchKind, similarity: f64) -> u32 {
    let ratio = if total > 0.0 {
        (remaining / total).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let base = ((f64::from(MAX_POINTS) * ratio).round() as u32).max(MIN_POINTS);

    match kind {
        MatchKind::Correct => base,
        MatchKind::Partial => {
            (f64::from(base) * PARTIAL_FACTOR * similarity.clamp(0.0, 1.0)).round() as u32
        }
        MatchKind::Wrong => 0,
    }
}
