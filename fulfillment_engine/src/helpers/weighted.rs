use rand::Rng;

/// Anything that can take part in a weighted random draw.
pub trait Weighted {
    fn weight(&self) -> i64;
}

/// Picks one candidate at random, with probability proportional to its weight.
///
/// Negative weights count as zero. If every weight is zero, the draw is uniform. Otherwise a value `r` is drawn from
/// `[0, total)` and the first candidate whose cumulative weight exceeds `r` wins. The last candidate is returned if
/// the walk falls off the end.
///
/// The random source is supplied by the caller, so outcomes can be reproduced with a seeded generator.
pub fn weighted_pick<'a, T: Weighted, R: Rng + ?Sized>(candidates: &'a [T], rng: &mut R) -> Option<&'a T> {
    if candidates.is_empty() {
        return None;
    }
    let total: i64 = candidates.iter().map(|c| c.weight().max(0)).sum();
    if total <= 0 {
        let idx = rng.gen_range(0..candidates.len());
        return candidates.get(idx);
    }
    let r = rng.gen_range(0..total);
    let mut cumulative = 0;
    for candidate in candidates {
        cumulative += candidate.weight().max(0);
        if r < cumulative {
            return Some(candidate);
        }
    }
    candidates.last()
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct W(&'static str, i64);

    impl Weighted for W {
        fn weight(&self) -> i64 {
            self.1
        }
    }

    #[test]
    fn empty() {
        let mut rng = StdRng::seed_from_u64(1);
        let candidates: Vec<W> = vec![];
        assert!(weighted_pick(&candidates, &mut rng).is_none());
    }

    #[test]
    fn single_candidate() {
        let mut rng = StdRng::seed_from_u64(1);
        let candidates = vec![W("a", 5)];
        assert_eq!(weighted_pick(&candidates, &mut rng).unwrap().0, "a");
    }

    #[test]
    fn one_to_three_split() {
        let mut rng = StdRng::seed_from_u64(42);
        let candidates = vec![W("light", 1), W("heavy", 3)];
        let trials = 4000;
        let heavy = (0..trials).filter(|_| weighted_pick(&candidates, &mut rng).unwrap().0 == "heavy").count();
        let ratio = heavy as f64 / trials as f64;
        assert!((ratio - 0.75).abs() < 0.03, "heavy was picked {ratio:.3} of the time");
    }

    #[test]
    fn zero_weights_draw_uniformly() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = vec![W("a", 0), W("b", 0)];
        let trials = 4000;
        let a = (0..trials).filter(|_| weighted_pick(&candidates, &mut rng).unwrap().0 == "a").count();
        let ratio = a as f64 / trials as f64;
        assert!((ratio - 0.5).abs() < 0.03, "a was picked {ratio:.3} of the time");
    }

    #[test]
    fn zero_weight_never_wins_against_positive() {
        let mut rng = StdRng::seed_from_u64(3);
        let candidates = vec![W("never", 0), W("always", 2)];
        for _ in 0..500 {
            assert_eq!(weighted_pick(&candidates, &mut rng).unwrap().0, "always");
        }
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let candidates = vec![W("a", 1), W("b", 1), W("c", 1)];
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20).map(|_| weighted_pick(&candidates, &mut rng).unwrap().0).collect::<Vec<_>>()
        };
        assert_eq!(draw(99), draw(99));
    }
}
