use rand::Rng;

/// A string of `len` printable ASCII characters (space through tilde).
pub fn random_printable<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.gen_range(b' '..=b'~')))
        .collect()
}

/// Picks an index from `weights` with probability proportional to its
/// weight. All weights zero picks the first.
pub fn weighted_choice<R: Rng + ?Sized>(rng: &mut R, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0;
    }
    let mut point = rng.gen_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        if point < *weight {
            return index;
        }
        point -= weight;
    }
    weights.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_random_printable_is_printable_and_seeded() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let value = random_printable(&mut a, 256);
        assert_eq!(value.len(), 256);
        assert!(value.bytes().all(|c| (b' '..=b'~').contains(&c)));
        assert_eq!(value, random_printable(&mut b, 256));
    }

    #[test]
    fn test_weighted_choice_skips_zero_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_ne!(weighted_choice(&mut rng, &[1.0, 0.0, 2.0]), 1);
        }
        assert_eq!(weighted_choice(&mut rng, &[0.0, 0.0]), 0);
    }
}
