/// Source of the primes used as class keys
pub trait PrimeSupplier: Send + Sync {
    /// Smallest prime strictly greater than `n`
    fn next_prime(&self, n: u64) -> u64;
}

/// Trial division by odd candidates up to the square root.
///
/// Keys stay small (one prime per sibling, reset on every level), so this is
/// never the bottleneck of an encoder run.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrialDivision;

impl TrialDivision {
    pub fn is_prime(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        if n % 2 == 0 {
            return n == 2;
        }
        let mut d = 3u64;
        while d.saturating_mul(d) <= n {
            if n % d == 0 {
                return false;
            }
            d += 2;
        }
        true
    }
}

impl PrimeSupplier for TrialDivision {
    fn next_prime(&self, n: u64) -> u64 {
        let mut candidate = n.saturating_add(1).max(2);
        while !Self::is_prime(candidate) {
            candidate += 1;
        }
        candidate
    }
}
