//! Token value generation.
//!
//! All three token kinds share one generator. A seed that links the token
//! to its consumer and grant (consumer key + permissions, or a previous
//! token's plaintext) is mixed with random characters and then encrypted
//! under the consumer's key:
//!
//! 1. Walk the first `min(32, len(seed))` seed characters. For each one a
//!    fair coin decides whether to keep it or replace it with the next
//!    character from a pool of 32 random hex characters (the pool is
//!    redrawn once used up).
//! 2. Pad with fresh random characters to exactly 45 characters.
//! 3. Encrypt the 45-character plaintext; the ciphertext is the token value.
//!
//! The random source only needs to make values unlinkable and distinct,
//! the encryption step is what makes them opaque.

use rand::Rng;
use uuid::Builder;

use crate::cipher::{self, CipherError, EncryptionKey};

/// Maximum number of seed characters considered for mixing.
pub const MIX_WINDOW: usize = 32;

/// Length of a token's plaintext before encryption.
pub const PLAINTEXT_LEN: usize = 45;

/// Generate a new token value from `seed`, encrypted under `key`.
///
/// Fails only when the cipher itself fails, which indicates a broken key
/// rather than a bad request.
pub fn generate(seed: &str, key: &EncryptionKey) -> Result<String, CipherError> {
    let mixed = mix_seed(seed, &mut rand::thread_rng());
    cipher::encrypt(&mixed.plaintext, key)
}

/// The plaintext of a token before encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedSeed {
    /// The 45-character plaintext.
    pub plaintext: String,

    /// For each of the leading seed positions that were considered, whether
    /// the seed character was replaced by a random one.
    pub substituted: Vec<bool>,
}

/// Mix `seed` with random characters drawn from `rng`.
///
/// Exposed so the mixing step can be driven by a seeded RNG.
pub fn mix_seed<R: Rng + ?Sized>(seed: &str, rng: &mut R) -> MixedSeed {
    let mut pool = RandomPool::draw(rng);
    let mut plaintext = String::with_capacity(PLAINTEXT_LEN);
    let mut substituted = Vec::with_capacity(MIX_WINDOW);

    for seed_char in seed.chars().take(MIX_WINDOW) {
        let replace = rng.gen_bool(0.5);
        if replace {
            plaintext.push(pool.next(rng));
        } else {
            plaintext.push(seed_char);
        }
        substituted.push(replace);
    }

    let mut len = substituted.len();
    while len < PLAINTEXT_LEN {
        plaintext.push(pool.next(rng));
        len += 1;
    }

    MixedSeed {
        plaintext,
        substituted,
    }
}

/// A pool of 32 random hex characters taken from a v4 UUID.
struct RandomPool {
    chars: Vec<char>,
    cursor: usize,
}

impl RandomPool {
    fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let uuid = Builder::from_random_bytes(rng.r#gen()).into_uuid();
        Self {
            chars: uuid.simple().to_string().chars().collect(),
            cursor: 0,
        }
    }

    fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> char {
        if self.cursor >= self.chars.len() {
            *self = Self::draw(rng);
        }
        let c = self.chars[self.cursor];
        self.cursor += 1;
        c
    }
}
