//! Choosing which audio file goes with each video in a batch.

use crate::error::MediaError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingPolicy {
    /// Uniform draw with replacement per video
    Random,
    /// Call k gets `audios[k mod len]`
    RoundRobin,
}

/// Shared across workers; the counter and RNG are its only mutable state.
#[derive(Debug)]
pub struct PairingAssigner {
    audios: Vec<PathBuf>,
    policy: PairingPolicy,
    counter: AtomicUsize,
    rng: Mutex<StdRng>,
}

impl PairingAssigner {
    pub fn new(audios: Vec<PathBuf>, randomize: bool) -> Result<Self, MediaError> {
        Self::with_rng(audios, randomize, StdRng::from_entropy())
    }

    /// Random pairing that repeats across runs for the same seed.
    pub fn with_seed(audios: Vec<PathBuf>, randomize: bool, seed: u64) -> Result<Self, MediaError> {
        Self::with_rng(audios, randomize, StdRng::seed_from_u64(seed))
    }

    fn with_rng(audios: Vec<PathBuf>, randomize: bool, rng: StdRng) -> Result<Self, MediaError> {
        if audios.is_empty() {
            return Err(MediaError::NoAudioAvailable);
        }
        let policy = if randomize {
            PairingPolicy::Random
        } else {
            PairingPolicy::RoundRobin
        };
        Ok(Self {
            audios,
            policy,
            counter: AtomicUsize::new(0),
            rng: Mutex::new(rng),
        })
    }

    pub fn policy(&self) -> PairingPolicy {
        self.policy
    }

    pub fn audios(&self) -> &[PathBuf] {
        &self.audios
    }

    /// Audio for the next video.
    pub fn next(&self) -> &Path {
        let index = match self.policy {
            PairingPolicy::RoundRobin => {
                self.counter.fetch_add(1, Ordering::Relaxed) % self.audios.len()
            }
            PairingPolicy::Random => {
                // a poisoned lock still holds a usable RNG
                let mut rng = match self.rng.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                rng.gen_range(0..self.audios.len())
            }
        };
        &self.audios[index]
    }
}
