//! Room code generation.

use clipbridge_protocol::RoomCode;
use rand::Rng;

use crate::{RelayConfig, RoomError};

/// Produces random room codes and retries until one is free.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    alphabet: Vec<char>,
    length: usize,
    max_attempts: u32,
}

impl CodeGenerator {
    /// Builds a generator from a config. The config is validated first, so
    /// the alphabet is never empty.
    pub fn new(config: &RelayConfig) -> Self {
        let config = config.clone().validated();
        Self {
            alphabet: config.code_alphabet.chars().collect(),
            length: config.code_length,
            max_attempts: config.max_code_attempts,
        }
    }

    /// Draws one code without checking for collisions.
    pub fn random_code(&self) -> RoomCode {
        let mut rng = rand::rng();
        let code: String = (0..self.length)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect();
        RoomCode::normalize(&code)
    }

    /// Generates a code for which `is_taken` returns `false`.
    ///
    /// The caller must hold whatever lock protects the live set for the
    /// duration of the call and the subsequent insert.
    pub fn generate(
        &self,
        mut is_taken: impl FnMut(&RoomCode) -> bool,
    ) -> Result<RoomCode, RoomError> {
        for attempt in 1..=self.max_attempts {
            let code = self.random_code();
            if !is_taken(&code) {
                if attempt > 1 {
                    tracing::debug!(attempt, "room code collision resolved");
                }
                return Ok(code);
            }
        }
        tracing::error!(
            attempts = self.max_attempts,
            "room code space exhausted"
        );
        Err(RoomError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn tiny_generator(max_attempts: u32) -> CodeGenerator {
        CodeGenerator::new(&RelayConfig {
            code_alphabet: "AB".into(),
            code_length: 2,
            max_code_attempts: max_attempts,
            ..RelayConfig::default()
        })
    }

    #[test]
    fn test_random_code_uses_configured_shape() {
        let generator = CodeGenerator::new(&RelayConfig::default());
        for _ in 0..200 {
            let code = generator.random_code();
            assert_eq!(code.as_str().len(), 6);
            assert!(
                code.as_str()
                    .chars()
                    .all(|c| RelayConfig::DEFAULT_ALPHABET.contains(c))
            );
        }
    }

    #[test]
    fn test_lowercase_alphabet_still_yields_canonical_codes() {
        let generator = CodeGenerator::new(&RelayConfig {
            code_alphabet: "xyz".into(),
            ..RelayConfig::default()
        });
        let code = generator.random_code();
        assert_eq!(code.as_str(), code.as_str().to_ascii_uppercase());
    }

    #[test]
    fn test_generate_fills_code_space_without_duplicates() {
        let generator = tiny_generator(1_000);
        let mut live = HashSet::new();
        for _ in 0..4 {
            let code = generator.generate(|c| live.contains(c)).unwrap();
            assert!(live.insert(code), "generated a live code twice");
        }
        assert_eq!(live.len(), 4);
    }

    #[test]
    fn test_generate_reports_exhaustion() {
        let generator = tiny_generator(10);
        let result = generator.generate(|_| true);
        assert!(matches!(result, Err(RoomError::Exhausted { attempts: 10 })));
    }

    #[test]
    fn test_generate_retries_on_collision() {
        let generator = CodeGenerator::new(&RelayConfig::default());
        let mut calls = 0;
        let code = generator
            .generate(|_| {
                calls += 1;
                calls < 3
            })
            .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(code.as_str().len(), 6);
    }
}
