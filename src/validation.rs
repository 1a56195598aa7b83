use std::path::Path;

use anyhow::{anyhow, Result};
use regex::Regex;

/// Upper bound on extraction worker threads.
pub const MAX_CONCURRENCY: usize = 256;

/// Upper bound on records per persistence transaction.
pub const MAX_CHUNK_SIZE: usize = 1_000_000;

/// Validation utilities for command-line and configuration input
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate worker count; `0` selects one worker per CPU
    pub fn validate_concurrency(concurrency: usize) -> Result<()> {
        if concurrency > MAX_CONCURRENCY {
            return Err(anyhow!(
                "Concurrency too large ({concurrency}, max {MAX_CONCURRENCY})"
            ));
        }

        Ok(())
    }

    /// Validate records per chunk
    pub fn validate_chunk_size(size: usize) -> Result<()> {
        if size == 0 {
            return Err(anyhow!("Chunk size must be greater than 0"));
        }

        if size > MAX_CHUNK_SIZE {
            return Err(anyhow!("Chunk size too large (max 1,000,000)"));
        }

        Ok(())
    }

    /// Validate an input file name against the naming convention
    pub fn validate_file_name(name: &str, pattern: &Regex) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("File name cannot be empty"));
        }

        if !pattern.is_match(name) {
            return Err(anyhow!(
                "File name {name:?} does not match the naming convention {}",
                pattern.as_str()
            ));
        }

        Ok(())
    }

    /// Validate the input root: an existing file or directory, or a glob pattern
    pub fn validate_input(input: &str) -> Result<()> {
        if input.trim().is_empty() {
            return Err(anyhow!("Input path cannot be empty"));
        }

        if input.contains('\0') {
            return Err(anyhow!("Input path contains invalid characters"));
        }

        if is_glob(input) {
            glob::Pattern::new(input).map_err(|e| anyhow!("Invalid glob pattern {input:?}: {e}"))?;
            return Ok(());
        }

        if !Path::new(input).exists() {
            return Err(anyhow!("Input path does not exist: {input}"));
        }

        Ok(())
    }

    /// Validate the store location
    pub fn validate_database_path(path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(anyhow!("Database path cannot be empty"));
        }

        if path.len() > 4096 {
            return Err(anyhow!("Database path too long (max 4096 characters)"));
        }

        let stripped = path
            .strip_prefix("sqlite://")
            .or_else(|| path.strip_prefix("sqlite:"))
            .unwrap_or(path);
        if Path::new(stripped).is_dir() {
            return Err(anyhow!("Database path is a directory: {stripped}"));
        }

        Ok(())
    }
}

/// Whether `input` contains glob metacharacters.
#[must_use]
pub fn is_glob(input: &str) -> bool {
    input.contains(['*', '?', '['])
}
