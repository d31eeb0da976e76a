//! On-disk generation layout
//!
//! ```text
//! <model_dir>/
//!   CURRENT              name of the live generation
//!   gen-000001/
//!     manifest.json      generation metadata and sha256 of each artifact
//!     model.json
//!     scaler.json
//!     vocabulary.json
//!     history.json
//! ```
//!
//! A generation is assembled in a temporary directory, renamed into place,
//! and only becomes live once `CURRENT` is replaced. Every file is written
//! through a temp file and a rename, so readers see either the old or the
//! new contents, never a mix.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::aggregate::MonthlyMatrix;
use crate::error::{Error, Result};
use crate::models::YearMonth;
use crate::scaler::ScalerState;
use crate::sequence::{SequenceModel, TrainingReport};
use crate::vocabulary::Vocabulary;

/// Bumped whenever an artifact's serialized shape changes
pub const FORMAT_VERSION: u32 = 1;

pub const CURRENT_FILE: &str = "CURRENT";
const MANIFEST_FILE: &str = "manifest.json";
const MODEL_FILE: &str = "model.json";
const SCALER_FILE: &str = "scaler.json";
const VOCABULARY_FILE: &str = "vocabulary.json";
const HISTORY_FILE: &str = "history.json";

const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

/// Every artifact is wrapped with the version and generation it belongs to
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u32,
    generation: u64,
    payload: T,
}

/// Generation metadata, written last
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub window: usize,
    pub hidden_size: usize,
    pub categories: Vec<String>,
    pub report: TrainingReport,
    /// Last bootstrap month in the stored history
    #[serde(default)]
    pub synthetic_until: Option<YearMonth>,
    /// Artifact file name -> sha256 hex digest
    pub artifacts: BTreeMap<String, String>,
}

/// Everything that makes up one generation
#[derive(Debug, Clone)]
pub struct GenerationArtifacts {
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub model: SequenceModel,
    pub scaler: ScalerState,
    pub vocabulary: Vocabulary,
    pub history: MonthlyMatrix,
    pub synthetic_until: Option<YearMonth>,
    pub report: TrainingReport,
}

pub fn generation_name(generation: u64) -> String {
    format!("{}{:06}", GENERATION_PREFIX, generation)
}

pub fn parse_generation_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(GENERATION_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn generation_dir(dir: &Path, generation: u64) -> PathBuf {
    dir.join(generation_name(generation))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Write `bytes` to `dir/name` via a temp file in the same directory
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn encode<T: Serialize>(generation: u64, payload: &T) -> Result<Vec<u8>> {
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        generation,
        payload,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

fn decode<T: DeserializeOwned>(name: &str, bytes: &[u8], generation: u64) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)
        .map_err(|e| Error::ModelLoad(format!("{} is unreadable: {}", name, e)))?;
    if envelope.format_version != FORMAT_VERSION {
        return Err(Error::ModelLoad(format!(
            "{} has format version {}, expected {}",
            name, envelope.format_version, FORMAT_VERSION
        )));
    }
    if envelope.generation != generation {
        return Err(Error::ModelLoad(format!(
            "{} belongs to generation {}, expected {}",
            name, envelope.generation, generation
        )));
    }
    Ok(envelope.payload)
}

/// Write a complete generation and make it live
pub fn write_generation(dir: &Path, artifacts: &GenerationArtifacts) -> Result<()> {
    let generation = artifacts.generation;
    fs::create_dir_all(dir)?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dir)?;

    let files = [
        (MODEL_FILE, encode(generation, &artifacts.model)?),
        (SCALER_FILE, encode(generation, &artifacts.scaler)?),
        (VOCABULARY_FILE, encode(generation, &artifacts.vocabulary)?),
        (HISTORY_FILE, encode(generation, &artifacts.history)?),
    ];

    let mut digests = BTreeMap::new();
    for (name, bytes) in &files {
        write_atomic(staging.path(), name, bytes)?;
        digests.insert(name.to_string(), sha256_hex(bytes));
    }

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        generation,
        created_at: artifacts.created_at,
        window: artifacts.model.window(),
        hidden_size: artifacts.model.hidden_size(),
        categories: artifacts.vocabulary.categories().to_vec(),
        report: artifacts.report.clone(),
        synthetic_until: artifacts.synthetic_until,
        artifacts: digests,
    };
    write_atomic(staging.path(), MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)?;

    let target = generation_dir(dir, generation);
    if target.exists() {
        // Leftover from an interrupted write that never became live
        fs::remove_dir_all(&target)?;
    }
    fs::rename(staging.path(), &target)?;
    debug!(path = %target.display(), "Generation directory in place");

    write_atomic(dir, CURRENT_FILE, generation_name(generation).as_bytes())?;
    info!(generation, dir = %dir.display(), "Model generation saved");
    Ok(())
}

/// Generation named by `CURRENT`
pub fn read_current(dir: &Path) -> Result<u64> {
    let path = dir.join(CURRENT_FILE);
    let raw = fs::read_to_string(&path)
        .map_err(|e| Error::ModelLoad(format!("cannot read {}: {}", path.display(), e)))?;
    parse_generation_name(raw.trim())
        .ok_or_else(|| Error::ModelLoad(format!("CURRENT names an invalid generation: {:?}", raw)))
}

fn read_verified(gen_dir: &Path, name: &str, manifest: &Manifest) -> Result<Vec<u8>> {
    let expected = manifest
        .artifacts
        .get(name)
        .ok_or_else(|| Error::ModelLoad(format!("manifest does not list {}", name)))?;
    let path = gen_dir.join(name);
    let bytes = fs::read(&path)
        .map_err(|e| Error::ModelLoad(format!("cannot read {}: {}", path.display(), e)))?;
    if sha256_hex(&bytes) != *expected {
        return Err(Error::ModelLoad(format!("{} failed its checksum", name)));
    }
    Ok(bytes)
}

/// Read and verify every artifact of a generation
pub fn read_generation(dir: &Path, generation: u64) -> Result<(Manifest, GenerationArtifacts)> {
    let gen_dir = generation_dir(dir, generation);
    let manifest_path = gen_dir.join(MANIFEST_FILE);
    let manifest_bytes = fs::read(&manifest_path)
        .map_err(|e| Error::ModelLoad(format!("cannot read {}: {}", manifest_path.display(), e)))?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| Error::ModelLoad(format!("manifest is unreadable: {}", e)))?;

    if manifest.format_version != FORMAT_VERSION || manifest.generation != generation {
        return Err(Error::ModelLoad(format!(
            "manifest describes version {} generation {}, expected version {} generation {}",
            manifest.format_version, manifest.generation, FORMAT_VERSION, generation
        )));
    }

    let model: SequenceModel =
        decode(MODEL_FILE, &read_verified(&gen_dir, MODEL_FILE, &manifest)?, generation)?;
    let scaler: ScalerState =
        decode(SCALER_FILE, &read_verified(&gen_dir, SCALER_FILE, &manifest)?, generation)?;
    let vocabulary: Vocabulary = decode(
        VOCABULARY_FILE,
        &read_verified(&gen_dir, VOCABULARY_FILE, &manifest)?,
        generation,
    )?;
    let history: MonthlyMatrix =
        decode(HISTORY_FILE, &read_verified(&gen_dir, HISTORY_FILE, &manifest)?, generation)?;

    let artifacts = GenerationArtifacts {
        generation,
        created_at: manifest.created_at,
        model,
        scaler,
        vocabulary,
        history,
        synthetic_until: manifest.synthetic_until,
        report: manifest.report.clone(),
    };
    Ok((manifest, artifacts))
}

/// Generation numbers present on disk, ascending
pub fn list_generations(dir: &Path) -> Result<Vec<u64>> {
    let mut generations = Vec::new();
    if !dir.exists() {
        return Ok(generations);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(generation) = entry.file_name().to_str().and_then(parse_generation_name) {
            generations.push(generation);
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

/// Remove generations other than `current` and the `retain - 1` newest
/// complete ones below it, plus any abandoned staging directories
///
/// Returns the removed generation numbers.
pub fn prune(dir: &Path, current: u64, retain: usize) -> Result<Vec<u64>> {
    let keep_older = retain.saturating_sub(1);
    let generations = list_generations(dir)?;
    let older: Vec<u64> = generations
        .iter()
        .copied()
        .filter(|g| *g < current && generation_dir(dir, *g).join(MANIFEST_FILE).exists())
        .collect();
    let kept_older = &older[older.len().saturating_sub(keep_older)..];

    let mut removed = Vec::new();
    for generation in generations {
        if generation == current || kept_older.contains(&generation) {
            continue;
        }
        fs::remove_dir_all(generation_dir(dir, generation))?;
        removed.push(generation);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let stale = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(STAGING_PREFIX));
        if stale && entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        }
    }

    if !removed.is_empty() {
        debug!(?removed, current, "Pruned model generations");
    }
    Ok(removed)
}
