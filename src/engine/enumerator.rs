use crate::engine::pck::{self, PckError};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::debug;

/// A validated pack ready for enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackHandle {
    pub path: PathBuf,
    pub size: u64,
}

/// Lists the virtual project files inside a mounted pack.
pub trait ProjectFileEnumerator: Send + Sync {
    fn enumerate_all_files(&self, pack: &PackHandle) -> Result<Vec<String>, PckError>;
}

/// Reads the file directory of a real Godot pack.
#[derive(Debug, Default, Clone, Copy)]
pub struct PckIndexEnumerator;

impl ProjectFileEnumerator for PckIndexEnumerator {
    fn enumerate_all_files(&self, pack: &PackHandle) -> Result<Vec<String>, PckError> {
        let mut reader = BufReader::new(File::open(&pack.path)?);
        let index = pck::read_index(&mut reader)?;
        debug!(
            "Pack {} written by Godot {}.{}.{} (format v{}), {} entries",
            pack.path.display(),
            index.engine_version.0,
            index.engine_version.1,
            index.engine_version.2,
            index.format_version,
            index.entries.len()
        );
        Ok(index.paths())
    }
}

const DEMO_PROJECT: [&str; 7] = [
    "res://project.godot",
    "res://main.tscn",
    "res://scenes/player/player.tscn",
    "res://scenes/player/player.gd",
    "res://scripts/game_manager.gd",
    "res://assets/textures/player_sprite.png",
    "res://assets/audio/music/main_theme.ogg",
];

/// Fixed demo project, independent of the pack's bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedProjectEnumerator;

impl ProjectFileEnumerator for SimulatedProjectEnumerator {
    fn enumerate_all_files(&self, _pack: &PackHandle) -> Result<Vec<String>, PckError> {
        Ok(DEMO_PROJECT.iter().map(|path| path.to_string()).collect())
    }
}
