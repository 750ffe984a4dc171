use serde::{Deserialize, Serialize};
use std::fmt;

/// Project file categories, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    Scene,
    Script,
    Resource,
    Asset,
    Shader,
    Font,
}

impl FileCategory {
    pub const ALL: [FileCategory; 6] = [
        FileCategory::Scene,
        FileCategory::Script,
        FileCategory::Resource,
        FileCategory::Asset,
        FileCategory::Shader,
        FileCategory::Font,
    ];

    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            FileCategory::Scene => &[".tscn", ".scn"],
            FileCategory::Script => &[".gd", ".cs"],
            FileCategory::Resource => &[".tres", ".res"],
            FileCategory::Asset => &[
                ".png", ".jpg", ".jpeg", ".webp", ".svg", ".ogg", ".wav", ".mp3", ".glb", ".gltf",
                ".obj",
            ],
            FileCategory::Shader => &[".gdshader", ".shader"],
            FileCategory::Font => &[".ttf", ".otf", ".woff", ".woff2", ".fnt"],
        }
    }

    /// First category whose suffix matches, case-insensitively.
    pub fn classify(path: &str) -> Option<FileCategory> {
        let lower = path.to_lowercase();
        Self::ALL.into_iter().find(|category| {
            category
                .suffixes()
                .iter()
                .any(|suffix| lower.ends_with(suffix))
        })
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileCategory::Scene => "Scenes",
            FileCategory::Script => "Scripts",
            FileCategory::Resource => "Resources",
            FileCategory::Asset => "Assets",
            FileCategory::Shader => "Shaders",
            FileCategory::Font => "Fonts",
        };
        f.write_str(name)
    }
}

/// Read-only view over a loaded pack's contents, rebuilt on every load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectStructureSummary {
    pub scenes: Vec<String>,
    pub scripts: Vec<String>,
    pub resources: Vec<String>,
    pub assets: Vec<String>,
    pub shaders: Vec<String>,
    pub fonts: Vec<String>,
    /// Paths that matched no category
    pub unclassified: usize,
}

impl ProjectStructureSummary {
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut summary = Self::default();
        for path in paths {
            let path = path.as_ref();
            match FileCategory::classify(path) {
                Some(category) => summary.files_mut(category).push(path.to_string()),
                None => summary.unclassified += 1,
            }
        }
        summary
    }

    pub fn files(&self, category: FileCategory) -> &[String] {
        match category {
            FileCategory::Scene => &self.scenes,
            FileCategory::Script => &self.scripts,
            FileCategory::Resource => &self.resources,
            FileCategory::Asset => &self.assets,
            FileCategory::Shader => &self.shaders,
            FileCategory::Font => &self.fonts,
        }
    }

    fn files_mut(&mut self, category: FileCategory) -> &mut Vec<String> {
        match category {
            FileCategory::Scene => &mut self.scenes,
            FileCategory::Script => &mut self.scripts,
            FileCategory::Resource => &mut self.resources,
            FileCategory::Asset => &mut self.assets,
            FileCategory::Shader => &mut self.shaders,
            FileCategory::Font => &mut self.fonts,
        }
    }

    pub fn count(&self, category: FileCategory) -> usize {
        self.files(category).len()
    }

    pub fn total_classified(&self) -> usize {
        FileCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }
}

impl fmt::Display for ProjectStructureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = FileCategory::ALL
            .iter()
            .map(|category| format!("{}: {}", category, self.count(*category)))
            .collect();
        write!(f, "{}", counts.join(", "))
    }
}
