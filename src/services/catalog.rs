// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise and program catalog loading and lookup.

use crate::models::{Exercise, MuscleGroup, Program, ProgramGroup, ProgramLevel, Tool};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use validator::Validate;

/// On-disk catalog layout.
#[derive(Debug, Deserialize, Validate)]
struct CatalogFile {
    muscle_groups: Vec<MuscleGroup>,
    tools: Vec<Tool>,
    #[validate(nested)]
    exercises: Vec<ExerciseEntry>,
    #[validate(nested)]
    program_groups: Vec<ProgramGroupEntry>,
    program_levels: Vec<ProgramLevel>,
    #[validate(nested)]
    programs: Vec<ProgramEntry>,
}

#[derive(Debug, Deserialize, Validate)]
struct ExerciseEntry {
    #[validate(length(min = 1, message = "Exercise id must not be empty"))]
    id: String,
    name: String,
    group_id: String,
    tool_id: String,
}

#[derive(Debug, Deserialize, Validate)]
struct ProgramGroupEntry {
    #[validate(length(min = 1, message = "Program group id must not be empty"))]
    id: String,
    name: String,
    #[validate(range(max = 30, message = "Rest between trainings must be at most 30 days"))]
    days_between_trainings: u32,
}

#[derive(Debug, Deserialize, Validate)]
struct ProgramEntry {
    id: u32,
    group_id: String,
    level_id: String,
    #[validate(length(min = 1, message = "Program must have at least one day"))]
    days: Vec<Vec<String>>,
}

/// Immutable reference data, loaded once at startup.
#[derive(Default, Clone)]
pub struct CatalogService {
    exercises: HashMap<String, Exercise>,
    groups: HashMap<String, MuscleGroup>,
    tools: HashMap<String, Tool>,
    programs: Vec<Program>,
}

impl CatalogService {
    /// Load the catalog from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load the catalog from a JSON string, resolving and checking every
    /// cross reference.
    pub fn load_from_json(json_data: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json_data).map_err(|e| CatalogError::ParseError(e.to_string()))?;
        file.validate()
            .map_err(|e| CatalogError::Invalid(e.to_string()))?;

        let groups = unique_by_id(file.muscle_groups, |g| g.id.clone(), "muscle group")?;
        let tools = unique_by_id(file.tools, |t| t.id.clone(), "tool")?;
        let program_groups =
            unique_by_id(file.program_groups, |g| g.id.clone(), "program group")?;
        let levels = unique_by_id(file.program_levels, |l| l.id.clone(), "program level")?;

        let mut exercises = HashMap::new();
        for entry in file.exercises {
            if !groups.contains_key(&entry.group_id) {
                return Err(CatalogError::UnknownReference("muscle group", entry.group_id));
            }
            let tool = tools
                .get(&entry.tool_id)
                .ok_or_else(|| CatalogError::UnknownReference("tool", entry.tool_id.clone()))?;
            let exercise = Exercise {
                needs_weight: tool.needs_weight,
                id: entry.id,
                name: entry.name,
                group_id: entry.group_id,
                tool_id: entry.tool_id,
            };
            if exercises.insert(exercise.id.clone(), exercise).is_some() {
                return Err(CatalogError::Duplicate("exercise"));
            }
        }

        let mut seen_programs = HashSet::new();
        let mut programs = Vec::new();
        for entry in file.programs {
            if !seen_programs.insert(entry.id) {
                return Err(CatalogError::Duplicate("program"));
            }
            let group = program_groups.get(&entry.group_id).ok_or_else(|| {
                CatalogError::UnknownReference("program group", entry.group_id.clone())
            })?;
            if !levels.contains_key(&entry.level_id) {
                return Err(CatalogError::UnknownReference("program level", entry.level_id));
            }
            for day in &entry.days {
                if day.is_empty() {
                    return Err(CatalogError::Invalid(format!(
                        "program {} has an empty day",
                        entry.id
                    )));
                }
                if let Some(missing) = day.iter().find(|id| !exercises.contains_key(*id)) {
                    return Err(CatalogError::UnknownReference("exercise", missing.clone()));
                }
            }
            programs.push(Program {
                id: entry.id,
                days_between_trainings: group.days_between_trainings,
                group_id: entry.group_id,
                level_id: entry.level_id,
                days: entry.days,
            });
        }
        programs.sort_by_key(|p| p.id);

        tracing::info!(
            exercises = exercises.len(),
            programs = programs.len(),
            "Loaded catalog"
        );
        Ok(Self {
            exercises,
            groups,
            tools,
            programs,
        })
    }

    pub fn exercise(&self, exercise_id: &str) -> Option<&Exercise> {
        self.exercises.get(exercise_id)
    }

    /// Display name of a muscle group.
    pub fn group_name(&self, group_id: &str) -> Option<&str> {
        self.groups.get(group_id).map(|g| g.name.as_str())
    }

    pub fn tool_name(&self, tool_id: &str) -> Option<&str> {
        self.tools.get(tool_id).map(|t| t.name.as_str())
    }

    pub fn program(&self, program_id: u32) -> Option<&Program> {
        self.programs.iter().find(|p| p.id == program_id)
    }

    /// The program offered for a (group, level) pair.
    pub fn program_for(&self, group_id: &str, level_id: &str) -> Option<&Program> {
        self.programs
            .iter()
            .find(|p| p.group_id == group_id && p.level_id == level_id)
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }
}

fn unique_by_id<T, F>(
    items: Vec<T>,
    id: F,
    kind: &'static str,
) -> Result<HashMap<String, T>, CatalogError>
where
    F: Fn(&T) -> String,
{
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        if map.insert(id(&item), item).is_some() {
            return Err(CatalogError::Duplicate(kind));
        }
    }
    Ok(map)
}

/// Errors from catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse catalog JSON: {0}")]
    ParseError(String),

    #[error("Invalid catalog: {0}")]
    Invalid(String),

    #[error("Duplicate {0} id")]
    Duplicate(&'static str),

    #[error("Unknown {0} referenced: {1}")]
    UnknownReference(&'static str, String),
}
