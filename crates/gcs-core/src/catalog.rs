//! Static command catalog.
//!
//! A catalog maps command names to their MAV_CMD code and the layout of the
//! seven parameter slots. It is loaded once (the built-in JSON table or an
//! external file) and is read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::encoding::Encoding;
use crate::error::{CatalogError, CommandError};
use crate::models::{MavFrame, PARAM_SLOTS};

const BUILTIN_CATALOG: &str = include_str!("../catalog/commands.json");

/// Semantic type of a bound parameter. Informational only: values are never
/// converted between kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    Number,
    /// Degrees
    Latitude,
    /// Degrees
    Longitude,
    /// Metres, in the command frame
    Altitude,
    /// Degrees
    Angle,
}

/// Declaration of one parameter slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotSpec {
    /// Always transmitted as this constant
    Reserved { reserved: f32 },
    /// Filled from the caller's arguments, in order
    Bound {
        label: String,
        #[serde(default)]
        kind: ParamKind,
    },
}

impl SlotSpec {
    pub fn is_bound(&self) -> bool {
        matches!(self, SlotSpec::Bound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    pub code: u16,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub frame: MavFrame,
    /// Constant carried by slots past the end of `params`
    #[serde(default)]
    pub reserved_fill: f32,
    #[serde(default)]
    pub params: Vec<SlotSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, code: u16) -> Self {
        Self {
            name: name.into(),
            code,
            encoding: Encoding::default(),
            frame: MavFrame::default(),
            reserved_fill: 0.0,
            params: Vec::new(),
            description: None,
        }
    }

    pub fn bound(mut self, label: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(SlotSpec::Bound {
            label: label.into(),
            kind,
        });
        self
    }

    pub fn reserved(mut self, value: f32) -> Self {
        self.params.push(SlotSpec::Reserved { reserved: value });
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_frame(mut self, frame: MavFrame) -> Self {
        self.frame = frame;
        self
    }

    /// Number of caller-supplied values this command takes.
    pub fn bound_count(&self) -> usize {
        self.params.iter().filter(|slot| slot.is_bound()).count()
    }

    /// Slot declaration for every transmitted position, padding with the
    /// reserved fill.
    pub fn slots(&self) -> impl Iterator<Item = SlotSpec> + '_ {
        (0..PARAM_SLOTS).map(move |index| match self.params.get(index) {
            Some(slot) => slot.clone(),
            None => SlotSpec::Reserved {
                reserved: self.reserved_fill,
            },
        })
    }

    /// Labels of the bound slots, in argument order.
    pub fn bound_labels(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|slot| match slot {
                SlotSpec::Bound { label, .. } => Some(label.as_str()),
                SlotSpec::Reserved { .. } => None,
            })
            .collect()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.params.len() > PARAM_SLOTS {
            return Err(CatalogError::TooManySlots {
                name: self.name.clone(),
                slots: self.params.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    commands: Vec<CommandDefinition>,
}

/// Read-only lookup table of command definitions.
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    definitions: Vec<CommandDefinition>,
    by_name: HashMap<String, usize>,
    by_code: HashMap<u16, usize>,
}

impl CommandCatalog {
    /// Build a catalog, rejecting oversized definitions and duplicates.
    pub fn from_definitions(definitions: Vec<CommandDefinition>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(definitions.len());
        let mut by_code: HashMap<u16, usize> = HashMap::with_capacity(definitions.len());

        for (index, definition) in definitions.iter().enumerate() {
            definition.validate()?;

            let key = normalize_name(&definition.name);
            if by_name.insert(key, index).is_some() {
                return Err(CatalogError::DuplicateName(definition.name.clone()));
            }
            if let Some(&existing) = by_code.get(&definition.code) {
                return Err(CatalogError::DuplicateCode {
                    code: definition.code,
                    first: definitions[existing].name.clone(),
                    second: definition.name.clone(),
                });
            }
            by_code.insert(definition.code, index);
        }

        Ok(Self {
            definitions,
            by_name,
            by_code,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::from_definitions(document.commands)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    /// Look up by name. Accepts `nav_takeoff`, `NAV_TAKEOFF` and
    /// `MAV_CMD_NAV_TAKEOFF`.
    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.by_name
            .get(&normalize_name(name))
            .map(|&index| &self.definitions[index])
    }

    pub fn by_code(&self, code: u16) -> Option<&CommandDefinition> {
        self.by_code.get(&code).map(|&index| &self.definitions[index])
    }

    pub fn lookup(&self, name: &str) -> Result<&CommandDefinition, CommandError> {
        self.get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    pub fn lookup_code(&self, code: u16) -> Result<&CommandDefinition, CommandError> {
        self.by_code(code)
            .ok_or(CommandError::UnknownCommandCode(code))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_prefix("mav_cmd_") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}
