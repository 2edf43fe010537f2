//! Resolves per-unit base-class name lists into a cross-unit ancestor graph.

use std::fmt;

use ahash::AHashMap;

use super::CompiledUnit;
use crate::util::fold_name;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    UnknownBase { class: String, base: String },
    InheritanceCycle { path: Vec<String> },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::UnknownBase { class, base } => {
                write!(f, "class '{class}' inherits from unknown class '{base}'")
            }
            LinkError::InheritanceCycle { path } => {
                write!(f, "inheritance cycle: {}", path.join(" -> "))
            }
        }
    }
}

impl std::error::Error for LinkError {}

/// A class's ancestors, most-derived first, flattened across every base
/// declared with `herda` (single or multiple inheritance). Populated only
/// by [`ClassLoader::link`]; before linking, lookup is restricted to the
/// class itself.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBases {
    /// Ancestor class names, most-derived first, NOT including the class
    /// itself (callers search `[self] + ancestors`).
    pub ancestors: Vec<String>,
}

/// Links a set of [`CompiledUnit`]s, validating that every declared base
/// exists and that the inheritance graph is acyclic.
#[derive(Debug, Default)]
pub struct ClassLoader {
    units: AHashMap<String, CompiledUnit>,
    resolved: AHashMap<String, ResolvedBases>,
}

impl ClassLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, unit: CompiledUnit) {
        self.units.insert(fold_name(&unit.class_name), unit);
    }

    pub fn unit(&self, class_name: &str) -> Option<&CompiledUnit> {
        self.units.get(&fold_name(class_name))
    }

    pub fn resolved_bases(&self, class_name: &str) -> Option<&ResolvedBases> {
        self.resolved.get(&fold_name(class_name))
    }

    /// Validates every base reference and computes each class's flattened,
    /// most-derived-first ancestor list via depth-first search, rejecting
    /// cycles.
    pub fn link(&mut self) -> Result<(), LinkError> {
        let names: Vec<String> = self.units.keys().cloned().collect();
        for name in names {
            let mut visiting = Vec::new();
            let ancestors = self.resolve_ancestors(&name, &mut visiting)?;
            self.resolved.insert(name, ResolvedBases { ancestors });
        }
        Ok(())
    }

    fn resolve_ancestors(&self, folded: &str, visiting: &mut Vec<String>) -> Result<Vec<String>, LinkError> {
        if let Some(pos) = visiting.iter().position(|v| v == folded) {
            let mut path = visiting[pos..].to_vec();
            path.push(folded.to_owned());
            return Err(LinkError::InheritanceCycle { path });
        }
        let unit = self.units.get(folded).expect("folded name came from self.units.keys()");
        visiting.push(folded.to_owned());

        let mut ancestors = Vec::new();
        for base in &unit.base_names {
            let folded_base = fold_name(base);
            let Some(base_unit) = self.units.get(&folded_base) else {
                return Err(LinkError::UnknownBase {
                    class: unit.class_name.clone(),
                    base: base.clone(),
                });
            };
            if !ancestors.iter().any(|a: &String| fold_name(a) == folded_base) {
                ancestors.push(base_unit.class_name.clone());
            }
            for grand in self.resolve_ancestors(&folded_base, visiting)? {
                if !ancestors.iter().any(|a: &String| fold_name(a) == fold_name(&grand)) {
                    ancestors.push(grand);
                }
            }
        }
        visiting.pop();
        Ok(ancestors)
    }

    /// Searches `class_name` then its resolved ancestors, most-derived
    /// first, for a function declared under `folded_name`.
    pub fn find_method(&self, class_name: &str, folded_name: &str) -> Option<(&str, &super::CompiledFunction)> {
        let unit = self.unit(class_name)?;
        if let Some(f) = unit.find_function(folded_name) {
            return Some((&unit.class_name, f));
        }
        let bases = self.resolved_bases(class_name)?;
        for ancestor in &bases.ancestors {
            if let Some(unit) = self.unit(ancestor) {
                if let Some(f) = unit.find_function(folded_name) {
                    return Some((&unit.class_name, f));
                }
            }
        }
        None
    }

    /// Searches `class_name` then its resolved ancestors for an instance
    /// or common variable declared under `folded_name`, returning the most-
    /// derived class it was found on — a derived class's own declaration of
    /// a name shadows an ancestor's declaration of the same name.
    pub fn find_variable_owner(&self, class_name: &str, folded_name: &str) -> Option<&str> {
        let unit = self.unit(class_name)?;
        if unit.find_variable(folded_name).is_some() {
            return Some(&unit.class_name);
        }
        let bases = self.resolved_bases(class_name)?;
        for ancestor in &bases.ancestors {
            if let Some(unit) = self.unit(ancestor) {
                if unit.find_variable(folded_name).is_some() {
                    return Some(&unit.class_name);
                }
            }
        }
        None
    }

    /// Searches `class_name` then its resolved ancestors, most-derived
    /// first, for a constant declared under `folded_name`.
    pub fn find_constant(&self, class_name: &str, folded_name: &str) -> Option<(&str, &super::ConstantValue)> {
        let unit = self.unit(class_name)?;
        if let Some(c) = unit.constants.get(folded_name) {
            return Some((&unit.class_name, c));
        }
        let bases = self.resolved_bases(class_name)?;
        for ancestor in &bases.ancestors {
            if let Some(unit) = self.unit(ancestor) {
                if let Some(c) = unit.constants.get(folded_name) {
                    return Some((&unit.class_name, c));
                }
            }
        }
        None
    }
}
