//! Event selection by type name.
//!
//! An [`EventSelector`] holds include and exclude patterns over event type
//! names, compiled with the `glob` crate: `*` matches any run of
//! characters (dots included), `?` a single character and `[...]` a
//! character class. Without include patterns every event is included; an
//! exclude match always wins.
//!
//! # Beispiel
//!
//! ```
//! use tracefilter::options::EventSelector;
//!
//! let selector = EventSelector::default()
//!     .with_include("jdk.*")
//!     .with_exclude("jdk.ExecutionSample");
//!
//! assert!(selector.matches("jdk.ThreadPark"));
//! assert!(!selector.matches("jdk.ExecutionSample"));
//! assert!(!selector.matches("demo.Tick"));
//! ```

use glob::Pattern;

use crate::event::{EventPredicate, RecordedEvent};
use crate::{Error, Result};

/// Include/exclude patterns over event type names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSelector {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl EventSelector {
    // --- Getter ---

    pub fn include(&self) -> &[String] { &self.include }

    pub fn exclude(&self) -> &[String] { &self.exclude }

    /// `true` if neither includes nor excludes are set (keeps everything).
    pub fn is_unrestricted(&self) -> bool { self.include.is_empty() && self.exclude.is_empty() }

    // --- Builder ---

    pub fn with_include(mut self, pattern: impl Into<String>) -> Self { self.include.push(pattern.into()); self }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self { self.exclude.push(pattern.into()); self }

    /// Adds every comma-separated pattern of `list` as include.
    pub fn with_include_list(mut self, list: &str) -> Self {
        self.include.extend(split_list(list));
        self
    }

    /// Adds every comma-separated pattern of `list` as exclude.
    pub fn with_exclude_list(mut self, list: &str) -> Self {
        self.exclude.extend(split_list(list));
        self
    }

    /// Rejects empty patterns and patterns `glob` can't compile.
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    /// Whether events of `type_name` are kept. With an invalid pattern
    /// nothing matches.
    pub fn matches(&self, type_name: &str) -> bool {
        self.compile().is_ok_and(|compiled| compiled.matches(type_name))
    }

    /// Converts the selector into a retention predicate.
    ///
    /// Events the metadata doesn't name are matched as the empty name.
    pub fn into_predicate(self) -> Result<EventPredicate> {
        let compiled = self.compile()?;
        Ok(Box::new(move |event: &RecordedEvent<'_>| {
            compiled.matches(event.type_name().unwrap_or(""))
        }))
    }

    fn compile(&self) -> Result<CompiledSelector> {
        Ok(CompiledSelector {
            include: compile_all(&self.include)?,
            exclude: compile_all(&self.exclude)?,
        })
    }
}

/// Vorkompilierte Muster, einmal pro Prädikat gebaut.
#[derive(Debug)]
struct CompiledSelector {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl CompiledSelector {
    fn matches(&self, type_name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(type_name));
        included && !self.exclude.iter().any(|p| p.matches(type_name))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            if pattern.trim().is_empty() {
                return Err(Error::InvalidPattern(pattern.clone()));
            }
            Pattern::new(pattern).map_err(|e| Error::InvalidPattern(format!("{pattern}: {e}")))
        })
        .collect()
}

fn split_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',').map(|p| p.trim().to_owned())
}
