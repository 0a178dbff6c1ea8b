//! Classpath diagnostics

use std::fmt;

use serde::Serialize;

use crate::context::ContextSummary;
use crate::layer::{Layer, LayerSummary};

/// Dump of the default chain and the live contexts.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Default chain, root first
    pub levels: Vec<LayerSummary>,
    pub contexts: Vec<ContextSummary>,
}

impl Diagnostics {
    pub fn new(layer: &Layer, contexts: Vec<ContextSummary>) -> Self {
        Self {
            levels: layer.describe(),
            contexts,
        }
    }
}

fn write_level(f: &mut fmt::Formatter<'_>, level: usize, summary: &LayerSummary) -> fmt::Result {
    writeln!(
        f,
        "Level {} {} (generation {}) classpath items are:",
        level, summary.tier, summary.generation
    )?;
    for entry in &summary.entries {
        writeln!(f, "\t{entry}")?;
    }
    Ok(())
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (level, summary) in self.levels.iter().enumerate() {
            if level > 0 {
                writeln!(f)?;
            }
            write_level(f, level, summary)?;
        }

        for context in &self.contexts {
            writeln!(f)?;
            writeln!(f, "Context '{}' ({:?}):", context.name, context.status)?;
            write_level(f, self.levels.len(), &context.layer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::SupervisorStatus;

    fn summary(tier: &str, entries: &[&str]) -> LayerSummary {
        LayerSummary {
            tier: tier.to_string(),
            generation: 0,
            entries: entries.iter().map(|e| e.to_string()).collect(),
            defined_units: 0,
        }
    }

    #[test]
    fn test_render_levels_and_contexts() {
        let diagnostics = Diagnostics {
            levels: vec![
                summary("host", &["host:strata"]),
                summary("extra", &["file:///opt/lib/a.jar", "file:///opt/lib/b.jar"]),
            ],
            contexts: vec![ContextSummary {
                name: "t1".to_string(),
                status: SupervisorStatus::Running,
                layer: summary("context:t1", &["file:///t1/x.jar"]),
            }],
        };

        let rendered = diagnostics.to_string();
        let expected = "Level 0 host (generation 0) classpath items are:\n\
                        \thost:strata\n\
                        \n\
                        Level 1 extra (generation 0) classpath items are:\n\
                        \tfile:///opt/lib/a.jar\n\
                        \tfile:///opt/lib/b.jar\n\
                        \n\
                        Context 't1' (Running):\n\
                        Level 2 context:t1 (generation 0) classpath items are:\n\
                        \tfile:///t1/x.jar\n";
        assert_eq!(rendered, expected);
    }
}
