use std::fmt::Write;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};

use super::Plan;

/// A task that actually ran and committed its artifact.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub task: String,
    pub location: Utf8PathBuf,
    pub start: Instant,
    pub duration: Duration,
}

/// What the scheduler did since it was created or since the diagnostics
/// were last taken.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Committed artifacts, in the order they were committed.
    pub executions: Vec<TaskExecution>,
    /// Locations found present and short-circuited.
    pub cached: Vec<Utf8PathBuf>,
}

impl Diagnostics {
    /// Number of artifacts written.
    pub fn writes(&self) -> usize {
        self.executions.len()
    }

    /// Number of cache hits.
    pub fn hits(&self) -> usize {
        self.cached.len()
    }

    pub fn wrote(&self, location: &Utf8Path) -> bool {
        self.executions.iter().any(|e| e.location == location)
    }

    pub fn total(&self) -> Duration {
        self.executions.iter().map(|e| e.duration).sum()
    }

    /// Renders `plan` as a Mermaid diagram, color-coded by execution duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Blue**: Cached (skipped)
    pub fn render_mermaid(&self, plan: &Plan) -> String {
        let mut f = String::new();
        let _ = writeln!(f, "graph LR");

        let (min_time, max_time) = self
            .executions
            .iter()
            .map(|e| e.duration.as_secs_f64())
            .fold(None, |acc, secs| match acc {
                None => Some((secs, secs)),
                Some((lo, hi)) => Some((f64::min(lo, secs), f64::max(hi, secs))),
            })
            .unwrap_or((0.0, 0.0));

        // all tasks took the same time
        let max_time = if (max_time - min_time).abs() < f64::EPSILON {
            min_time + 1.0
        } else {
            max_time
        };

        let graph = plan.graph();

        for index in graph.node_indices() {
            let node = &graph[index];
            let name = node.name.replace('"', "\\\"");

            let execution = self.executions.iter().find(|e| e.location == node.location);

            let (label_extra, color_code) = match execution {
                Some(exec) => {
                    let t = (exec.duration.as_secs_f64() - min_time) / (max_time - min_time);
                    (format!("{:.2?}", exec.duration), gradient(t))
                }
                None => ("Cached".to_string(), "#ADD8E6".to_string()),
            };

            let _ = writeln!(f, "    {}[\"{}\\n{}\"]", index.index(), name, label_extra);
            let _ = writeln!(f, "    style {} fill:{}", index.index(), color_code);
        }

        for edge in graph.raw_edges() {
            let _ = writeln!(
                f,
                "    {} -- \"{}\" --> {}",
                edge.source().index(),
                edge.weight.replace('"', "\\\""),
                edge.target().index()
            );
        }

        f
    }
}

/// Green at 0, yellow at 0.5, red at 1.
fn gradient(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);

    let (r, g, b) = if t < 0.5 {
        ((255.0 * t * 2.0) as u8, 255, 0)
    } else {
        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8, 0)
    };

    format!("#{r:02X}{g:02X}{b:02X}")
}
