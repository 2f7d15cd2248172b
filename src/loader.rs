use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::graph::DependencyGraph;
use crate::types::{ArchitectureId, GroupId};

/// Parses blank-line-separated `Key: Value` package stanzas into
/// `create_*` calls on the graph. `Package`, `Version` and `Architecture`
/// are mandatory; every known dependency-type key is parsed as a
/// comma-separated list whose members may be `|`-separated alternatives.
/// After each file the loader lets the graph flush if the staging buffer
/// has crossed its memory limit.
pub struct PackageLoader<'a> {
    graph: &'a mut DependencyGraph,
}

struct ParsedDependency<'t> {
    package_name: &'t str,
    version_constraint: &'t str,
    architecture_constraint: ArchitectureId,
    group: GroupId,
}

#[derive(Deserialize)]
struct DatasetEntry {
    path: String,
}

fn trim(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_ascii_whitespace())
}

impl<'a> PackageLoader<'a> {
    pub fn new(graph: &'a mut DependencyGraph) -> Self {
        Self { graph }
    }

    /// Loads one package file's worth of stanzas, then applies the
    /// memory-limit flush trigger.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        let dependency_types: Vec<String> = (0..self.graph.disk().dependency_type_count())
            .map(|id| {
                self.graph
                    .disk()
                    .dependency_type_symbol(id as u8)
                    .map(str::to_owned)
            })
            .collect::<Result<_>>()?;

        for stanza in text.split("\n\n") {
            if trim(stanza).is_empty() {
                continue;
            }
            self.load_stanza(stanza, &dependency_types)?;
        }
        let flushed = self.graph.flush_if_over_limit()?;
        if flushed {
            debug!("loader.flush_after_file");
        }
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)?;
        self.load_str(&text)?;
        debug!(path = %path.display(), "loader.file");
        Ok(())
    }

    /// Loads every package file named by a JSONL manifest of
    /// `{"path": "..."}` entries. Unreadable files are skipped with a
    /// warning, matching batch ingestion of partially mirrored datasets.
    pub fn load_dataset(&mut self, manifest: &Path) -> Result<usize> {
        let text = fs::read_to_string(manifest)?;
        let base = manifest.parent().unwrap_or(Path::new(""));
        let mut loaded = 0usize;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: DatasetEntry = serde_json::from_str(line).map_err(|e| {
                GraphError::Usage(format!("{}: bad manifest line: {e}", manifest.display()))
            })?;
            let path = base.join(&entry.path);
            match self.load_file(&path) {
                Ok(()) => loaded += 1,
                Err(GraphError::Io(e)) => {
                    warn!(path = %path.display(), error = %e, "loader.skip_file");
                }
                Err(e) => return Err(e),
            }
        }
        info!(files = loaded, manifest = %manifest.display(), "loader.dataset");
        Ok(loaded)
    }

    fn load_stanza(&mut self, stanza: &str, dependency_types: &[String]) -> Result<()> {
        let mut package = None;
        let mut version = None;
        let mut architecture = None;
        let mut fields: Vec<(&str, &str)> = Vec::new();
        for line in stanza.split('\n') {
            let Some(colon) = line.find(':') else {
                continue;
            };
            let key = trim(&line[..colon]);
            let value = trim(&line[colon + 1..]);
            match key {
                "Package" => package = Some(value),
                "Version" => version = Some(value),
                "Architecture" => architecture = Some(value),
                _ => fields.push((key, value)),
            }
        }
        let package = package
            .ok_or_else(|| GraphError::Usage("stanza is missing a Package field".into()))?;
        let version = version
            .ok_or_else(|| GraphError::Usage(format!("package {package:?} has no Version field")))?;
        let architecture = architecture.ok_or_else(|| {
            GraphError::Usage(format!("package {package:?} has no Architecture field"))
        })?;

        let (pid, _) = self.graph.create_package(package)?;
        let arch_id = self.graph.add_architecture(architecture)?;
        let (vid, _) = self.graph.create_version(pid, version, arch_id)?;

        let mut group: GroupId = 1;
        for (type_id, type_name) in dependency_types.iter().enumerate() {
            // Last occurrence wins, as with any repeated stanza field.
            let Some(&(_, value)) = fields
                .iter()
                .rev()
                .find(|(key, _)| *key == type_name.as_str())
            else {
                continue;
            };
            let items = self.parse_dependencies(value, &mut group)?;
            for item in items {
                let (target_pid, _) = self.graph.create_package(item.package_name)?;
                self.graph.create_dependency(
                    vid,
                    target_pid,
                    item.version_constraint,
                    item.architecture_constraint,
                    type_id as u8,
                    item.group,
                )?;
            }
        }
        Ok(())
    }

    /// Splits a dependency field into items: comma-separated entries, each
    /// either a single dependency (group 0) or a `|`-separated alternative
    /// list sharing the next group index.
    fn parse_dependencies<'t>(
        &mut self,
        raw: &'t str,
        group: &mut GroupId,
    ) -> Result<Vec<ParsedDependency<'t>>> {
        let mut items = Vec::new();
        for entry in raw.split(',') {
            if trim(entry).is_empty() {
                continue;
            }
            if entry.contains('|') {
                for alternative in entry.split('|') {
                    items.push(self.parse_dependency(alternative, *group)?);
                }
                *group = group.checked_add(1).ok_or_else(|| {
                    GraphError::Usage("more than 255 alternative groups in one version".into())
                })?;
            } else {
                items.push(self.parse_dependency(entry, 0)?);
            }
        }
        Ok(items)
    }

    /// One item of the form `name[:arch] [(constraint)]`. A missing
    /// `:arch` qualifier means the `native` constraint.
    fn parse_dependency<'t>(
        &mut self,
        raw: &'t str,
        group: GroupId,
    ) -> Result<ParsedDependency<'t>> {
        let mut version_constraint = "";
        let lpar = raw.find('(');
        if let Some(lpar) = lpar {
            if let Some(rpar) = raw.rfind(')') {
                if rpar > lpar {
                    version_constraint = trim(&raw[lpar + 1..rpar]);
                }
            }
        }
        let name_and_arch = &raw[..lpar.unwrap_or(raw.len())];
        let (name, constraint_arch) = match name_and_arch.find(':') {
            Some(colon) => (
                trim(&name_and_arch[..colon]),
                trim(&name_and_arch[colon + 1..]),
            ),
            None => (trim(name_and_arch), "native"),
        };
        if name.is_empty() {
            return Err(GraphError::Usage(format!(
                "dependency item {raw:?} has no package name"
            )));
        }
        let architecture_constraint = self.graph.add_architecture(constraint_arch)?;
        Ok(ParsedDependency {
            package_name: name,
            version_constraint,
            architecture_constraint,
            group,
        })
    }
}
