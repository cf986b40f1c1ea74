//! Project-scoped category taxonomy and file-to-category assignments.
//!
//! Categories are keyed by (project, name), so two projects may both own a
//! "Core" category without colliding. Every merge ensures the project's
//! fallback "Other" category exists. Assignments may target a different
//! project's taxonomy to share one set of categories between projects.

use crate::engine::{MergeEngine, MergeSummary};
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::identity::{category_key, FileIndex, FileRef, IdentityResolver};
use crate::intent::{attrs, EdgeType, MergeIntent, MergeKey, NodeLabel};
use repograph_store::{Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

pub const OTHER_CATEGORY: &str = "Other";
const OTHER_DESCRIPTION: &str = "Fallback category for uncategorized files";
const OTHER_URL: &str = "/other";

/// A category definition from a curated payload or a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

impl CategorySpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
        }
    }

    fn other() -> Self {
        Self::new(OTHER_CATEGORY, OTHER_DESCRIPTION, OTHER_URL)
    }
}

/// One file-to-category assignment; exactly one file reference must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCategoryAssignment {
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl FileCategoryAssignment {
    pub fn for_path(path: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn file_ref(&self) -> IngestResult<FileRef> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let refs: Vec<FileRef> = [
            present(&self.path).map(FileRef::Path),
            present(&self.hash).map(FileRef::Hash),
            present(&self.merge_hash).map(FileRef::MergeHash),
        ]
        .into_iter()
        .flatten()
        .collect();

        match <[FileRef; 1]>::try_from(refs) {
            Ok([reference]) => Ok(reference),
            Err(refs) => Err(IngestError::invalid_intent(format!(
                "assignment to '{}' must name exactly one of path, hash, merge_hash (got {})",
                self.category,
                refs.len()
            ))),
        }
    }
}

/// Produces category definitions for uncovered routes.
pub trait CategoryGenerator: Send + Sync {
    fn generate(&self, routes: &[String]) -> IngestResult<Vec<CategorySpec>>;
}

impl<F, E> CategoryGenerator for F
where
    F: Fn(&[String]) -> Result<Vec<CategorySpec>, E> + Send + Sync,
    E: std::fmt::Display,
{
    fn generate(&self, routes: &[String]) -> IngestResult<Vec<CategorySpec>> {
        self(routes).map_err(|e| IngestError::Generator(e.to_string()))
    }
}

/// Runs an external command: routes JSON on stdin, categories JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Program followed by its arguments, passed through without shell splitting.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.as_str(), args.iter().map(String::as_str)))
    }
}

impl CategoryGenerator for CommandGenerator {
    fn generate(&self, routes: &[String]) -> IngestResult<Vec<CategorySpec>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin is fed from its own thread while stdout and stderr drain here,
        // so neither side blocks on a full pipe.
        let payload = serde_json::to_vec(routes)?;
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || match stdin.write_all(&payload) {
                // A generator may exit without reading its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });
        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| IngestError::Generator(format!("{}: stdin writer panicked", self.program)))??;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::Generator(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// A payload entry rejected during a category merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    /// e.g. `assignments[3]`
    pub entry: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub categories_total: usize,
    pub categories_created: usize,
    pub routes_forwarded: usize,
    pub assigned: usize,
    pub duplicate_assignments: usize,
    pub rejected: Vec<RejectedEntry>,
    pub merge: MergeSummary,
}

impl CategorySummary {
    fn reject(&mut self, entry: String, error: IngestError) {
        tracing::warn!("Rejected {}: {}", entry, error);
        self.rejected.push(RejectedEntry {
            entry,
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

/// Everything one categorization run may carry.
#[derive(Default)]
pub struct CategorizeRequest {
    pub categories: Vec<CategorySpec>,
    pub assignments: Vec<FileCategoryAssignment>,
    /// Routes for generated categories; `None` skips generation
    pub routes: Option<Vec<String>>,
    pub generator: Option<Arc<dyn CategoryGenerator>>,
}

/// Manages one project's categories and assignments.
pub struct CategoryManager {
    project_id: String,
    category_project_id: Option<String>,
    engine: MergeEngine,
}

impl CategoryManager {
    pub fn new(project_id: impl Into<String>, engine: MergeEngine) -> IngestResult<Self> {
        let project_id = project_id.into();
        category_key(Some(&project_id), OTHER_CATEGORY)?;
        Ok(Self {
            project_id,
            category_project_id: None,
            engine,
        })
    }

    /// Resolve assignment categories in another project's taxonomy.
    pub fn with_category_project(mut self, project_id: Option<String>) -> Self {
        self.category_project_id = project_id;
        self
    }

    fn taxonomy_project(&self) -> &str {
        self.category_project_id.as_deref().unwrap_or(self.project_id.as_str())
    }

    /// Category name to url for a project's stored categories.
    fn existing_categories(&self, project_id: &str) -> IngestResult<HashMap<String, String>> {
        let nodes = self
            .engine
            .store()
            .nodes_with_label(NodeLabel::RepoCategory.as_str(), project_id)?;
        Ok(nodes
            .into_iter()
            .map(|node| {
                let url = node
                    .property("url")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                (node.key.id, url)
            })
            .collect())
    }

    fn category_intent(&self, key: MergeKey, spec: &CategorySpec) -> MergeIntent {
        let project_id = key.project_id.clone();
        MergeIntent::node(
            key,
            attrs([
                ("name", spec.name.trim().into()),
                ("description", spec.description.as_str().into()),
                ("url", spec.url.as_str().into()),
                ("project_id", project_id.into()),
            ]),
        )
    }

    /// Upsert categories and assignments in one engine pass.
    pub async fn merge_categories(
        &self,
        categories: Vec<CategorySpec>,
        assignments: Vec<FileCategoryAssignment>,
    ) -> IngestResult<CategorySummary> {
        let taxonomy = self.taxonomy_project().to_string();
        let own_other = category_key(Some(&self.project_id), OTHER_CATEGORY)?;
        let taxonomy_other = category_key(Some(&taxonomy), OTHER_CATEGORY)?;

        let mut summary = CategorySummary::default();
        let mut intents = vec![self.category_intent(own_other, &CategorySpec::other())];
        if taxonomy != self.project_id {
            intents.push(self.category_intent(taxonomy_other, &CategorySpec::other()));
        }

        let existing = self.existing_categories(&self.project_id)?;
        let mut merged_names = HashSet::new();
        for (index, spec) in categories.iter().enumerate() {
            let name = spec.name.trim();
            if name.is_empty() {
                summary.reject(
                    format!("categories[{index}]"),
                    IngestError::invalid_intent("category without a name"),
                );
                continue;
            }
            let key = category_key(Some(&self.project_id), name)?;
            intents.push(self.category_intent(key, spec));
            if merged_names.insert(name.to_string()) {
                summary.categories_total += 1;
                if !existing.contains_key(name) {
                    summary.categories_created += 1;
                }
            }
        }

        let mut known: HashSet<String> = if taxonomy == self.project_id {
            existing.into_keys().chain(merged_names).collect()
        } else {
            self.existing_categories(&taxonomy)?.into_keys().collect()
        };
        known.insert(OTHER_CATEGORY.to_string());

        let edges = self.assignment_edges(&taxonomy, &known, assignments, &mut summary)?;
        let submitted_edges = edges.len();
        intents.extend(edges);

        let result = self.engine.apply(intents).await;
        let lost_edges = result
            .retry_batch()
            .iter()
            .chain(result.skipped.iter().map(|s| &s.intent))
            .filter(|intent| intent.is_edge())
            .count();
        summary.assigned = submitted_edges - lost_edges;
        summary.merge = result.summary();

        tracing::info!(
            "Categorization complete for {}: categories={}, created={}, files classified={}",
            self.project_id,
            summary.categories_total,
            summary.categories_created,
            summary.assigned
        );
        Ok(summary)
    }

    fn assignment_edges(
        &self,
        taxonomy: &str,
        known: &HashSet<String>,
        assignments: Vec<FileCategoryAssignment>,
        summary: &mut CategorySummary,
    ) -> IngestResult<Vec<MergeIntent>> {
        if assignments.is_empty() {
            return Ok(Vec::new());
        }
        let index = FileIndex::load(self.engine.store().as_ref(), &self.project_id)?;
        let resolver = IdentityResolver::new(self.project_id.clone(), index);

        let mut edges: Vec<MergeIntent> = Vec::new();
        let mut positions: HashMap<(MergeKey, MergeKey), usize> = HashMap::new();

        for (i, assignment) in assignments.iter().enumerate() {
            let entry = format!("assignments[{i}]");
            let category = assignment.category.trim();

            let file_ref = match assignment.file_ref() {
                Ok(r) => r,
                Err(e) => {
                    summary.reject(entry, e);
                    continue;
                }
            };
            if !known.contains(category) {
                summary.reject(
                    entry,
                    IngestError::UnknownCategory {
                        project_id: taxonomy.to_string(),
                        category: category.to_string(),
                    },
                );
                continue;
            }
            let file = match resolver.resolve_file(&file_ref) {
                Ok(key) => key,
                Err(e) => {
                    summary.reject(entry, e);
                    continue;
                }
            };

            let mut properties = Properties::new();
            if let Some(confidence) = assignment.confidence {
                if confidence.is_nan() {
                    summary.reject(entry, IngestError::invalid_intent("confidence is NaN"));
                    continue;
                }
                properties.insert(
                    "confidence".to_string(),
                    PropertyValue::from(confidence.clamp(0.0, 1.0)),
                );
            }

            let category_node = category_key(Some(taxonomy), category)?;
            let edge = MergeIntent::edge(
                EdgeType::BelongsToRepoCategory,
                file.clone(),
                category_node.clone(),
                properties,
            );
            match positions.get(&(file.clone(), category_node.clone())) {
                Some(&pos) => {
                    // Last entry in input order wins.
                    edges[pos] = edge;
                    summary.duplicate_assignments += 1;
                }
                None => {
                    positions.insert((file, category_node), edges.len());
                    edges.push(edge);
                }
            }
        }
        Ok(edges)
    }

    /// Routes not yet covered by a category url, in input order.
    fn uncovered_routes(&self, routes: &[String]) -> IngestResult<Vec<String>> {
        let covered: HashSet<String> = self
            .existing_categories(&self.project_id)?
            .into_values()
            .filter(|url| !url.is_empty())
            .collect();
        let mut seen = HashSet::new();
        Ok(routes
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty() && !covered.contains(*r))
            .filter(|r| seen.insert(r.to_string()))
            .map(str::to_string)
            .collect())
    }

    async fn generate_missing(
        &self,
        routes: &[String],
        generator: Option<Arc<dyn CategoryGenerator>>,
    ) -> IngestResult<(Vec<CategorySpec>, usize)> {
        let generator = generator.ok_or(IngestError::GeneratorUnavailable)?;
        let missing = self.uncovered_routes(routes)?;
        if missing.is_empty() {
            tracing::info!("All {} routes already categorized", routes.len());
            return Ok((Vec::new(), 0));
        }
        let forwarded = missing.len();
        tracing::info!("Generating categories for {} routes", forwarded);
        let specs = tokio::task::spawn_blocking(move || generator.generate(&missing))
            .await
            .map_err(|e| IngestError::Generator(format!("generator task failed: {e}")))??;
        Ok((specs, forwarded))
    }

    /// Generate and merge categories for routes not yet covered.
    pub async fn auto_categories(
        &self,
        routes: &[String],
        generator: Option<Arc<dyn CategoryGenerator>>,
    ) -> IngestResult<CategorySummary> {
        let (specs, forwarded) = self.generate_missing(routes, generator).await?;
        if forwarded == 0 {
            return Ok(CategorySummary::default());
        }
        let mut summary = self.merge_categories(specs, Vec::new()).await?;
        summary.routes_forwarded = forwarded;
        Ok(summary)
    }

    /// Generated categories, curated categories, then assignments.
    pub async fn categorize(&self, request: CategorizeRequest) -> IngestResult<CategorySummary> {
        let CategorizeRequest {
            categories,
            assignments,
            routes,
            generator,
        } = request;

        let (mut specs, forwarded) = match routes {
            Some(routes) => self.generate_missing(&routes, generator).await?,
            None => (Vec::new(), 0),
        };
        specs.extend(categories);

        let mut summary = self.merge_categories(specs, assignments).await?;
        summary.routes_forwarded = forwarded;
        Ok(summary)
    }
}
