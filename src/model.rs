use serde::Serialize;

/// One reported dependency: the unit of a query result. Fields borrow the
/// backend that produced them (buffer strings or the mapped store), so a
/// result must be consumed before the graph is mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyItem<'g> {
    pub package_name: &'g str,
    #[serde(rename = "type")]
    pub dependency_type: &'g str,
    pub version_constraint: &'g str,
    pub architecture_constraint: &'g str,
}

pub type DependencyGroup<'g> = Vec<DependencyItem<'g>>;

/// All dependencies reported at one distance from the query root.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyLevel<'g> {
    pub direct_dependencies: Vec<DependencyItem<'g>>,
    pub or_dependencies: Vec<DependencyGroup<'g>>,
}

/// One entry per level, `0..depth`. Levels past the last non-empty
/// frontier stay empty.
pub type DependencyResult<'g> = Vec<DependencyLevel<'g>>;
